use super::languages::LanguageConfig;
use crate::store::models::{ChunkType, SemanticChunk};
use crate::tokens::estimate_tokens;

/// Running accumulator of lines for the chunk being built.
struct Pending<'a> {
    lines: Vec<&'a str>,
    start_line: usize,
    chunk_type: ChunkType,
    chars: usize,
}

impl<'a> Pending<'a> {
    fn new(start_line: usize, chunk_type: ChunkType) -> Self {
        Self {
            lines: Vec::new(),
            start_line,
            chunk_type,
            chars: 0,
        }
    }

    fn push(&mut self, line: &'a str) {
        if !self.lines.is_empty() {
            self.chars += 1;
        }
        self.chars += line.chars().count();
        self.lines.push(line);
    }

    fn estimated_tokens(&self) -> usize {
        self.chars.div_ceil(crate::tokens::CHARS_PER_TOKEN)
    }

    fn finish(self) -> Option<SemanticChunk> {
        if self.lines.is_empty() {
            return None;
        }
        let content = self.lines.join("\n");
        Some(SemanticChunk {
            tokens: estimate_tokens(&content),
            start_line: self.start_line,
            end_line: self.start_line + self.lines.len() - 1,
            chunk_type: self.chunk_type,
            content,
        })
    }
}

/// Splits file content into line-aligned chunks.
///
/// A new chunk starts at every function/class/interface declaration line and
/// whenever the running chunk reaches `max_tokens`. Every line of `content`
/// lands in exactly one chunk, in order. Without a language config only the
/// size cutoff applies.
pub fn split_into_chunks(
    content: &str,
    language: Option<&LanguageConfig>,
    max_tokens: usize,
) -> Vec<SemanticChunk> {
    let mut chunks = Vec::new();
    let mut pending = Pending::new(1, ChunkType::General);

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;

        if let Some(boundary) = language.and_then(|l| l.boundary_type(line)) {
            if pending.lines.is_empty() {
                pending.chunk_type = boundary;
            } else {
                let done = std::mem::replace(&mut pending, Pending::new(line_no, boundary));
                chunks.extend(done.finish());
            }
        }

        pending.push(line);

        if pending.estimated_tokens() >= max_tokens {
            let done = std::mem::replace(
                &mut pending,
                Pending::new(line_no + 1, ChunkType::General),
            );
            chunks.extend(done.finish());
        }
    }

    chunks.extend(pending.finish());
    chunks
}
