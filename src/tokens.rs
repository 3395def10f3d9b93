/// Token estimation.
///
/// Counts are approximate: one token is taken to be four characters. This is
/// close enough to keep selections under a model's context ceiling once the
/// response buffer is reserved, but it is not a real tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of `text` (`ceil(chars / 4)`).
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}
