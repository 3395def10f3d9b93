/// MCP Tool handlers for codectx.
///
/// 1. index_workspace  – full (re)index of a source tree
/// 2. update_file      – re-analyse one file
/// 3. remove_file      – drop one file from the index
/// 4. find_symbol      – definition (and optionally reference) sites
/// 5. search_files     – substring / regex search over paths and content
/// 6. get_related_files – dependency-graph neighbours
/// 7. build_context    – token-budgeted context selection
/// 8. index_status     – lifecycle state and counters
use crate::context::ContextRequest;
use crate::mcp::server::McpContext;
use crate::store::models::FileRecord;
use crate::store::search::SearchOptions;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

const DEFAULT_RELATED_RESULTS: usize = 10;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct IndexWorkspaceParams {
    /// Root directory of the source tree
    root: String,
}

#[derive(Deserialize, JsonSchema)]
struct FilepathParam {
    /// File path, relative to the workspace root or absolute
    filepath: String,
}

#[derive(Deserialize, JsonSchema)]
struct FindSymbolParams {
    /// Symbol name (exact match)
    name: String,
    /// Also return import sites (default: false)
    include_references: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct SearchFilesParams {
    /// Text or pattern matched against paths, symbol names and content
    query: String,
    /// Case-sensitive matching (default: false)
    case_sensitive: Option<bool>,
    /// Treat the query as a regular expression (default: false)
    regex: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
struct RelatedFilesParams {
    /// File path, relative to the workspace root or absolute
    filepath: String,
    /// Max results (default: 10)
    max_results: Option<usize>,
}

#[derive(Deserialize, JsonSchema)]
struct BuildContextParams {
    /// File being edited (optional)
    current_file: Option<String>,
    /// Natural language description of the task (optional)
    query: Option<String>,
    /// Symbol names of interest (comma-separated)
    symbols: Option<String>,
    /// Total token budget including the response buffer
    max_tokens: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(value)
        .map_err(|e| McpError::internal_error(format!("serialization failed: {e}"), None))
}

/// Compact listing of a record, without chunk content.
fn file_summary(record: &FileRecord) -> serde_json::Value {
    serde_json::json!({
        "path": record.path,
        "language": record.language,
        "lines": record.line_count,
        "tokens": record.total_tokens(),
        "symbols": record.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
    })
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: index_workspace ─────────────────────────────────────

    #[tool(description = "Index every supported source file under a directory, replacing the previous index")]
    async fn index_workspace(
        &self,
        params: Parameters<IndexWorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        let root = params.0.root;
        if root.is_empty() {
            return error_result("root is required");
        }

        match self.ctx.engine.index_workspace(&root, None).await {
            Ok(summary) => json_result(serde_json::json!({
                "success": true,
                "summary": to_json(&summary)?,
            })),
            Err(e) => error_result(&e.to_string()),
        }
    }

    // ── Tool 2: update_file ─────────────────────────────────────────

    #[tool(description = "Re-analyse a single file after it changed; removes it from the index if it no longer exists")]
    async fn update_file(
        &self,
        params: Parameters<FilepathParam>,
    ) -> Result<CallToolResult, McpError> {
        let filepath = &params.0.filepath;
        if filepath.is_empty() {
            return error_result("filepath is required");
        }

        match self.ctx.engine.update_file(filepath).await {
            Ok(()) => json_result(serde_json::json!({ "success": true, "filepath": filepath })),
            Err(e) => error_result(&e.to_string()),
        }
    }

    // ── Tool 3: remove_file ─────────────────────────────────────────

    #[tool(description = "Remove a single file from the index")]
    async fn remove_file(
        &self,
        params: Parameters<FilepathParam>,
    ) -> Result<CallToolResult, McpError> {
        let filepath = &params.0.filepath;
        if filepath.is_empty() {
            return error_result("filepath is required");
        }

        match self.ctx.engine.remove_file(filepath).await {
            Ok(removed) => json_result(serde_json::json!({
                "success": true,
                "filepath": filepath,
                "removed": removed,
            })),
            Err(e) => error_result(&e.to_string()),
        }
    }

    // ── Tool 4: find_symbol ─────────────────────────────────────────

    #[tool(description = "Find where a symbol is declared, and optionally where it is imported")]
    async fn find_symbol(
        &self,
        params: Parameters<FindSymbolParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.name.is_empty() {
            return error_result("name is required");
        }

        let definitions = self.ctx.engine.find_symbol(&p.name).await;
        let mut response = serde_json::json!({
            "symbol": p.name,
            "definitions": to_json(&definitions)?,
        });
        if p.include_references.unwrap_or(false) {
            let references = self.ctx.engine.find_references(&p.name).await;
            response["references"] = to_json(&references)?;
        }

        json_result(response)
    }

    // ── Tool 5: search_files ────────────────────────────────────────

    #[tool(description = "Search indexed files by path, symbol name or content. Supports case-sensitive and regex matching.")]
    async fn search_files(
        &self,
        params: Parameters<SearchFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.is_empty() {
            return error_result("query is required");
        }

        let options = SearchOptions {
            case_sensitive: p.case_sensitive.unwrap_or(false),
            regex: p.regex.unwrap_or(false),
        };
        match self.ctx.engine.search_files(&p.query, options).await {
            Ok(files) => {
                let results: Vec<serde_json::Value> = files.iter().map(file_summary).collect();
                json_result(serde_json::json!({ "results": results }))
            }
            Err(e) => error_result(&e.to_string()),
        }
    }

    // ── Tool 6: get_related_files ───────────────────────────────────

    #[tool(description = "List files connected to a file through imports, direct neighbours first")]
    async fn get_related_files(
        &self,
        params: Parameters<RelatedFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.filepath.is_empty() {
            return error_result("filepath is required");
        }

        let max = p.max_results.unwrap_or(DEFAULT_RELATED_RESULTS);
        let related = self.ctx.engine.get_related_files(&p.filepath, max).await;
        let results: Vec<serde_json::Value> = related.iter().map(file_summary).collect();

        json_result(serde_json::json!({ "filepath": p.filepath, "related": results }))
    }

    // ── Tool 7: build_context ───────────────────────────────────────

    #[tool(
        description = "Select the most relevant files and chunks for a coding task within a token budget. Give a current file, a query, symbol names, or any combination."
    )]
    async fn build_context(
        &self,
        params: Parameters<BuildContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let request = ContextRequest {
            current_file: p.current_file.filter(|f| !f.is_empty()),
            query: p.query.filter(|q| !q.is_empty()),
            symbols: split_list(p.symbols.as_deref()),
            max_tokens: p.max_tokens,
        };
        if request.current_file.is_none() && request.query.is_none() && request.symbols.is_empty()
        {
            return error_result("one of current_file, query or symbols is required");
        }

        let selection = self.ctx.engine.build_context(&request).await;
        json_result(to_json(&selection)?)
    }

    // ── Tool 8: index_status ────────────────────────────────────────

    #[tool(description = "Report the index state, file and symbol counts and dependency graph size")]
    async fn index_status(&self) -> Result<CallToolResult, McpError> {
        let status = self.ctx.engine.get_index_status().await;
        let metrics = self.ctx.engine.graph_metrics(5).await;
        json_result(serde_json::json!({
            "status": to_json(&status)?,
            "graph": to_json(&metrics)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(Some("UserService, parseConfig,,")),
            vec!["UserService".to_string(), "parseConfig".to_string()]
        );
        assert!(split_list(None).is_empty());
    }
}
