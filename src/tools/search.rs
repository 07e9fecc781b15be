//! 内容检索：单文件逐行匹配，或目录下按文件统计匹配数
//!
//! 纯文本查询经 regex::escape 转为正则后统一处理，大小写开关对两种查询都生效。

use std::path::Path;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use walkdir::WalkDir;

use crate::tools::filesystem::Workspace;
use crate::tools::registry::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SearchArgs {
    /// The path to the file to search within.
    file_path: String,
    /// The string or regex pattern to search for.
    query: String,
    /// Optional. Treat query as a regex pattern, defaults to false.
    is_regex: Option<bool>,
    /// Optional. Case-sensitive search, defaults to true.
    case_sensitive: Option<bool>,
}

fn build_pattern(query: &str, is_regex: bool, case_sensitive: bool) -> Result<Regex, ToolError> {
    let pattern = if is_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    Ok(RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()?)
}

/// 单文件检索，返回每处匹配的行号、行文本、匹配片段与字符偏移
pub struct SearchFileContentTool {
    ws: Workspace,
}

impl SearchFileContentTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for SearchFileContentTool {
    fn name(&self) -> &str {
        "search_file_content"
    }

    fn description(&self) -> &str {
        "Search for a string or regex pattern within a single file. Returns a list of matching lines and their numbers."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SearchArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let re = build_pattern(
            &args.query,
            args.is_regex.unwrap_or(false),
            args.case_sensitive.unwrap_or(true),
        )?;

        let content = match std::fs::read_to_string(self.ws.resolve(&args.file_path)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::failure(format!("File not found: {}", args.file_path)))
            }
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "Error reading file {}: {}",
                    args.file_path, e
                )))
            }
        };

        let mut matches = Vec::new();
        for (i, line) in content.lines().enumerate() {
            for m in re.find_iter(line) {
                let start = line[..m.start()].chars().count();
                let len = m.as_str().chars().count();
                matches.push(json!({
                    "line_number": i + 1,
                    "line_text": line,
                    "match_segment": m.as_str(),
                    "start_index": start,
                    "end_index": start + len,
                }));
            }
        }
        Ok(ToolResult::ok(json!({ "matches": matches })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SearchDirectoryArgs {
    /// The path to the directory to search within.
    directory_path: String,
    /// The string or regex pattern to search for.
    query: String,
    /// Optional. Treat query as a regex pattern, defaults to false.
    is_regex: Option<bool>,
    /// Optional. Case-sensitive search, defaults to true.
    case_sensitive: Option<bool>,
    /// Optional. Glob pattern (e.g. '*.rs') matched against file names, defaults to "*".
    glob_pattern: Option<String>,
    /// Optional. Descend into subdirectories, defaults to true.
    recursive: Option<bool>,
}

/// 目录检索：返回含匹配的文件及各自的匹配数；无法读取的文件跳过
pub struct SearchDirectoryFilesTool {
    ws: Workspace,
}

impl SearchDirectoryFilesTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for SearchDirectoryFilesTool {
    fn name(&self) -> &str {
        "search_directory_files"
    }

    fn description(&self) -> &str {
        "Recursively search for a string or regex pattern in files within a directory. Returns a list of files containing matches and the count of matches per file."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SearchDirectoryArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: SearchDirectoryArgs = parse_args(args)?;
        let dir = self.ws.resolve(&args.directory_path);
        if !dir.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Directory not found: {}",
                args.directory_path
            )));
        }
        let re = build_pattern(
            &args.query,
            args.is_regex.unwrap_or(false),
            args.case_sensitive.unwrap_or(true),
        )?;
        let pattern = glob::Pattern::new(args.glob_pattern.as_deref().unwrap_or("*"))
            .map_err(|e| ToolError::InvalidParameters(format!("glob_pattern: {}", e)))?;

        let mut walker = WalkDir::new(&dir).min_depth(1).sort_by_file_name();
        if !args.recursive.unwrap_or(true) {
            walker = walker.max_depth(1);
        }

        let mut found = Vec::new();
        for entry in walker.into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !pattern.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let bytes = match std::fs::read(entry.path()) {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!(
                        trace_id = ?ctx.trace_id,
                        path = %entry.path().display(),
                        error = %e,
                        "skipping unreadable file"
                    );
                    continue;
                }
            };
            let count = re.find_iter(&String::from_utf8_lossy(&bytes)).count();
            if count > 0 {
                let display = Path::new(&args.directory_path)
                    .join(entry.path().strip_prefix(&dir).unwrap_or(entry.path()))
                    .display()
                    .to_string();
                found.push(json!({ "file_path": display, "matches_count": count }));
            }
        }
        Ok(ToolResult::ok(json!({ "found_files": found })))
    }
}
