//! 文件系统工具
//!
//! Workspace 绑定基准目录：相对路径相对它解析，绝对路径原样使用。
//! read_file / write_file / delete_file / create_directory / list_directory /
//! get_current_directory / get_file_metadata 均基于 Workspace。
//! 写覆盖、删除、建目录属于破坏性操作，安全模式下须经确认。

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use walkdir::WalkDir;

use crate::tools::registry::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

/// 工具的基准目录
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

fn timestamp(t: std::io::Result<SystemTime>) -> Option<String> {
    t.ok().map(|t| DateTime::<Local>::from(t).to_rfc3339())
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ReadFileArgs {
    /// path/to/file
    file_path: String,
    /// Optional. 1-based line to start reading from.
    start_line: Option<usize>,
    /// Optional. 1-based line to stop at (inclusive).
    end_line: Option<usize>,
}

/// 读取文件，可选行范围
pub struct ReadFileTool {
    ws: Workspace,
}

impl ReadFileTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

/// 取 1 起始、闭区间的行范围；越界或起点在终点之后时为空
fn slice_lines(content: &str, start_line: Option<usize>, end_line: Option<usize>) -> String {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let start = start_line.map(|s| s.saturating_sub(1)).unwrap_or(0);
    let end = end_line.unwrap_or(lines.len()).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].concat()
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read contents of a file. Supports specifying start line and end line."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFileArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: ReadFileArgs = parse_args(args)?;
        let path = self.ws.resolve(&args.file_path);
        tracing::info!(
            trace_id = ctx.trace_id.as_deref().unwrap_or("-"),
            path = %path.display(),
            "read_file"
        );
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ToolResult::failure(format!("File not found: {}", args.file_path)))
            }
            Err(e) => return Err(e.into()),
        };
        let content = if args.start_line.is_none() && args.end_line.is_none() {
            content
        } else {
            slice_lines(&content, args.start_line, args.end_line)
        };
        Ok(ToolResult::ok(json!({ "content": content })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct WriteFileArgs {
    /// path/to/file
    file_path: String,
    /// text content
    content: String,
    /// Optional. "w" (overwrite, default) or "a" (append).
    mode: Option<String>,
}

/// 写文件（覆盖或追加）
pub struct WriteFileTool {
    ws: Workspace,
}

impl WriteFileTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting (mode \"w\") or appending (mode \"a\")."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteFileArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: WriteFileArgs = parse_args(args)?;
        let append = match args.mode.as_deref().unwrap_or("w") {
            "w" => false,
            "a" => true,
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "mode must be \"w\" or \"a\", got \"{}\"",
                    other
                )))
            }
        };
        let path = self.ws.resolve(&args.file_path);
        if !append
            && path.exists()
            && !ctx
                .confirm_destructive(&format!("Confirm overwrite of '{}'", args.file_path))
                .await
        {
            return Ok(ToolResult::failure("Overwrite not confirmed by user."));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        file.write_all(args.content.as_bytes())?;

        Ok(ToolResult::ok(json!({
            "message": format!("Content written to {}", args.file_path),
            "bytes_written": args.content.len(),
        })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct DeleteFileArgs {
    /// path/to/file
    file_path: String,
}

/// 删除文件
pub struct DeleteFileTool {
    ws: Workspace,
}

impl DeleteFileTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DeleteFileArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: DeleteFileArgs = parse_args(args)?;
        if !ctx
            .confirm_destructive(&format!("Confirm deletion of '{}'", args.file_path))
            .await
        {
            return Ok(ToolResult::failure("Deletion not confirmed by user."));
        }
        fs::remove_file(self.ws.resolve(&args.file_path))?;
        Ok(ToolResult::ok(json!({ "message": format!("File deleted: {}", args.file_path) })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CreateDirectoryArgs {
    /// path/to/new/directory
    directory_path: String,
}

/// 递归创建目录（已存在时视为成功）
pub struct CreateDirectoryTool {
    ws: Workspace,
}

impl CreateDirectoryTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a new directory (including missing parents)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CreateDirectoryArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: CreateDirectoryArgs = parse_args(args)?;
        if !ctx
            .confirm_destructive(&format!("Create directory '{}'", args.directory_path))
            .await
        {
            return Ok(ToolResult::failure("Directory creation not confirmed by user."));
        }
        fs::create_dir_all(self.ws.resolve(&args.directory_path))?;
        Ok(ToolResult::ok(json!({
            "message": format!("Directory created: {}", args.directory_path)
        })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ListDirectoryArgs {
    /// Optional. path/to/directory, defaults to "."
    directory_path: Option<String>,
    /// Optional. List recursively, defaults to false.
    recursive: Option<bool>,
    /// Optional. Glob pattern matched against item names, defaults to "*".
    glob_pattern: Option<String>,
    /// Optional. Include type, size_bytes and modified_at for each item.
    include_metadata: Option<bool>,
}

/// 列目录：可递归、按 glob 过滤、附带元数据
pub struct ListDirectoryTool {
    ws: Workspace,
}

impl ListDirectoryTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

fn describe_entry(name: &str, path: &Path, display: &str) -> Value {
    match fs::metadata(path) {
        Ok(meta) => {
            let (kind, size) = if meta.is_dir() {
                ("directory", 0)
            } else {
                ("file", meta.len())
            };
            json!({
                "name": name,
                "path": display,
                "type": kind,
                "size_bytes": size,
                "modified_at": timestamp(meta.modified()),
            })
        }
        Err(_) => {
            let kind = if path.is_dir() { "directory" } else { "file" };
            json!({
                "name": name,
                "path": display,
                "type": kind,
                "error": "Could not retrieve metadata",
            })
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List contents of a directory. Supports recursive listing, glob pattern filtering, and inclusion of file metadata."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ListDirectoryArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: ListDirectoryArgs = parse_args(args)?;
        let dir_arg = args.directory_path.unwrap_or_else(|| ".".to_string());
        let dir = self.ws.resolve(&dir_arg);
        let pattern = glob::Pattern::new(args.glob_pattern.as_deref().unwrap_or("*"))
            .map_err(|e| ToolError::InvalidParameters(format!("glob_pattern: {}", e)))?;
        let recursive = args.recursive.unwrap_or(false);
        let with_meta = args.include_metadata.unwrap_or(false);

        let mut items = Vec::new();
        if recursive {
            for entry in WalkDir::new(&dir).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|e| ToolError::Failed(e.to_string()))?;
                let name = entry.file_name().to_string_lossy().to_string();
                if !pattern.matches(&name) {
                    continue;
                }
                let display = Path::new(&dir_arg)
                    .join(entry.path().strip_prefix(&dir).unwrap_or(entry.path()))
                    .display()
                    .to_string();
                items.push(if with_meta {
                    describe_entry(&name, entry.path(), &display)
                } else {
                    Value::String(display)
                });
            }
        } else {
            let mut entries: Vec<_> = fs::read_dir(&dir)?.collect::<Result<_, _>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let name = entry.file_name().to_string_lossy().to_string();
                if !pattern.matches(&name) {
                    continue;
                }
                items.push(if with_meta {
                    let display = Path::new(&dir_arg).join(&name).display().to_string();
                    describe_entry(&name, &entry.path(), &display)
                } else {
                    Value::String(name)
                });
            }
        }
        Ok(ToolResult::ok(json!({ "items": items })))
    }
}

/// 当前工作目录（即 Workspace 根）
pub struct GetCurrentDirectoryTool {
    ws: Workspace,
}

impl GetCurrentDirectoryTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Tool for GetCurrentDirectoryTool {
    fn name(&self) -> &str {
        "get_current_directory"
    }

    fn description(&self) -> &str {
        "Get current working directory."
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        if !args.is_empty() {
            return Err(ToolError::InvalidParameters(
                "this tool takes no parameters".to_string(),
            ));
        }
        Ok(ToolResult::ok(json!({
            "current_directory": self.ws.root().display().to_string()
        })))
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct MetadataArgs {
    /// The path to the file or directory.
    path: String,
}

/// 文件或目录元数据
pub struct GetFileMetadataTool {
    ws: Workspace,
}

impl GetFileMetadataTool {
    pub fn new(ws: Workspace) -> Self {
        Self { ws }
    }
}

#[cfg(unix)]
fn permissions_octal(meta: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("0o{:o}", meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn permissions_octal(meta: &fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "readonly".to_string()
    } else {
        "writable".to_string()
    }
}

#[async_trait]
impl Tool for GetFileMetadataTool {
    fn name(&self) -> &str {
        "get_file_metadata"
    }

    fn description(&self) -> &str {
        "Get metadata for a specified file or directory (e.g., size, type, modification date)."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<MetadataArgs>()
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: MetadataArgs = parse_args(args)?;
        let path = self.ws.resolve(&args.path);
        if !path.exists() {
            return Ok(ToolResult::ok(json!({
                "metadata": { "path": args.path, "exists": false }
            })));
        }
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Ok(ToolResult::failure(format!(
                    "Permission denied for path: {}",
                    args.path
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let file_type = if meta.is_file() {
            "file"
        } else if meta.is_dir() {
            "directory"
        } else {
            "other"
        };
        Ok(ToolResult::ok(json!({
            "metadata": {
                "path": args.path,
                "exists": true,
                "type": file_type,
                "size_bytes": meta.len(),
                "modified_at": timestamp(meta.modified()),
                "created_at": timestamp(meta.created()),
                "permissions": permissions_octal(&meta),
            }
        })))
    }
}
