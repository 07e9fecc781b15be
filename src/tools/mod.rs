//! 工具层：能力契约、注册表、分发器、确认策略与内置工具

pub mod confirm;
pub mod executor;
pub mod filesystem;
pub mod http;
pub mod registry;
pub mod schema;
pub mod search;
pub mod shell;

pub use confirm::{
    AutoApprove, AutoDeny, ConfirmationPolicy, ConsoleConfirmation, OperatorConsole,
    ScriptedConsole, StdinConsole,
};
pub use executor::{Dispatcher, ToolCallRequest};
pub use filesystem::{
    CreateDirectoryTool, DeleteFileTool, GetCurrentDirectoryTool, GetFileMetadataTool,
    ListDirectoryTool, ReadFileTool, Workspace, WriteFileTool,
};
pub use http::HttpRequestTool;
pub use registry::{Tool, ToolContext, ToolError, ToolRegistry, ToolResult};
pub use schema::tool_call_schema_json;
pub use search::{SearchDirectoryFilesTool, SearchFileContentTool};
pub use shell::ExecuteCommandTool;

/// 内置工具的固定注册列表
pub fn builtin_registry(
    ws: &Workspace,
    command_timeout_secs: u64,
    http_timeout_secs: u64,
) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(ReadFileTool::new(ws.clone()));
    tools.register(WriteFileTool::new(ws.clone()));
    tools.register(DeleteFileTool::new(ws.clone()));
    tools.register(CreateDirectoryTool::new(ws.clone()));
    tools.register(ListDirectoryTool::new(ws.clone()));
    tools.register(GetCurrentDirectoryTool::new(ws.clone()));
    tools.register(GetFileMetadataTool::new(ws.clone()));
    tools.register(SearchFileContentTool::new(ws.clone()));
    tools.register(SearchDirectoryFilesTool::new(ws.clone()));
    tools.register(ExecuteCommandTool::new(ws.clone(), command_timeout_secs));
    tools.register(HttpRequestTool::new(http_timeout_secs));
    tracing::info!(count = tools.len(), tools = %tools.tool_names().join(", "), "tools loaded");
    tools
}
