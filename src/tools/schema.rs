//! 工具调用 JSON Schema 生成（schemars）
//!
//! 将 `<tool_call>` 块内 JSON 的结构注入 system prompt，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 工具调用载荷格式：与 extractor 解析的 `{"tool": "...", "parameters": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 read_file、execute_command
    pub tool: String,
    /// 工具参数，键为参数名
    pub parameters: HashMap<String, serde_json::Value>,
}

/// 返回工具调用载荷的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
