//! 工具调用分发
//!
//! 持有 ToolRegistry，dispatch(request, ctx) 按名查找工具并执行；未知工具、参数形状不对与执行故障
//! 一律转为 `{success: false, error}` 结果回写给模型，不向上传播。每次调用输出结构化审计日志（JSON）。

use std::time::Instant;

use serde_json::{Map, Value};

use crate::tools::{ToolContext, ToolError, ToolRegistry, ToolResult};

/// 从 agent 文本中解析出的一次工具调用：`{"tool": "...", "parameters": {...}}`
///
/// 两个字段保留原始 JSON 值，形状是否合法由分发器判断并以失败结果反馈给模型。
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// `tool` 字段原值，缺失时为 Null
    pub tool: Value,
    /// `parameters` 字段原值，缺失时为空对象
    pub parameters: Value,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool: Value::String(tool.into()),
            parameters: Value::Object(parameters),
        }
    }

    /// 由 tool_call 块中的 JSON 对象构造
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        Self {
            tool: object.remove("tool").unwrap_or(Value::Null),
            parameters: object
                .remove("parameters")
                .unwrap_or_else(|| Value::Object(Map::new())),
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_str()
    }

    /// 日志、事件与 tool-result 回合使用的名称；非字符串按 JSON 文本显示
    pub fn display_name(&self) -> String {
        match &self.tool {
            Value::String(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

/// 分发器：注册表只读，按名解析并调用
pub struct Dispatcher {
    registry: ToolRegistry,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一次工具调用，任何故障都归一为失败结果
    pub async fn dispatch(&self, request: &ToolCallRequest, ctx: &ToolContext) -> ToolResult {
        let name = request.display_name();
        let trace_id = ctx.trace_id.as_deref().unwrap_or("-");

        let Some(tool) = request.tool_name().and_then(|n| self.registry.get(n)) else {
            tracing::error!(trace_id, tool = %name, "unknown tool called");
            return ToolResult::failure(format!("Unknown tool: {}", name));
        };

        tracing::debug!(trace_id, tool = %name, params = %request.parameters, "executing tool");

        let schema = tool.parameters_schema();
        let start = Instant::now();
        let outcome = match &request.parameters {
            Value::Object(args) => tool.execute(args.clone(), ctx).await,
            other => Err(ToolError::InvalidParameters(format!(
                "expected a JSON object, got {}",
                json_type(other)
            ))),
        };
        let result = match outcome {
            Ok(result) => result,
            Err(ToolError::InvalidParameters(detail)) => {
                let msg = format!(
                    "Tool execution error for '{}': Invalid or missing parameters. Expected: {}. Received: {}. Details: {}",
                    name,
                    schema,
                    request.parameters,
                    detail
                );
                tracing::error!(trace_id, tool = %name, "{}", msg);
                ToolResult::failure(msg)
            }
            Err(e) => {
                tracing::error!(trace_id, tool = %name, error = %e, "tool execution error");
                ToolResult::failure(format!("Tool execution error for '{}': {}", name, e))
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "trace_id": trace_id,
            "success": result.is_success(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&request.parameters),
        });
        tracing::info!(trace_id, audit = %audit, "tool");

        result
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
