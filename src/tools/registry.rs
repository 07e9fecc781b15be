//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），启动时按固定列表注册，
//! 之后只读；Dispatcher 按名查找并调用。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::ConfirmationPolicy;

/// 工具执行结果：至少包含 `success`，失败时包含 `error`，其余为各工具自有字段
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ToolResult(Map<String, Value>);

impl ToolResult {
    /// 成功结果；`fields` 为对象时其键值并入结果
    pub fn ok(fields: Value) -> Self {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(true));
        if let Value::Object(extra) = fields {
            map.extend(extra);
        }
        Self(map)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::failure_with(error, Value::Null)
    }

    /// 失败结果并附带额外字段（如 HTTP 状态码）
    pub fn failure_with(error: impl Into<String>, fields: Value) -> Self {
        let mut map = Map::new();
        map.insert("success".into(), Value::Bool(false));
        map.insert("error".into(), Value::String(error.into()));
        if let Value::Object(extra) = fields {
            map.extend(extra);
        }
        Self(map)
    }

    pub fn is_success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// 工具执行期间的故障；由 Dispatcher 统一转换为失败的 ToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid or missing parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("{0}")]
    Failed(String),
}

/// 隐式上下文：安全模式、trace id 与确认策略，不出现在模型可见的参数 schema 中
#[derive(Clone)]
pub struct ToolContext {
    pub safe_mode: bool,
    pub trace_id: Option<String>,
    confirmation: Arc<dyn ConfirmationPolicy>,
}

impl ToolContext {
    pub fn new(
        safe_mode: bool,
        trace_id: Option<String>,
        confirmation: Arc<dyn ConfirmationPolicy>,
    ) -> Self {
        Self {
            safe_mode,
            trace_id,
            confirmation,
        }
    }

    /// 破坏性操作前调用：非安全模式直接放行，否则交给确认策略
    pub async fn confirm_destructive(&self, action: &str) -> bool {
        if !self.safe_mode {
            return true;
        }
        let allowed = self.confirmation.confirm(action).await;
        tracing::info!(
            trace_id = self.trace_id.as_deref().unwrap_or("-"),
            action = %action,
            allowed,
            "safe mode confirmation"
        );
        allowed
    }
}

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（tool_call 中的 "tool" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；空对象表示无参数
    fn parameters_schema(&self) -> Value {
        Value::Object(Map::new())
    }

    /// 追加到 system prompt 中该工具条目下的注意事项
    fn prompt_note(&self) -> Option<&str> {
        None
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;
}

/// 将参数对象反序列化为工具自己的参数结构体
pub fn parse_args<T: DeserializeOwned>(args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// 由参数结构体生成 schema（schemars）
pub fn args_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// 工具注册表：保持注册顺序，按名称索引
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者替换先注册者（位置不变）
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => {
                tracing::warn!(tool = %name, "tool registered twice, replacing");
                self.tools[i] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 全部工具的 name / description / parameters 列表（JSON）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
