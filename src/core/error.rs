//! 初始化阶段的错误类型
//!
//! 任务执行期间的故障（模型、流、工具）不会走到这里：它们被转成最终文本与 TaskState。

use thiserror::Error;

/// 配置、日志、模型客户端与工作目录初始化失败
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Logging setup failed: {0}")]
    LoggingError(String),

    #[error("LLM client error: {0}")]
    LlmClientError(String),

    #[error("Workspace error: {0}")]
    WorkspaceError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
