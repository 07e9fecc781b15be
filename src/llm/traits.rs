//! 模型端点抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::open_stream：接收完整对话记录，
//! 返回文本块流或已分类的错误。打开流之后的失败以流中的 Err 项出现。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Turn;

/// 端点错误分类：前两类为可重试的瞬时故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 5xx 等服务端瞬时故障
    #[error("Server error: {0}")]
    Server(String),

    /// 429 / 配额耗尽
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 端点报告的其它错误（鉴权、参数、模型不存在等）
    #[error("API error: {0}")]
    Api(String),

    /// 无法归类的故障（网络、反序列化等）
    #[error("{0}")]
    Unclassified(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Server(_) | LlmError::RateLimited(_))
    }

    /// 日志与错误文本中使用的类别名
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Server(_) => "ServerError",
            LlmError::RateLimited(_) => "RateLimited",
            LlmError::Api(_) => "ApiError",
            LlmError::Unclassified(_) => "Unclassified",
        }
    }

    /// 按 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => LlmError::RateLimited(message),
            500..=599 => LlmError::Server(message),
            _ => LlmError::Api(format!("{} (status {})", message, status)),
        }
    }
}

/// 文本块流
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 模型端点 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次调用：打开流式响应（不含重试）
    async fn open_stream(&self, turns: &[Turn]) -> Result<ResponseStream, LlmError>;

    /// 模型名（用于日志）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
