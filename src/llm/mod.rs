//! LLM 层：端点抽象、重试客户端与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, MockReply, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{LlmClient, LlmError, ResponseStream};

use crate::config::LlmSection;
use crate::core::AgentError;

/// 按 [llm] 段创建端点客户端；未知 provider 或缺少 API Key 视为初始化失败
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.provider.trim().to_lowercase();
    let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());

    match provider.as_str() {
        "openai" => {
            let Some(key) = api_key else {
                return Err(AgentError::LlmClientError(format!(
                    "environment variable {} is not set",
                    cfg.api_key_env
                )));
            };
            tracing::info!(
                model = %cfg.model,
                base_url = ?cfg.base_url,
                "Using OpenAI-compatible LLM"
            );
            Ok(Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                Some(&key),
            )))
        }
        "deepseek" => {
            let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok().filter(|k| !k.is_empty());
            if deepseek_key.is_none() && api_key.is_none() {
                return Err(AgentError::LlmClientError(format!(
                    "neither DEEPSEEK_API_KEY nor {} is set",
                    cfg.api_key_env
                )));
            }
            tracing::info!(model = %cfg.model, "Using DeepSeek LLM");
            Ok(Arc::new(create_deepseek_client(
                Some(&cfg.model),
                cfg.base_url.as_deref(),
                api_key.as_deref(),
            )))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM (echo, no tool calls)");
            Ok(Arc::new(MockLlmClient))
        }
        other => Err(AgentError::LlmClientError(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}
