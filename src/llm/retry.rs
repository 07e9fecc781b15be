//! 带重试的模型客户端
//!
//! 最多尝试 max_retries 次；服务端瞬时故障与限流按 base_delay * 2^attempt 指数退避后重试，
//! 其它错误立即返回。流一旦打开不再重试。

use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, LlmError, ResponseStream};
use crate::memory::Turn;

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数（至少 1）
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// 第 attempt 次（0 起）失败后、下一次尝试前的等待时长
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 包装任意 LlmClient，施加重试与退避
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    /// 打开流式响应；返回流或最后一次的错误
    pub async fn generate(
        &self,
        turns: &[Turn],
        trace_id: &str,
    ) -> Result<ResponseStream, LlmError> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::info!(
                    trace_id,
                    "Retrying API call to model (attempt {}/{})",
                    attempt + 1,
                    attempts
                );
            }
            tracing::debug!(
                trace_id,
                model = %self.inner.model_name(),
                turns = turns.len(),
                "generating content"
            );

            match self.inner.open_stream(turns).await {
                Ok(stream) => {
                    if attempt > 0 {
                        tracing::info!(trace_id, "API call successful on retry");
                    }
                    return Ok(stream);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        trace_id,
                        kind = e.kind(),
                        "API call failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        let delay = self.config.backoff_delay(attempt);
                        tracing::info!(
                            trace_id,
                            delay_ms = delay.as_millis() as u64,
                            "will retry after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(trace_id, "Max retries reached for API call");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        trace_id,
                        kind = e.kind(),
                        "API call failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Unclassified("no attempt was made".to_string())))
    }
}
