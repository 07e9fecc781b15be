//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），以流式方式返回文本块。
//! 端点常在首个流事件里才报告 429 / 5xx，因此 open_stream 会先取出首个事件再交还流，
//! 使这类故障仍落在重试循环之内。

use std::sync::OnceLock;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use regex::Regex;

use crate::llm::{LlmClient, LlmError, ResponseStream};
use crate::memory::Turn;

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

/// 回合 → 请求消息：指令为 system，模型输出为 assistant，其余（任务、反馈、工具结果）为 user
fn to_openai_messages(turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
    turns
        .iter()
        .map(|turn| {
            let content = turn.content();
            let message: ChatCompletionRequestMessage = match turn {
                Turn::Instruction { .. } => ChatCompletionRequestSystemMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
                Turn::Agent { .. } => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
                Turn::User { .. } | Turn::ToolResult { .. } => {
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()?
                        .into()
                }
            };
            Ok(message)
        })
        .collect()
}

static STATUS_RE: OnceLock<Regex> = OnceLock::new();

/// 从错误文本推断类别（流错误只暴露文本）
fn classify_text(text: &str) -> Option<LlmError> {
    let lower = text.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("quota")
        || lower.contains("resource exhausted")
    {
        return Some(LlmError::RateLimited(text.to_string()));
    }
    let re = STATUS_RE.get_or_init(|| Regex::new(r"\b(429|5\d\d)\b").unwrap());
    let code = re.captures(text)?.get(1)?.as_str();
    if code == "429" {
        Some(LlmError::RateLimited(text.to_string()))
    } else {
        Some(LlmError::Server(text.to_string()))
    }
}

/// async_openai 错误 → LlmError
pub(crate) fn classify(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => LlmError::from_status(status.as_u16(), e.to_string()),
            None => LlmError::Unclassified(e.to_string()),
        },
        OpenAIError::ApiError(api) => {
            let text = api.message.clone();
            let code = api.code.clone().unwrap_or_default();
            classify_text(&format!("{} {}", code, text))
                .unwrap_or_else(|| LlmError::Api(text))
        }
        other => {
            let text = other.to_string();
            classify_text(&text).unwrap_or(LlmError::Unclassified(text))
        }
    }
}

fn chunk_text(chunk: CreateChatCompletionStreamResponse) -> String {
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default()
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn open_stream(&self, turns: &[Turn]) -> Result<ResponseStream, LlmError> {
        let messages =
            to_openai_messages(turns).map_err(|e| LlmError::Unclassified(e.to_string()))?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .stream(true)
            .build()
            .map_err(|e| LlmError::Unclassified(e.to_string()))?;

        let mut upstream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(classify)?;

        let first = match upstream.next().await {
            Some(Ok(chunk)) => chunk_text(chunk),
            Some(Err(e)) => return Err(classify(e)),
            None => String::new(),
        };

        let rest = upstream.map(|item| item.map(chunk_text).map_err(classify));
        Ok(Box::pin(stream::once(async move { Ok(first) }).chain(rest)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
