//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! - MockLlmClient：回显最后一条 user 回合，不发出工具调用，任务一轮即完成
//! - ScriptedLlmClient：按脚本依次返回文本块 / 打开失败 / 中途断流，并记录每次调用看到的对话

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{LlmClient, LlmError, ResponseStream};
use crate::memory::Turn;

/// 回显客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn open_stream(&self, turns: &[Turn]) -> Result<ResponseStream, LlmError> {
        let last_user = turns
            .iter()
            .rev()
            .find_map(|t| match t {
                Turn::User { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");
        let reply = format!("Echo from Mock: {}", last_user);
        Ok(Box::pin(stream::iter(vec![Ok(reply)])))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 单次调用的脚本化结果
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 正常返回的文本块
    Chunks(Vec<String>),
    /// 打开流即失败
    Fail(LlmError),
    /// 先产出若干块，随后流中报错
    Broken(Vec<String>, LlmError),
}

impl MockReply {
    /// 单块文本回复
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Chunks(vec![text.into()])
    }
}

/// 脚本化客户端：脚本耗尽后返回 Api 错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 调用次数（含失败的尝试）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用时传入的对话快照
    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn open_stream(&self, turns: &[Turn]) -> Result<ResponseStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(turns.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match next {
            Some(MockReply::Chunks(chunks)) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
            }
            Some(MockReply::Fail(e)) => Err(e),
            Some(MockReply::Broken(chunks, e)) => {
                let items: Vec<Result<String, LlmError>> =
                    chunks.into_iter().map(Ok).chain(std::iter::once(Err(e))).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            None => Err(LlmError::Api("mock script exhausted".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-mock"
    }
}
