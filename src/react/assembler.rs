//! 响应拼装：消费模型流，逐块推送给 EventSink，并拼出完整文本
//!
//! 流中途出错即停止；已收到的部分仅用于诊断，不会进入对话记录。

use futures_util::StreamExt;
use thiserror::Error;

use crate::llm::{LlmError, ResponseStream};
use crate::react::{EventSink, ReactEvent};

/// 流中途失败
#[derive(Error, Debug, Clone, PartialEq)]
#[error("stream failed after {} chars: {source}", .partial.chars().count())]
pub struct StreamFailure {
    /// 失败前已拼出的文本
    pub partial: String,
    pub source: LlmError,
}

/// 拼装整条回复；空流返回空串
pub async fn assemble(
    mut stream: ResponseStream,
    sink: &dyn EventSink,
    trace_id: &str,
) -> Result<String, StreamFailure> {
    let mut text = String::new();
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if chunk.is_empty() {
                    continue;
                }
                chunks += 1;
                sink.emit(ReactEvent::MessageChunk {
                    text: chunk.clone(),
                });
                text.push_str(&chunk);
            }
            Err(source) => {
                sink.emit(ReactEvent::MessageDone);
                tracing::error!(
                    trace_id,
                    kind = source.kind(),
                    error = %source,
                    chunks,
                    "error during model response stream"
                );
                return Err(StreamFailure {
                    partial: text,
                    source,
                });
            }
        }
    }
    sink.emit(ReactEvent::MessageDone);

    if text.is_empty() {
        tracing::info!(trace_id, "Model returned an empty response stream.");
    } else {
        let preview: String = text.chars().take(500).collect();
        tracing::debug!(trace_id, len = text.len(), chunks, "full agent response: {}", preview);
    }
    Ok(text)
}
