//! 任务执行过程事件：流式文本、工具调用、观察与终止状态
//!
//! Task Engine 只向 EventSink 发事件，不直接写终端；CLI 用 ConsoleSink，前端或测试可用 mpsc 通道接收。

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 迭代开始（global 为全任务累计序号，local/budget 为本轮预算内的位置）
    StepUpdate {
        global: usize,
        local: usize,
        budget: usize,
        continuation: bool,
    },
    /// 正在调用模型
    Thinking,
    /// 模型回复的一段（流式输出）
    MessageChunk { text: String },
    /// 本轮回复结束
    MessageDone,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具返回 success=false
    ToolFailure { tool: String, reason: String },
    /// 迭代预算耗尽
    Exhausted { iterations: usize },
    /// 模型调用或流式输出失败
    Error { text: String },
}

/// 事件接收方
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ReactEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ReactEvent) {}
}

/// 把流式文本写到 stdout；其余事件交给日志
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: ReactEvent) {
        let mut out = std::io::stdout().lock();
        match event {
            ReactEvent::Thinking => {
                let _ = write!(out, "Agent: ");
            }
            ReactEvent::MessageChunk { text } => {
                let _ = write!(out, "{}", text);
            }
            ReactEvent::MessageDone => {
                let _ = writeln!(out);
            }
            _ => {}
        }
        let _ = out.flush();
    }
}

impl EventSink for UnboundedSender<ReactEvent> {
    fn emit(&self, event: ReactEvent) {
        let _ = self.send(event);
    }
}
