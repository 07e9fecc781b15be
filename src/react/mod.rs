//! 执行层：响应拼装、工具调用提取、任务主循环与人工介入

pub mod assembler;
pub mod escalation;
pub mod events;
pub mod extractor;
pub mod loop_;
pub mod prompt;

pub use assembler::{assemble, StreamFailure};
pub use escalation::MenuChoice;
pub use events::{ConsoleSink, EventSink, NullSink, ReactEvent};
pub use extractor::{extract_tool_calls, Extraction};
pub use loop_::{TaskEngine, TaskEngineBuilder, TaskOptions, TaskOutcome, TaskSession, TaskState};
pub use prompt::{build_system_prompt, DEFAULT_PREAMBLE};
