//! 记忆层：单任务对话记录

pub mod transcript;

pub use transcript::{Transcript, Turn};
