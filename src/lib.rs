//! agentloop - 工具调用型对话智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 初始化错误、Agent 构建器
//! - **llm**: 模型端点抽象、重试与退避、OpenAI 兼容 / DeepSeek / Mock 实现
//! - **memory**: 单任务对话记录（Transcript）
//! - **observability**: tracing 订阅器与运行时日志级别
//! - **react**: 响应拼装、工具调用提取、任务主循环、人工介入
//! - **tools**: 工具契约、注册表、分发器、确认策略与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use react::{TaskEngine, TaskOptions, TaskOutcome, TaskState};
