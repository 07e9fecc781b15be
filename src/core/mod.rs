//! 核心层：初始化错误与 Agent 构建器

pub mod builder;
pub mod error;

pub use builder::AgentBuilder;
pub use error::AgentError;
