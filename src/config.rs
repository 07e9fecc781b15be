//! 应用配置：从 config/default.toml、调用方指定的文件与环境变量加载
//!
//! 加载顺序：先读默认 TOML，再叠加 `--config` 指定的文件（必须存在），最后用环境变量 `AGENTLOOP__*` 覆盖
//! （双下划线表示嵌套，如 `AGENTLOOP__LLM__RETRY__MAX_RETRIES=5`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSettings,
    pub llm: LlmSection,
    pub logging: LoggingSection,
    pub tools: ToolsSection,
}

/// [agent] 段：迭代预算、交互与安全模式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: usize,
    /// 预算耗尽时是否进入人工介入菜单
    pub interactive_mode: bool,
    /// 破坏性工具执行前是否需要确认
    pub safe_mode: bool,
    /// 每次人工续跑追加的迭代数
    pub additional_iterations: usize,
    /// 覆盖内置行为准则的文件
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            interactive_mode: false,
            safe_mode: true,
            additional_iterations: 3,
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            retry: RetrySection::default(),
        }
    }
}

/// [llm.retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_retry_delay_seconds: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_seconds: 2.0,
        }
    }
}

impl RetrySection {
    /// 负数或非有限值按 0 处理
    pub fn to_retry_config(&self) -> RetryConfig {
        let secs = self.base_retry_delay_seconds;
        let base = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        };
        RetryConfig::new(self.max_retries, base)
    }
}

/// [logging] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub default_level: String,
    pub log_to_file: bool,
    pub log_file_path: PathBuf,
    pub file_log_level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            log_to_file: false,
            log_file_path: PathBuf::from("agent.log"),
            file_log_level: "debug".to_string(),
        }
    }
}

/// [tools] 段：工作目录与工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 相对路径的解析基准，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    pub command_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            command_timeout_secs: 30,
            http_timeout_secs: 10,
        }
    }
}

/// 加载配置
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（不存在时报错）
/// 3. 最后叠加环境变量 AGENTLOOP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::Message(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AGENTLOOP")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
