//! 可观测性：tracing 订阅器初始化与运行时日志级别切换
//!
//! - 控制台层写 stderr（stdout 留给流式回复与最终答案），过滤器可热替换，供人工介入菜单切换 INFO/DEBUG
//! - 可选文件层：追加写入，无 ANSI 颜色，独立级别

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::config::LoggingSection;
use crate::core::AgentError;

/// 控制台日志级别句柄
#[derive(Clone)]
pub struct LogLevelHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    verbose: Arc<AtomicBool>,
}

impl LogLevelHandle {
    /// 不绑定订阅器的句柄（测试或嵌入方自管日志时使用），只记录开关状态
    pub fn detached() -> Self {
        Self {
            reload: None,
            verbose: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::SeqCst)
    }

    /// 在 info / debug 之间切换，返回切换后是否为 debug
    pub fn toggle_verbose(&self) -> bool {
        let verbose = !self.verbose.load(Ordering::SeqCst);
        self.verbose.store(verbose, Ordering::SeqCst);
        if let Some(handle) = &self.reload {
            let level = if verbose { "debug" } else { "info" };
            if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(level)) {
                tracing::warn!(error = %e, "failed to change log level");
            }
        }
        tracing::info!(verbose, "console log level changed");
        verbose
    }
}

impl Default for LogLevelHandle {
    fn default() -> Self {
        Self::detached()
    }
}

/// 过滤器放行 debug 记录时视为详细模式
fn enables_debug(filter: &EnvFilter) -> bool {
    filter
        .max_level_hint()
        .is_some_and(|level| level >= LevelFilter::DEBUG)
}

/// 安装全局订阅器；verbose 为真时控制台强制 debug，否则 RUST_LOG 优先于配置
pub fn init(logging: &LoggingSection, verbose: bool) -> Result<LogLevelHandle, AgentError> {
    let console_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&logging.default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let verbose = enables_debug(&console_filter);
    let (console_filter, reload_handle) = reload::Layer::new(console_filter);
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = if logging.log_to_file {
        if let Some(parent) = logging.log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.log_file_path)?;
        let file_filter = EnvFilter::try_new(&logging.file_log_level)
            .map_err(|e| AgentError::LoggingError(format!("file_log_level: {}", e)))?;
        Some(
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(file_filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AgentError::LoggingError(e.to_string()))?;

    Ok(LogLevelHandle {
        reload: Some(reload_handle),
        verbose: Arc::new(AtomicBool::new(verbose)),
    })
}
