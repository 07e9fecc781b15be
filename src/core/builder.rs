//! Agent 构建器：由 AppConfig 组装工具注册表、模型客户端与 TaskEngine
//!
//! CLI 与集成方共用同一套初始化逻辑；任何一步失败都以 AgentError 返回，调用方据此以非零码退出。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::observability::LogLevelHandle;
use crate::react::{EventSink, TaskEngine};
use crate::tools::{builtin_registry, OperatorConsole, ToolRegistry, Workspace};

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    workspace: Workspace,
}

impl AgentBuilder {
    pub fn new(config: AppConfig, workspace: impl AsRef<Path>) -> Self {
        Self {
            config,
            workspace: Workspace::new(workspace),
        }
    }

    /// 工作目录取 [tools].workspace_root，未设置时用当前目录；目录必须存在
    pub fn from_config(config: AppConfig) -> Result<Self, AgentError> {
        let root: PathBuf = match &config.tools.workspace_root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        if !root.is_dir() {
            return Err(AgentError::WorkspaceError(format!(
                "workspace root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self::new(config, root))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// 内置工具注册表
    pub fn build_tool_registry(&self) -> ToolRegistry {
        builtin_registry(
            &self.workspace,
            self.config.tools.command_timeout_secs,
            self.config.tools.http_timeout_secs,
        )
    }

    pub fn build_llm(&self) -> Result<Arc<dyn LlmClient>, AgentError> {
        create_llm_from_config(&self.config.llm)
    }

    /// 读取 [agent].system_prompt_path 指定的行为准则；未配置时返回 None
    pub fn load_preamble(&self) -> Result<Option<String>, AgentError> {
        let Some(path) = &self.config.agent.system_prompt_path else {
            return Ok(None);
        };
        std::fs::read_to_string(path).map(Some).map_err(|e| {
            AgentError::ConfigError(format!(
                "cannot read system prompt {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// 组装 TaskEngine
    pub fn build_engine(
        &self,
        log_level: LogLevelHandle,
        sink: Arc<dyn EventSink>,
        console: Arc<dyn OperatorConsole>,
    ) -> Result<TaskEngine, AgentError> {
        let llm = self.build_llm()?;
        let mut builder = TaskEngine::builder(llm, self.build_tool_registry())
            .retry(self.config.llm.retry.to_retry_config())
            .settings(self.config.agent.clone())
            .event_sink(sink)
            .console(console)
            .log_level(log_level);
        if let Some(preamble) = self.load_preamble()? {
            builder = builder.system_prompt(preamble);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::NullSink;
    use crate::tools::ScriptedConsole;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg
    }

    #[test]
    fn test_engine_from_mock_config() {
        let dir = tempfile::tempdir().unwrap();
        let prompt_path = dir.path().join("system.md");
        std::fs::write(&prompt_path, "You are terse.").unwrap();

        let mut cfg = mock_config();
        cfg.agent.system_prompt_path = Some(prompt_path);
        cfg.tools.workspace_root = Some(dir.path().to_path_buf());

        let builder = AgentBuilder::from_config(cfg).unwrap();
        assert_eq!(builder.build_tool_registry().len(), 11);
        let engine = builder
            .build_engine(
                LogLevelHandle::detached(),
                Arc::new(NullSink),
                Arc::new(ScriptedConsole::default()),
            )
            .unwrap();
        assert!(engine.system_prompt().starts_with("You are terse."));
        assert!(engine.registry().contains("execute_command"));
    }

    #[test]
    fn test_missing_prompt_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = mock_config();
        cfg.agent.system_prompt_path = Some(dir.path().join("missing.md"));
        let builder = AgentBuilder::new(cfg, dir.path());
        assert!(matches!(
            builder.load_preamble(),
            Err(AgentError::ConfigError(_))
        ));
    }

    #[test]
    fn test_workspace_root_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = mock_config();
        cfg.tools.workspace_root = Some(dir.path().join("nope"));
        assert!(matches!(
            AgentBuilder::from_config(cfg),
            Err(AgentError::WorkspaceError(_))
        ));
    }
}
