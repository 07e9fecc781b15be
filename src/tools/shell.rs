//! Shell 命令执行
//!
//! 通过 sh -c / cmd /C 执行任意命令，带超时与可选工作目录；属于破坏性操作，安全模式下须经确认。
//! 超时后子进程随 Child 一起被杀掉（kill_on_drop）。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::tools::filesystem::Workspace;
use crate::tools::registry::{args_schema, parse_args};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CommandArgs {
    /// command to execute
    command: String,
    /// Optional. Maximum time in seconds for the command to run.
    timeout_seconds: Option<u64>,
    /// Optional. Directory to run the command in, defaults to the agent's working directory.
    working_directory: Option<String>,
}

/// execute_command 工具
pub struct ExecuteCommandTool {
    ws: Workspace,
    default_timeout_secs: u64,
}

impl ExecuteCommandTool {
    pub fn new(ws: Workspace, default_timeout_secs: u64) -> Self {
        Self {
            ws,
            default_timeout_secs,
        }
    }
}

fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(cwd).kill_on_drop(true);
    cmd
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Run terminal/shell commands. Supports optional timeout_seconds and working_directory parameters."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<CommandArgs>()
    }

    fn prompt_note(&self) -> Option<&str> {
        Some("ALWAYS check the `return_code` and `stderr` fields in the result. A non-zero `return_code` indicates failure.")
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let args: CommandArgs = parse_args(args)?;
        let command = args.command.trim();
        if command.is_empty() {
            return Err(ToolError::InvalidParameters("command is empty".to_string()));
        }
        if !ctx
            .confirm_destructive(&format!("Confirm execution of command: '{}'", command))
            .await
        {
            return Ok(ToolResult::failure("Command execution not confirmed by user."));
        }

        let cwd = match &args.working_directory {
            Some(dir) => self.ws.resolve(dir),
            None => self.ws.root().to_path_buf(),
        };
        let timeout_secs = args.timeout_seconds.unwrap_or(self.default_timeout_secs);
        tracing::info!(
            trace_id = ctx.trace_id.as_deref().unwrap_or("-"),
            command = %command,
            cwd = %cwd.display(),
            "execute_command"
        );

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            shell_command(command, &cwd).output(),
        )
        .await
        {
            Ok(out) => out?,
            Err(_) => {
                return Ok(ToolResult::failure(format!(
                    "Command timed out after {} seconds",
                    timeout_secs
                )))
            }
        };

        Ok(ToolResult::ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "return_code": output.status.code(),
        })))
    }
}
