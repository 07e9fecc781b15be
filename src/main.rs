//! agentloop 命令行入口
//!
//! 加载配置、初始化日志、组装 TaskEngine 并执行一个任务；最终回复打印在 stdout 的标记之间。
//! 退出码：任务失败或初始化失败为 1，其余为 0。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use agentloop::config::load_config;
use agentloop::core::AgentBuilder;
use agentloop::observability;
use agentloop::react::ConsoleSink;
use agentloop::tools::StdinConsole;
use agentloop::{TaskOptions, TaskState};

#[derive(Parser, Debug)]
#[command(
    name = "agentloop",
    version,
    about = "Tool-using agent that works on a task until it is done"
)]
struct Cli {
    /// 要执行的任务描述
    task: String,

    /// 最大迭代次数（覆盖配置）
    #[arg(long)]
    max_iterations: Option<usize>,

    /// 预算耗尽时进入人工介入菜单
    #[arg(long, overrides_with = "no_interactive")]
    interactive: bool,

    #[arg(long = "no-interactive", overrides_with = "interactive")]
    no_interactive: bool,

    /// 破坏性操作前需要确认
    #[arg(long, overrides_with = "no_safe_mode")]
    safe_mode: bool,

    #[arg(long = "no-safe-mode", overrides_with = "safe_mode")]
    no_safe_mode: bool,

    /// 额外的配置文件（必须存在）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 控制台输出 DEBUG 日志
    #[arg(short, long)]
    verbose: bool,
}

/// --flag / --no-flag 对；都未给出时返回 None
fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

async fn run(cli: Cli) -> anyhow::Result<TaskState> {
    let config = load_config(cli.config.clone()).context("Failed to load configuration")?;
    let log_level = observability::init(&config.logging, cli.verbose)
        .context("Failed to initialize logging")?;

    let builder = AgentBuilder::from_config(config).context("Failed to prepare workspace")?;
    let engine = builder
        .build_engine(log_level, Arc::new(ConsoleSink), Arc::new(StdinConsole))
        .context("Failed to initialize agent")?;

    let options = TaskOptions {
        max_iterations: cli.max_iterations,
        interactive: flag_pair(cli.interactive, cli.no_interactive),
        safe_mode: flag_pair(cli.safe_mode, cli.no_safe_mode),
    };
    let outcome = engine.execute_task(&cli.task, options).await;

    println!("\n--- Final Agent Response ---");
    println!("{}", outcome.text);
    println!("--- End of Final Agent Response ---");

    Ok(outcome.state)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(TaskState::Failed) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
