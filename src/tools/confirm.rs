//! 人工交互：操作员控制台与破坏性操作确认策略
//!
//! OperatorConsole 抽象「读一行 / 打印」，StdinConsole 读标准输入并把 Ctrl-C 视为输入结束；
//! ConfirmationPolicy 决定破坏性操作是否放行，测试中可替换为不阻塞的实现。

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

/// 操作员控制台
#[async_trait]
pub trait OperatorConsole: Send + Sync {
    /// 显示提示并读一行（已去掉行尾换行）；EOF 或中断时返回 None
    async fn read_line(&self, prompt: &str) -> Option<String>;

    fn print(&self, text: &str);
}

/// 标准输入/输出控制台
#[derive(Debug, Default)]
pub struct StdinConsole;

#[async_trait]
impl OperatorConsole for StdinConsole {
    async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();

        // 独立线程读 stdin：被 Ctrl-C 打断后该线程可能仍阻塞，但不会拖住运行时关闭
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let read = match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            };
            let _ = tx.send(read);
        });

        tokio::select! {
            read = rx => read
                .ok()
                .flatten()
                .map(|s| s.trim_end_matches(['\r', '\n']).to_string()),
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("operator input interrupted");
                None
            }
        }
    }

    fn print(&self, text: &str) {
        println!("{}", text);
    }
}

/// 预置输入的控制台：按顺序返回脚本中的行，耗尽后视为 EOF；记录所有输出
#[derive(Debug, Default, Clone)]
pub struct ScriptedConsole {
    inputs: Arc<Mutex<VecDeque<String>>>,
    output: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: Arc::new(Mutex::new(inputs.into_iter().map(Into::into).collect())),
            output: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 已打印的全部文本（含提示语）
    pub fn output(&self) -> Vec<String> {
        self.output.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// 剩余未消费的输入行数
    pub fn remaining(&self) -> usize {
        self.inputs.lock().map(|i| i.len()).unwrap_or(0)
    }
}

#[async_trait]
impl OperatorConsole for ScriptedConsole {
    async fn read_line(&self, prompt: &str) -> Option<String> {
        self.print(prompt);
        self.inputs.lock().ok()?.pop_front()
    }

    fn print(&self, text: &str) {
        if let Ok(mut out) = self.output.lock() {
            out.push(text.to_string());
        }
    }
}

/// 破坏性操作确认策略
#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    /// `action` 为待执行操作的描述，如 "Confirm deletion of 'a.txt'"
    async fn confirm(&self, action: &str) -> bool;
}

/// 通过操作员控制台询问 [y/N]
pub struct ConsoleConfirmation {
    console: Arc<dyn OperatorConsole>,
}

impl ConsoleConfirmation {
    pub fn new(console: Arc<dyn OperatorConsole>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl ConfirmationPolicy for ConsoleConfirmation {
    async fn confirm(&self, action: &str) -> bool {
        let prompt = format!("SAFE MODE: {}? [y/N]: ", action);
        match self.console.read_line(&prompt).await {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}

/// 一律放行
#[derive(Debug, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPolicy for AutoApprove {
    async fn confirm(&self, _action: &str) -> bool {
        true
    }
}

/// 一律拒绝（非交互任务使用）
#[derive(Debug, Default)]
pub struct AutoDeny;

#[async_trait]
impl ConfirmationPolicy for AutoDeny {
    async fn confirm(&self, action: &str) -> bool {
        tracing::warn!(action = %action, "destructive action refused without an operator");
        false
    }
}
