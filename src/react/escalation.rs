//! 人工介入：迭代预算耗尽后的操作员菜单
//!
//! 继续 / 反馈 / 审阅历史 / 停止 / 切换详细日志。继续与反馈交给一次续跑，续跑返回后菜单即结束，
//! 续跑自身再次耗尽时不会再弹菜单。读取输入时的 Ctrl-C 或输入关闭按「停止」处理。

use crate::react::loop_::{TaskEngine, TaskSession, TaskState};
use crate::tools::ToolContext;

const MENU: &str = concat!(
    "\nThe agent may need more steps or different guidance to complete the task.\n",
    "\nOptions:\n",
    "  [C]ontinue       - Continue for more iterations\n",
    "  [F]eedback       - Provide feedback to the agent\n",
    "  [R]eview History - Display conversation history\n",
    "  [S]top Task      - Stop the current task\n",
    "  [V]erbose Toggle - Toggle verbose logging (DEBUG/INFO)",
);

/// 菜单选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Continue,
    Feedback,
    Review,
    Stop,
    VerboseToggle,
}

impl MenuChoice {
    /// 大小写不敏感，接受首字母或完整名称
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "c" | "continue" => Some(MenuChoice::Continue),
            "f" | "feedback" => Some(MenuChoice::Feedback),
            "r" | "review" | "review history" => Some(MenuChoice::Review),
            "s" | "stop" | "stop task" => Some(MenuChoice::Stop),
            "v" | "verbose" | "verbose toggle" => Some(MenuChoice::VerboseToggle),
            _ => None,
        }
    }
}

fn interrupted(
    engine: &TaskEngine,
    session: &TaskSession,
    last_text: String,
) -> (String, TaskState) {
    tracing::info!(trace_id = %session.trace_id, "User interrupted continuation choice.");
    engine.console().print("\nStopping task due to user interruption.");
    (last_text, TaskState::Stopped)
}

/// 菜单循环；返回任务最终文本与状态
pub(crate) async fn escalate(
    engine: &TaskEngine,
    session: &mut TaskSession,
    last_text: String,
    ctx: &ToolContext,
) -> (String, TaskState) {
    let console = engine.console();
    let additional = engine.settings().additional_iterations;
    let trace_id = session.trace_id.clone();

    loop {
        console.print(MENU);
        let Some(input) = console.read_line("Your choice: ").await else {
            return interrupted(engine, session, last_text);
        };

        match MenuChoice::parse(&input) {
            Some(MenuChoice::Continue) => {
                tracing::info!(
                    trace_id = %trace_id,
                    additional,
                    "User chose to [C]ontinue the task."
                );
                return engine.run_rounds(session, additional, true, ctx).await;
            }
            Some(MenuChoice::Feedback) => {
                tracing::info!(trace_id = %trace_id, "User chose to provide [F]eedback.");
                let Some(feedback) = console
                    .read_line("Please provide your feedback or guidance for the agent: ")
                    .await
                else {
                    return interrupted(engine, session, last_text);
                };
                let feedback = feedback.trim();
                if feedback.is_empty() {
                    console.print("No feedback provided. Please choose an option.");
                    continue;
                }
                session.transcript.push_user(feedback);
                tracing::info!(
                    trace_id = %trace_id,
                    additional,
                    "User feedback added to history: '{}'",
                    feedback.chars().take(100).collect::<String>()
                );
                return engine.run_rounds(session, additional, true, ctx).await;
            }
            Some(MenuChoice::Review) => {
                tracing::info!(trace_id = %trace_id, "User chose to [R]eview History.");
                let mut out = String::from("\n--- Conversation History ---\n");
                if session.transcript.is_empty() {
                    out.push_str("History is empty.\n");
                }
                out.push_str(&session.transcript.render());
                out.push_str("--- End of History ---\n");
                console.print(&out);
            }
            Some(MenuChoice::Stop) => {
                tracing::info!(trace_id = %trace_id, "User chose to [S]top the task.");
                return (last_text, TaskState::Stopped);
            }
            Some(MenuChoice::VerboseToggle) => {
                if engine.log_level().toggle_verbose() {
                    console.print("Verbose logging ON. Log level set to DEBUG.");
                } else {
                    console.print("Verbose logging OFF. Log level set to INFO.");
                }
            }
            None => {
                console.print(&format!(
                    "Invalid choice: '{}'. Please select from the available options.",
                    input.trim()
                ));
            }
        }
    }
}
