//! 任务执行主循环
//!
//! 每轮：快照对话 -> 调用模型（带重试）-> 拼装流式回复 -> 追加 agent 回合 -> 提取并依次分发工具调用
//! -> 追加 tool-result 回合 -> 无工具调用则完成，否则进入下一轮。
//! 状态：ITERATING -> {Complete, Exhausted, Failed}；Exhausted 且为交互模式时进入人工介入菜单，
//! 续跑复用同一份对话记录与 trace_id。

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::AgentSettings;
use crate::llm::{LlmClient, RetryConfig, RetryingLlmClient};
use crate::memory::Transcript;
use crate::observability::LogLevelHandle;
use crate::react::escalation;
use crate::react::prompt::{build_system_prompt, DEFAULT_PREAMBLE};
use crate::react::{assemble, extract_tool_calls, EventSink, NullSink, ReactEvent};
use crate::tools::{
    AutoDeny, ConfirmationPolicy, ConsoleConfirmation, Dispatcher, OperatorConsole, StdinConsole,
    ToolContext, ToolRegistry,
};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 任务终态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 模型给出了不含工具调用的回复
    Complete,
    /// 迭代预算耗尽（非交互模式，或续跑后再次耗尽）
    Exhausted,
    /// 模型调用或流式输出失败
    Failed,
    /// 预算耗尽后由操作员停止（含 Ctrl-C / 输入关闭）
    Stopped,
}

/// 调用方在任务开始时的覆盖项；None 表示沿用配置
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub max_iterations: Option<usize>,
    pub interactive: Option<bool>,
    pub safe_mode: Option<bool>,
}

/// 单个任务的可变状态，仅由当前活跃的引擎调用写入
#[derive(Debug)]
pub struct TaskSession {
    pub transcript: Transcript,
    /// 已完成的轮数（含续跑），只增不减
    pub iteration: usize,
    pub trace_id: String,
    pub max_iterations: usize,
    pub safe_mode: bool,
    pub interactive: bool,
}

/// 任务结果
#[derive(Debug)]
pub struct TaskOutcome {
    pub text: String,
    pub state: TaskState,
    pub iterations: usize,
    pub trace_id: String,
    pub transcript: Transcript,
}

/// 任务引擎：持有模型客户端、分发器与人机交互端
pub struct TaskEngine {
    client: RetryingLlmClient,
    dispatcher: Dispatcher,
    settings: AgentSettings,
    sink: Arc<dyn EventSink>,
    console: Arc<dyn OperatorConsole>,
    confirmation: Arc<dyn ConfirmationPolicy>,
    log_level: LogLevelHandle,
    system_prompt: String,
}

/// TaskEngine 构建器
pub struct TaskEngineBuilder {
    client: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    retry: RetryConfig,
    settings: AgentSettings,
    sink: Option<Arc<dyn EventSink>>,
    console: Option<Arc<dyn OperatorConsole>>,
    confirmation: Option<Arc<dyn ConfirmationPolicy>>,
    log_level: Option<LogLevelHandle>,
    preamble: Option<String>,
}

impl TaskEngineBuilder {
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 人工介入菜单与默认确认策略使用的终端
    pub fn console(mut self, console: Arc<dyn OperatorConsole>) -> Self {
        self.console = Some(console);
        self
    }

    /// 交互模式下破坏性操作的确认策略；未设置时通过 console 询问
    pub fn confirmation(mut self, policy: Arc<dyn ConfirmationPolicy>) -> Self {
        self.confirmation = Some(policy);
        self
    }

    pub fn log_level(mut self, handle: LogLevelHandle) -> Self {
        self.log_level = Some(handle);
        self
    }

    /// 替换内置行为准则；工具目录总会追加在其后
    pub fn system_prompt(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn build(self) -> TaskEngine {
        let system_prompt = build_system_prompt(
            self.preamble.as_deref().unwrap_or(DEFAULT_PREAMBLE),
            &self.registry,
        );
        let console: Arc<dyn OperatorConsole> =
            self.console.unwrap_or_else(|| Arc::new(StdinConsole));
        let confirmation = self
            .confirmation
            .unwrap_or_else(|| Arc::new(ConsoleConfirmation::new(console.clone())));

        TaskEngine {
            client: RetryingLlmClient::new(self.client, self.retry),
            dispatcher: Dispatcher::new(self.registry),
            settings: self.settings,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            console,
            confirmation,
            log_level: self.log_level.unwrap_or_default(),
            system_prompt,
        }
    }
}

/// 截断预览
fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

impl TaskEngine {
    pub fn builder(client: Arc<dyn LlmClient>, registry: ToolRegistry) -> TaskEngineBuilder {
        TaskEngineBuilder {
            client,
            registry,
            retry: RetryConfig::default(),
            settings: AgentSettings::default(),
            sink: None,
            console: None,
            confirmation: None,
            log_level: None,
            preamble: None,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub(crate) fn console(&self) -> &dyn OperatorConsole {
        self.console.as_ref()
    }

    pub(crate) fn log_level(&self) -> &LogLevelHandle {
        &self.log_level
    }

    /// 执行一个任务直到完成、失败、耗尽或被操作员停止；最终文本总是字符串
    pub async fn execute_task(&self, task: &str, options: TaskOptions) -> TaskOutcome {
        let trace_id = Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("task", trace_id = %trace_id);
        self.run_task(task, options, trace_id).instrument(span).await
    }

    async fn run_task(&self, task: &str, options: TaskOptions, trace_id: String) -> TaskOutcome {
        let mut session = TaskSession {
            transcript: Transcript::new(self.system_prompt.clone()),
            iteration: 0,
            max_iterations: options.max_iterations.unwrap_or(self.settings.max_iterations),
            safe_mode: options.safe_mode.unwrap_or(self.settings.safe_mode),
            interactive: options.interactive.unwrap_or(self.settings.interactive_mode),
            trace_id,
        };
        tracing::info!(
            trace_id = %session.trace_id,
            max_iterations = session.max_iterations,
            interactive = session.interactive,
            safe_mode = session.safe_mode,
            "Starting task execution. Task: '{}'",
            task
        );
        session.transcript.push_user(format!("Task: {}", task));

        // 非交互任务从不阻塞等待输入：安全模式下的破坏性操作直接拒绝
        let confirmation: Arc<dyn ConfirmationPolicy> = if session.interactive {
            self.confirmation.clone()
        } else {
            Arc::new(AutoDeny)
        };
        let ctx = ToolContext::new(session.safe_mode, Some(session.trace_id.clone()), confirmation);

        let budget = session.max_iterations;
        let (mut text, mut state) = self.run_rounds(&mut session, budget, false, &ctx).await;

        if state == TaskState::Exhausted && session.interactive {
            (text, state) = escalation::escalate(self, &mut session, text, &ctx).await;
        }

        tracing::info!(
            trace_id = %session.trace_id,
            state = ?state,
            iterations = session.iteration,
            "Task execution finished. Final response preview: {}",
            preview(&text, 100)
        );
        TaskOutcome {
            text,
            state,
            iterations: session.iteration,
            trace_id: session.trace_id,
            transcript: session.transcript,
        }
    }

    /// 在 budget 轮以内推进任务；continuation 为真时是人工续跑（本地计数，全局计数继续累加）
    pub(crate) async fn run_rounds(
        &self,
        session: &mut TaskSession,
        budget: usize,
        continuation: bool,
        ctx: &ToolContext,
    ) -> (String, TaskState) {
        let suffix = if continuation { " in continuation" } else { "" };
        let trace_id = session.trace_id.clone();
        let trace_id = trace_id.as_str();
        let start = session.iteration;
        let mut text = if continuation {
            "Continuation did not produce a new agent response.".to_string()
        } else {
            "Task execution did not produce a final agent response.".to_string()
        };

        if continuation {
            tracing::info!(trace_id, additional = budget, total = start, "Continuing task");
        }

        for local in 1..=budget {
            let global = start + local;
            if continuation {
                tracing::info!(
                    trace_id,
                    "Continuation Iteration {} (Local: {}/{})",
                    global,
                    local,
                    budget
                );
            } else {
                tracing::info!(trace_id, "Iteration {} / {}", global, budget);
            }
            self.sink.emit(ReactEvent::StepUpdate {
                global,
                local,
                budget,
                continuation,
            });
            self.sink.emit(ReactEvent::Thinking);

            let stream = match self.client.generate(session.transcript.turns(), trace_id).await {
                Ok(stream) => stream,
                Err(e) => {
                    let message = format!(
                        "Error during model generation{}: ({}) {}",
                        suffix,
                        e.kind(),
                        e
                    );
                    tracing::error!(trace_id, "Failed to generate content from model{}", suffix);
                    self.sink.emit(ReactEvent::Error {
                        text: message.clone(),
                    });
                    return (message, TaskState::Failed);
                }
            };

            let reply = match assemble(stream, self.sink.as_ref(), trace_id).await {
                Ok(reply) => reply,
                Err(failure) => {
                    let message = format!(
                        "Stream error during model generation{} ({}): {}",
                        suffix,
                        failure.source.kind(),
                        failure.source
                    );
                    self.sink.emit(ReactEvent::Error {
                        text: message.clone(),
                    });
                    return (message, TaskState::Failed);
                }
            };

            session.transcript.push_agent(reply.clone());
            let extraction = extract_tool_calls(&reply, trace_id);

            for request in &extraction.requests {
                let tool = request.display_name();
                self.sink.emit(ReactEvent::ToolCall {
                    tool: tool.clone(),
                    args: request.parameters.clone(),
                });
                let result = self.dispatcher.dispatch(request, ctx).await;
                if result.is_success() {
                    self.sink.emit(ReactEvent::Observation {
                        tool: tool.clone(),
                        preview: preview(&result.to_string(), OBSERVATION_PREVIEW_CHARS),
                    });
                } else {
                    self.sink.emit(ReactEvent::ToolFailure {
                        tool: tool.clone(),
                        reason: result.error().unwrap_or("unknown error").to_string(),
                    });
                }
                tracing::debug!(trace_id, tool = %tool, result = %result, "tool result");
                session.transcript.push_tool_result(tool, result);
            }

            session.iteration += 1;
            text = reply;

            if extraction.is_empty() {
                tracing::info!(trace_id, "No tool calls detected{}. Task may be complete.", suffix);
                return (text, TaskState::Complete);
            }
        }

        if continuation {
            tracing::info!(trace_id, "Continuation finished its {} iterations.", budget);
        } else {
            tracing::warn!(trace_id, "Reached maximum iterations ({}).", budget);
        }
        self.sink.emit(ReactEvent::Exhausted {
            iterations: session.iteration,
        });
        (text, TaskState::Exhausted)
    }
}
