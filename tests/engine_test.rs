//! TaskEngine 集成测试：脚本化模型端点 + 脚本化控制台 + 记录型工具

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use agentloop::config::AgentSettings;
use agentloop::llm::{LlmError, MockReply, RetryConfig, ScriptedLlmClient};
use agentloop::memory::Turn;
use agentloop::observability::LogLevelHandle;
use agentloop::react::ReactEvent;
use agentloop::tools::{
    builtin_registry, ScriptedConsole, Tool, ToolContext, ToolError, ToolRegistry, ToolResult,
    Workspace,
};
use agentloop::{TaskEngine, TaskOptions, TaskState};

/// 记录每次调用的 trace_id 与参数
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(Option<String>, Map<String, Value>)>>>,
}

impl Recorder {
    fn trace_ids(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Tool for Recorder {
    fn name(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Does nothing and reports its arguments."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "note": { "type": "string" } } })
    }

    async fn execute(
        &self,
        args: Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((ctx.trace_id.clone(), args.clone()));
        Ok(ToolResult::ok(json!({ "echo": args })))
    }
}

fn call(tool: &str, params: Value) -> String {
    format!(
        "<tool_call>\n{}\n</tool_call>",
        json!({ "tool": tool, "parameters": params })
    )
}

fn noop_reply(note: &str) -> MockReply {
    MockReply::text(format!("Working on it.\n{}", call("noop", json!({ "note": note }))))
}

struct Harness {
    engine: TaskEngine,
    client: Arc<ScriptedLlmClient>,
    recorder: Recorder,
    console: ScriptedConsole,
    log_level: LogLevelHandle,
}

fn harness(replies: Vec<MockReply>, inputs: Vec<&str>, settings: AgentSettings) -> Harness {
    let client = Arc::new(ScriptedLlmClient::new(replies));
    let recorder = Recorder::default();
    let mut registry = ToolRegistry::new();
    registry.register(recorder.clone());
    let console = ScriptedConsole::new(inputs);
    let log_level = LogLevelHandle::detached();

    let engine = TaskEngine::builder(client.clone(), registry)
        .retry(RetryConfig::new(1, Duration::ZERO))
        .settings(settings)
        .console(Arc::new(console.clone()))
        .log_level(log_level.clone())
        .build();

    Harness {
        engine,
        client,
        recorder,
        console,
        log_level,
    }
}

fn settings(max_iterations: usize, interactive: bool, additional: usize) -> AgentSettings {
    AgentSettings {
        max_iterations,
        interactive_mode: interactive,
        additional_iterations: additional,
        ..AgentSettings::default()
    }
}

fn tool_results_after_each_agent_turn(turns: &[Turn]) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    for turn in turns {
        match turn {
            Turn::Agent { .. } => groups.push(Vec::new()),
            Turn::ToolResult { tool, .. } => {
                if let Some(last) = groups.last_mut() {
                    last.push(tool.clone());
                }
            }
            _ => {}
        }
    }
    groups
}

#[tokio::test]
async fn test_tool_results_follow_agent_turn_in_extraction_order() {
    let first = format!(
        "Two steps.\n{}\n<tool_call>{{\"tool\": \"noop\", \"parameters\": {{\"note\": }}}}</tool_call>\n{}",
        call("noop", json!({ "note": "a" })),
        call("noop", json!({ "note": "b" }))
    );
    let h = harness(
        vec![MockReply::text(first), MockReply::text("Done: a then b.")],
        vec![],
        settings(5, false, 3),
    );

    let out = h.engine.execute_task("do two things", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(out.text, "Done: a then b.");
    assert_eq!(out.iterations, 2);
    assert_eq!(
        tool_results_after_each_agent_turn(out.transcript.turns()),
        vec![vec!["noop".to_string(), "noop".to_string()], vec![]]
    );
    let notes: Vec<Value> = h
        .recorder
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, args)| args["note"].clone())
        .collect();
    assert_eq!(notes, vec![json!("a"), json!("b")]);

    // 第二次模型调用看到：指令、任务、agent、两条工具结果
    let seen = h.client.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].len(), 2);
    assert_eq!(seen[1].len(), 5);
    assert!(matches!(seen[1][0], Turn::Instruction { .. }));
}

#[tokio::test]
async fn test_unknown_tool_is_reported_back_to_model() {
    let h = harness(
        vec![
            MockReply::text(call("does_not_exist", json!({}))),
            MockReply::text("That tool does not exist, stopping."),
        ],
        vec![],
        settings(5, false, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(h.recorder.count(), 0);
    let result = out
        .transcript
        .turns()
        .iter()
        .find_map(|t| match t {
            Turn::ToolResult { tool, result } if tool == "does_not_exist" => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        result.into_value(),
        json!({ "success": false, "error": "Unknown tool: does_not_exist" })
    );
}

#[tokio::test]
async fn test_wrongly_shaped_call_is_reported_back_to_model() {
    let h = harness(
        vec![
            MockReply::text(r#"<tool_call>{"tool": "noop", "parameters": ["a.txt"]}</tool_call>"#),
            MockReply::text(r#"<tool_call>{"parameters": {"note": "x"}}</tool_call>"#),
            MockReply::text("Giving up."),
        ],
        vec![],
        settings(5, false, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(out.iterations, 3);
    assert_eq!(h.recorder.count(), 0);
    let failures: Vec<(String, String)> = out
        .transcript
        .turns()
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult { tool, result } if !result.is_success() => {
                Some((tool.clone(), result.error().unwrap_or_default().to_string()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, "noop");
    assert!(failures[0]
        .1
        .starts_with("Tool execution error for 'noop': Invalid or missing parameters"));
    assert_eq!(failures[1], ("null".to_string(), "Unknown tool: null".to_string()));
    // 失败结果在下一轮交给模型
    assert_eq!(h.client.seen()[1].len(), 4);
}

#[tokio::test]
async fn test_non_interactive_exhaustion_returns_last_text() {
    let h = harness(
        vec![noop_reply("1"), noop_reply("2"), noop_reply("3")],
        vec![],
        settings(2, false, 3),
    );

    let out = h.engine.execute_task("loop forever", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Exhausted);
    assert_eq!(out.iterations, 2);
    assert_eq!(h.client.calls(), 2);
    assert!(out.text.contains("\"note\":\"2\""));
    assert!(h.console.output().is_empty());
}

#[tokio::test]
async fn test_caller_options_override_settings() {
    let h = harness(
        vec![noop_reply("1"), noop_reply("2"), noop_reply("3")],
        vec![],
        settings(10, true, 3),
    );
    let opts = TaskOptions {
        max_iterations: Some(1),
        interactive: Some(false),
        safe_mode: None,
    };

    let out = h.engine.execute_task("x", opts).await;

    assert_eq!(out.state, TaskState::Exhausted);
    assert_eq!(h.client.calls(), 1);
    assert!(h.console.output().is_empty());
}

#[tokio::test]
async fn test_interactive_stop_keeps_last_text() {
    let h = harness(
        vec![noop_reply("1"), noop_reply("2")],
        vec!["S"],
        settings(2, true, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Stopped);
    assert_eq!(out.iterations, 2);
    assert!(out.text.contains("\"note\":\"2\""));
    assert!(h.console.output().iter().any(|l| l == "Your choice: "));
}

#[tokio::test]
async fn test_continue_reuses_transcript_and_trace_id() {
    let h = harness(
        vec![noop_reply("before"), noop_reply("after"), MockReply::text("All finished.")],
        vec!["continue"],
        settings(1, true, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(out.text, "All finished.");
    assert_eq!(out.iterations, 3);
    let traces = h.recorder.trace_ids();
    assert_eq!(traces.len(), 2);
    assert!(traces.iter().all(|t| t.as_deref() == Some(out.trace_id.as_str())));
    // 续跑的第一次调用看到完整的历史
    assert_eq!(h.client.seen()[1].len(), 4);
}

/// 收集 fmt 层输出的 writer
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_every_log_record_carries_trace_id_across_continue() {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness(
        vec![noop_reply("before"), noop_reply("after"), MockReply::text("Done.")],
        vec!["c"],
        settings(1, true, 3),
    );
    let out = h.engine.execute_task("x", TaskOptions::default()).await;
    assert_eq!(out.state, TaskState::Complete);

    let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = logs.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(lines.iter().any(|l| l.contains("Continuation Iteration")));
    assert!(lines.iter().any(|l| l.contains("tool_audit")));
    let needle = format!("trace_id={}", out.trace_id);
    for line in &lines {
        assert!(line.contains(&needle), "log line without trace id: {}", line);
    }
}

#[tokio::test]
async fn test_continuation_exhaustion_does_not_reopen_menu() {
    let h = harness(
        vec![noop_reply("1"), noop_reply("2"), noop_reply("3"), noop_reply("4")],
        vec!["c", "s"],
        settings(1, true, 2),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Exhausted);
    assert_eq!(out.iterations, 3);
    assert_eq!(h.client.calls(), 3);
    assert_eq!(h.console.remaining(), 1);
    let menus = h.console.output().iter().filter(|l| *l == "Your choice: ").count();
    assert_eq!(menus, 1);
}

#[tokio::test]
async fn test_feedback_is_appended_as_user_turn() {
    let h = harness(
        vec![noop_reply("1"), MockReply::text("Used your hint.")],
        vec!["f", "   ", "F", "look in /tmp instead"],
        settings(1, true, 3),
    );

    let out = h.engine.execute_task("find it", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(out.text, "Used your hint.");
    assert!(h
        .console
        .output()
        .iter()
        .any(|l| l == "No feedback provided. Please choose an option."));
    let turns = out.transcript.turns();
    let n = turns.len();
    assert_eq!(
        turns[n - 2],
        Turn::User {
            text: "look in /tmp instead".into()
        }
    );
    assert!(matches!(turns[n - 1], Turn::Agent { .. }));
}

#[tokio::test]
async fn test_review_verbose_and_invalid_choices_stay_in_menu() {
    let h = harness(vec![noop_reply("1")], vec!["r", "v", "what", "stop"], settings(1, true, 3));

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Stopped);
    assert!(h.log_level.is_verbose());
    let output = h.console.output().join("\n");
    assert!(output.contains("--- Conversation History ---"));
    assert!(output.contains("[2] User: Task: x"));
    assert!(output.contains("Tool Result for 'noop'"));
    assert!(output.contains("--- End of History ---"));
    assert!(output.contains("Verbose logging ON. Log level set to DEBUG."));
    assert!(output.contains("Invalid choice: 'what'. Please select from the available options."));
    assert_eq!(h.client.calls(), 1);
}

#[tokio::test]
async fn test_closed_console_stops_task() {
    let h = harness(vec![noop_reply("1")], vec![], settings(1, true, 3));

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Stopped);
    assert!(h
        .console
        .output()
        .iter()
        .any(|l| l.contains("Stopping task due to user interruption.")));
}

#[tokio::test]
async fn test_stream_error_fails_without_agent_turn() {
    let h = harness(
        vec![MockReply::Broken(
            vec!["partial ".into()],
            LlmError::Server("connection reset".into()),
        )],
        vec![],
        settings(5, true, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Failed);
    assert!(out
        .text
        .starts_with("Stream error during model generation (ServerError):"));
    assert_eq!(out.transcript.len(), 2);
    assert!(h.console.output().is_empty());
}

#[tokio::test]
async fn test_error_in_continuation_is_labelled() {
    let h = harness(
        vec![
            noop_reply("1"),
            MockReply::Fail(LlmError::Api("model not found".into())),
        ],
        vec!["c"],
        settings(1, true, 3),
    );

    let out = h.engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Failed);
    assert_eq!(
        out.text,
        "Error during model generation in continuation: (ApiError) API error: model not found"
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_fault_is_retried_inside_a_round() {
    let client = Arc::new(ScriptedLlmClient::new(vec![
        MockReply::Fail(LlmError::RateLimited("429".into())),
        MockReply::Fail(LlmError::Server("503".into())),
        MockReply::text("Recovered."),
    ]));
    let engine = TaskEngine::builder(client.clone(), ToolRegistry::new())
        .retry(RetryConfig::new(3, Duration::from_secs(2)))
        .build();

    let start = tokio::time::Instant::now();
    let out = engine.execute_task("x", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert_eq!(out.text, "Recovered.");
    assert_eq!(out.iterations, 1);
    assert_eq!(client.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_events_are_streamed_to_sink() {
    let client = Arc::new(ScriptedLlmClient::new(vec![
        MockReply::Chunks(vec![
            "Check. ".into(),
            call("noop", json!({ "note": "x" })),
        ]),
        MockReply::Chunks(vec!["Fin".into(), "ished.".into()]),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register(Recorder::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = TaskEngine::builder(client, registry)
        .retry(RetryConfig::new(1, Duration::ZERO))
        .event_sink(Arc::new(tx))
        .build();

    let out = engine.execute_task("x", TaskOptions::default()).await;
    assert_eq!(out.text, "Finished.");

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    assert!(matches!(
        events[0],
        ReactEvent::StepUpdate {
            global: 1,
            local: 1,
            continuation: false,
            ..
        }
    ));
    assert!(events.contains(&ReactEvent::ToolCall {
        tool: "noop".into(),
        args: json!({ "note": "x" }),
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, ReactEvent::Observation { tool, .. } if tool == "noop")));
    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ReactEvent::MessageChunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.last(), Some(&"ished."));
}

#[tokio::test]
async fn test_safe_mode_refuses_deletion_without_operator() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("keep.txt");
    std::fs::write(&target, "data").unwrap();

    let client = Arc::new(ScriptedLlmClient::new(vec![
        MockReply::text(call("delete_file", json!({ "file_path": "keep.txt" }))),
        MockReply::text("Could not delete."),
    ]));
    let registry = builtin_registry(&Workspace::new(dir.path()), 30, 10);
    let engine = TaskEngine::builder(client, registry)
        .retry(RetryConfig::new(1, Duration::ZERO))
        .build();

    let out = engine.execute_task("delete keep.txt", TaskOptions::default()).await;

    assert_eq!(out.state, TaskState::Complete);
    assert!(target.exists());
    let refused = out.transcript.turns().iter().any(|t| match t {
        Turn::ToolResult { result, .. } => {
            result.error() == Some("Deletion not confirmed by user.")
        }
        _ => false,
    });
    assert!(refused);
}

#[tokio::test]
async fn test_interactive_operator_can_approve_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("gone.txt");
    std::fs::write(&target, "data").unwrap();

    let client = Arc::new(ScriptedLlmClient::new(vec![
        MockReply::text(call("delete_file", json!({ "file_path": "gone.txt" }))),
        MockReply::text("Deleted."),
    ]));
    let registry = builtin_registry(&Workspace::new(dir.path()), 30, 10);
    let console = ScriptedConsole::new(["yes"]);
    let engine = TaskEngine::builder(client, registry)
        .retry(RetryConfig::new(1, Duration::ZERO))
        .console(Arc::new(console.clone()))
        .build();
    let opts = TaskOptions {
        interactive: Some(true),
        safe_mode: Some(true),
        ..TaskOptions::default()
    };

    let out = engine.execute_task("delete gone.txt", opts).await;

    assert_eq!(out.state, TaskState::Complete);
    assert!(!target.exists());
    assert!(console
        .output()
        .iter()
        .any(|l| l.starts_with("SAFE MODE: Confirm deletion of")));
}
