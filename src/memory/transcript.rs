//! 任务对话记录（Transcript）
//!
//! 只追加、不修改的回合序列：第 0 条固定为 system 指令，其后是 user / agent / tool-result 回合。
//! 单个任务（含人工续跑）期间由 Task Engine 独占写入。

use std::fmt;

use serde::Serialize;

use crate::tools::ToolResult;

/// 单个回合
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// system 指令，始终是第 0 条
    Instruction { text: String },
    /// 人类输入（任务描述或人工反馈）
    User { text: String },
    /// 模型输出，可能内嵌 tool_call 块
    Agent { text: String },
    /// 工具执行结果，紧随请求它的 agent 回合
    ToolResult { tool: String, result: ToolResult },
}

impl Turn {
    /// 发给模型时使用的文本内容
    pub fn content(&self) -> String {
        match self {
            Turn::Instruction { text } | Turn::User { text } | Turn::Agent { text } => {
                text.clone()
            }
            Turn::ToolResult { tool, result } => format!(
                "Tool result for '{}': {}",
                tool,
                serde_json::json!({ "content": result })
            ),
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::Instruction { text } => write!(f, "Text: {}", text),
            Turn::User { text } => write!(f, "User: {}", text),
            Turn::Agent { text } => write!(f, "Agent: {}", text),
            Turn::ToolResult { tool, result } => {
                write!(f, "Tool Result for '{}': {}", tool, result)
            }
        }
    }
}

/// 只追加的回合序列
#[derive(Clone, Debug, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// 以 system 指令开头创建
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::Instruction {
                text: instruction.into(),
            }],
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    pub fn push_agent(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Agent { text: text.into() });
    }

    pub fn push_tool_result(&mut self, tool: impl Into<String>, result: ToolResult) {
        self.turns.push(Turn::ToolResult {
            tool: tool.into(),
            result,
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// 人工审阅用的完整文本（带 1 起始序号）
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, turn) in self.turns.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", i + 1, turn));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_is_first_turn() {
        let mut t = Transcript::new("system");
        t.push_user("Task: list files");
        t.push_agent("ok");
        assert_eq!(t.len(), 3);
        assert!(matches!(&t.turns()[0], Turn::Instruction { text } if text == "system"));
        assert!(matches!(t.last(), Some(Turn::Agent { .. })));
    }

    #[test]
    fn test_render_numbers_turns() {
        let mut t = Transcript::new("sys");
        t.push_user("hello");
        t.push_tool_result("echo", ToolResult::failure("boom"));
        let rendered = t.render();
        assert!(rendered.contains("[1] Text: sys"));
        assert!(rendered.contains("[2] User: hello"));
        assert!(rendered.contains("[3] Tool Result for 'echo'"));
        assert!(rendered.contains("boom"));
    }

    #[test]
    fn test_tool_result_content_wraps_payload() {
        let turn = Turn::ToolResult {
            tool: "read_file".into(),
            result: ToolResult::failure("File not found: x"),
        };
        let content = turn.content();
        assert!(content.starts_with("Tool result for 'read_file': "));
        assert!(content.contains(r#""content":{"#));
        assert!(content.contains(r#""success":false"#));
    }
}
