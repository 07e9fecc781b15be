//! 从模型文本中提取 `<tool_call>{...}</tool_call>` 块
//!
//! 每个块独立解析；payload 不是 JSON 对象时记录告警并跳过，不影响其余块。
//! 对象内字段的形状（`tool` 缺失、`parameters` 不是对象等）留给分发器处理。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::tools::ToolCallRequest;

static TOOL_CALL_RE: OnceLock<Regex> = OnceLock::new();

/// 一次提取的结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extraction {
    /// 按出现顺序排列的合法调用
    pub requests: Vec<ToolCallRequest>,
    /// 被丢弃的 payload 原文
    pub malformed: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// 扫描全部非重叠的 tool_call 块（跨行匹配）
pub fn extract_tool_calls(text: &str, trace_id: &str) -> Extraction {
    let re = TOOL_CALL_RE
        .get_or_init(|| Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").unwrap());

    let mut out = Extraction::default();
    for caps in re.captures_iter(text) {
        let Some(payload) = caps.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        match serde_json::from_str::<Map<String, Value>>(payload) {
            Ok(object) => out.requests.push(ToolCallRequest::from_object(object)),
            Err(e) => {
                tracing::warn!(trace_id, error = %e, payload, "Failed to parse tool call JSON");
                out.malformed.push(payload.to_string());
            }
        }
    }

    if !out.requests.is_empty() {
        tracing::info!(
            trace_id,
            count = out.requests.len(),
            "Detected {} tool_call(s).",
            out.requests.len()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_multiple_blocks_in_order() {
        let text = r#"First I list.
<tool_call>
{"tool": "list_directory", "parameters": {"directory_path": "."}}
</tool_call>
then read
<tool_call>{"tool":"read_file","parameters":{"file_path":"a.txt"}}</tool_call>"#;
        let ex = extract_tool_calls(text, "t");
        let names: Vec<Option<&str>> = ex.requests.iter().map(|r| r.tool_name()).collect();
        assert_eq!(names, vec![Some("list_directory"), Some("read_file")]);
        assert_eq!(ex.requests[1].parameters, json!({ "file_path": "a.txt" }));
        assert!(ex.malformed.is_empty());
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let text = r#"<tool_call>{"tool": "read_file", "parameters": {"file_path": "x"}}</tool_call>
<tool_call>{"tool": "broken", "parameters": {"a": }}</tool_call>"#;
        let ex = extract_tool_calls(text, "t");
        assert_eq!(ex.requests.len(), 1);
        assert_eq!(ex.requests[0].tool_name(), Some("read_file"));
        assert_eq!(ex.malformed.len(), 1);
    }

    #[test]
    fn test_wrongly_shaped_object_is_kept_for_dispatch() {
        let text = r#"<tool_call>{"parameters": {}}</tool_call>
<tool_call>{"tool": "read_file", "parameters": ["a.txt"]}</tool_call>"#;
        let ex = extract_tool_calls(text, "t");
        assert_eq!(ex.requests.len(), 2);
        assert_eq!(ex.requests[0].tool, Value::Null);
        assert_eq!(ex.requests[1].parameters, json!(["a.txt"]));
        assert!(ex.malformed.is_empty());
    }

    #[test]
    fn test_trailing_text_after_object_is_malformed() {
        let ex = extract_tool_calls(
            r#"<tool_call>{"tool": "x"}, {"tool": "y"}</tool_call>"#,
            "t",
        );
        assert!(ex.is_empty());
        assert_eq!(ex.malformed.len(), 1);
    }

    #[test]
    fn test_parameters_default_to_empty() {
        let ex = extract_tool_calls(
            r#"<tool_call> {"tool": "get_current_directory"} </tool_call>"#,
            "t",
        );
        assert_eq!(ex.requests.len(), 1);
        assert_eq!(ex.requests[0].parameters, json!({}));
    }

    #[test]
    fn test_plain_answer_has_no_calls() {
        let ex = extract_tool_calls("The answer is 42. No tools needed.", "t");
        assert_eq!(ex, Extraction::default());
    }
}
