//! System prompt 构建：行为准则 + tool_call 格式 + 工具目录
//!
//! 目录按注册顺序编号，每条带参数 schema 与可选的工具注意事项；末尾附 tool_call 载荷的 JSON Schema。

use std::fmt::Write;

use crate::tools::{tool_call_schema_json, ToolRegistry};

/// 默认行为准则（可被配置中的 system_prompt_path 覆盖）
pub const DEFAULT_PREAMBLE: &str = r#"You are a highly capable AI agent that accomplishes tasks by executing tools. Your primary directive is to base your actions and conclusions *exclusively* on the real-world feedback you receive from these tools. The tool's output is the absolute ground truth.

Your internal knowledge is only for creating hypotheses and plans. The tool results are for testing and confirming those plans. If a tool's output contradicts your belief, your belief is wrong.

**Workflow:**
1.  **Analyze the task:** Break down the request into a sequence of verifiable steps.
2.  **Formulate a step and call a tool:** Announce what you are about to do and why, then call the appropriate tool.
3.  **Analyze the result:** Treat the tool's JSON output as the absolute truth.
4.  **Report and revise:** Explain the outcome based on the tool's result. If the step failed, explain the error using the tool's feedback and formulate a new plan. Do not proceed with a broken plan.
5.  **Finish:** When the task is done, answer in plain text without any tool call.

**Tool Calling Format:**
When you need to use a tool, format your call as follows:
<tool_call>
{
    "tool": "tool_name",
    "parameters": {
        "param1": "value1",
        "param2": "value2"
    }
}
</tool_call>

You may emit several tool_call blocks in one reply; they run in order.

---

**Analyzing tool results:**
-   Every result carries a `"success"` field. When it is `false`, read the `"error"` field and address it before moving on.
-   For `execute_command`, a non-zero `"return_code"` means the command failed; `"stderr"` explains why."#;

const BEST_PRACTICE: &str = "**Best Practice:** Before performing system-altering operations like installing software, first identify the operating system (e.g., by reading `/etc/os-release` or running `uname -a`) to ensure you use the correct commands.";

/// 拼出完整 system prompt
pub fn build_system_prompt(preamble: &str, registry: &ToolRegistry) -> String {
    let mut prompt = String::with_capacity(preamble.len() + 4096);
    prompt.push_str(preamble.trim_end());
    prompt.push_str("\n\n---\n\n**Available Tools:**\n\n");

    for (i, tool) in registry.iter().enumerate() {
        let _ = writeln!(prompt, "{}. **{}**: {}", i + 1, tool.name(), tool.description());
        let _ = writeln!(prompt, "    * **Parameters**: `{}`", tool.parameters_schema());
        if let Some(note) = tool.prompt_note() {
            let _ = writeln!(prompt, "    * **Crucial Note**: {}", note);
        }
        prompt.push('\n');
    }

    prompt.push_str(BEST_PRACTICE);
    let _ = write!(
        prompt,
        "\n\n## Tool call JSON Schema (the payload inside <tool_call> must match this)\n```json\n{}\n```\n",
        tool_call_schema_json()
    );
    prompt
}
