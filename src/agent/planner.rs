//! Planner：能力调用解析与 LLM 规划
//!
//! 模型输出要么是纯文本（最终回答），要么是 {"tool": "...", "args": {...}} 形式的
//! 能力调用；parse_llm_output 从文本中提取 JSON 并解析。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::TutorError;
use crate::llm::{extract_json_block, LlmClient};
use crate::memory::Message;

/// 模型提出的能力调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Planner 输出
#[derive(Debug, Clone)]
pub enum PlannerOutput {
    /// 最终文本回答
    Response(String),
    /// 需要执行能力
    ToolCall(ToolCall),
}

/// 解析模型输出：无 JSON 块则为 Response；含 JSON 且 tool 非空则为 ToolCall
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, TutorError> {
    let trimmed = output.trim();
    let Some(json_str) = extract_json_block(trimmed) else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let parsed: ToolCall = serde_json::from_str(json_str)
        .map_err(|e| TutorError::JsonParse(format!("{}: {}", e, json_str)))?;

    if parsed.tool.is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// Planner：持有 LLM 与系统提示，拼 system + messages 后调用
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn plan(&self, messages: &[Message]) -> Result<String, TutorError> {
        let mut full_messages = vec![Message::system(self.system_prompt.clone())];
        full_messages.extend(messages.to_vec());
        self.llm
            .complete(&full_messages)
            .await
            .map_err(TutorError::Llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_response() {
        match parse_llm_output("The capital of France is Paris.").unwrap() {
            PlannerOutput::Response(r) => assert!(r.contains("Paris")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_parsed() {
        let out = r#"{"tool": "retrieve_context", "args": {"question": "q", "k": 3}}"#;
        match parse_llm_output(out).unwrap() {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "retrieve_context");
                assert_eq!(tc.args["k"], 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_fenced_tool_call_parsed() {
        let out = "Let me look that up.\n```json\n{\"tool\": \"lookup_memory\", \"args\": {\"query\": \"Kuvempu\"}}\n```";
        match parse_llm_output(out).unwrap() {
            PlannerOutput::ToolCall(tc) => assert_eq!(tc.tool, "lookup_memory"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_llm_output("{\"tool\": broken}").is_err());
    }

    #[test]
    fn test_empty_tool_field_is_response() {
        let out = r#"{"tool": "", "args": {}}"#;
        assert!(matches!(
            parse_llm_output(out).unwrap(),
            PlannerOutput::Response(_)
        ));
    }
}
