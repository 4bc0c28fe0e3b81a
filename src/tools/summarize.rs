//! summarize_context：将上下文（如一章内容）摘要为学生易懂的版本

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::SUMMARIZE_SYSTEM;
use crate::tools::{clamp_chars, Tool};

pub struct SummarizeContextTool {
    llm: Arc<dyn LlmClient>,
    max_context_chars: usize,
}

impl SummarizeContextTool {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
        }
    }
}

#[async_trait]
impl Tool for SummarizeContextTool {
    fn name(&self) -> &str {
        "summarize_context"
    }

    fn description(&self) -> &str {
        "Summarize the CONTEXT (e.g., a chapter)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "context": { "type": "string", "minLength": 1 }
            },
            "required": ["context"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let context = args
            .get("context")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "context is required".to_string())?;

        let messages = vec![
            Message::system(SUMMARIZE_SYSTEM),
            Message::user(format!(
                "Summarize:\n{}",
                clamp_chars(context, self.max_context_chars)
            )),
        ];
        let text = self.llm.complete(&messages).await?;

        serde_json::to_string(&json!({ "text": text })).map_err(|e| e.to_string())
    }
}
