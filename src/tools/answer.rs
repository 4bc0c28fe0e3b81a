//! answer_with_context：用检索到的上下文回答问题，带引用与 Sources 行

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::QA_SYSTEM;
use crate::retrieval::{sources_line, Citation};
use crate::tools::{clamp_chars, Tool};

pub struct AnswerWithContextTool {
    llm: Arc<dyn LlmClient>,
    max_context_chars: usize,
}

impl AnswerWithContextTool {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
        }
    }
}

/// 从 args.citations 还原引用列表；缺省或形状不符时为空
pub(crate) fn citations_from_args(args: &Value) -> Vec<Citation> {
    args.get("citations")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[async_trait]
impl Tool for AnswerWithContextTool {
    fn name(&self) -> &str {
        "answer_with_context"
    }

    fn description(&self) -> &str {
        "Answer a QUESTION using retrieved CONTEXT. Use citations like [p.X] and end with a Sources line."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "minLength": 1 },
                "context": { "type": "string", "minLength": 1 },
                "citations": { "type": "array" }
            },
            "required": ["question", "context"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let question = args
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "question is required".to_string())?;
        let context = args
            .get("context")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "context is required".to_string())?;
        let citations = citations_from_args(&args);

        let messages = vec![
            Message::system(QA_SYSTEM),
            Message::user(format!(
                "QUESTION: {}\n\nCONTEXT:\n{}",
                question,
                clamp_chars(context, self.max_context_chars)
            )),
        ];
        let text = self.llm.complete(&messages).await?;
        let sources = sources_line(&citations);

        let result = json!({
            "text": format!("{}\n\n{}", text, sources),
            "citations": citations,
        });
        serde_json::to_string(&result).map_err(|e| e.to_string())
    }
}
