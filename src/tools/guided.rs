//! guided_answer_from_context：导师式回答，先引导学生思考再给出答案

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::GUIDED_SYSTEM;
use crate::retrieval::sources_line;
use crate::tools::answer::citations_from_args;
use crate::tools::{clamp_chars, Tool};

pub struct GuidedAnswerTool {
    llm: Arc<dyn LlmClient>,
    max_context_chars: usize,
}

impl GuidedAnswerTool {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
        }
    }
}

#[async_trait]
impl Tool for GuidedAnswerTool {
    fn name(&self) -> &str {
        "guided_answer_from_context"
    }

    fn description(&self) -> &str {
        "Answer a QUESTION using CONTEXT in a mentoring style - ask the student to think first, then guide."
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
            Message::system(GUIDED_SYSTEM),
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
