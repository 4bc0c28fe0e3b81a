//! quiz_from_context：从上下文生成 MCQ 练习题

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::QUIZ_SYSTEM;
use crate::tools::{clamp_chars, Tool};

/// 默认题目数量
const DEFAULT_N: u64 = 5;

pub struct QuizFromContextTool {
    llm: Arc<dyn LlmClient>,
    max_context_chars: usize,
}

impl QuizFromContextTool {
    pub fn new(llm: Arc<dyn LlmClient>, max_context_chars: usize) -> Self {
        Self {
            llm,
            max_context_chars,
        }
    }
}

#[async_trait]
impl Tool for QuizFromContextTool {
    fn name(&self) -> &str {
        "quiz_from_context"
    }

    fn description(&self) -> &str {
        "Generate MCQ quiz items from CONTEXT for practice."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "context": { "type": "string", "minLength": 1 },
                "n": { "type": "integer", "minimum": 3, "maximum": 20 }
            },
            "required": ["context"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let context = args
            .get("context")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "context is required".to_string())?;
        let n = args.get("n").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_N);

        let messages = vec![
            Message::system(QUIZ_SYSTEM.replace("{n}", &n.to_string())),
            Message::user(format!(
                "Create {} MCQs from:\n{}",
                n,
                clamp_chars(context, self.max_context_chars)
            )),
        ];
        let text = self.llm.complete(&messages).await?;

        serde_json::to_string(&json!({ "text": text })).map_err(|e| e.to_string())
    }
}
