//! 反思器：对一次回答做结构化自我评估
//!
//! 调用 LLM 的结构化输出接口，产出 score / critique / needsImprovement /
//! suggestions；任何解析失败都折叠为中性结果，绝不让反思失败中断主流程。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;
use crate::prompts::REFLECTION_PROMPT;

/// 解析失败时的中性 critique 文本
const NEUTRAL_CRITIQUE: &str = "Reflection parsing failed.";

/// 一次回答的自我评估结果
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Reflection {
    /// 回答质量评分，0.0–1.0
    pub score: f64,
    /// 简短评语
    pub critique: String,
    /// 是否建议重写
    #[serde(rename = "needsImprovement")]
    pub needs_improvement: bool,
    /// 重写时的具体建议
    #[serde(default)]
    pub suggestions: String,
}

impl Reflection {
    /// 中性结果：不触发重试，不污染评分统计
    pub fn neutral() -> Self {
        Self {
            score: 0.5,
            critique: NEUTRAL_CRITIQUE.to_string(),
            needs_improvement: false,
            suggestions: String::new(),
        }
    }

    fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        self
    }
}

/// 反思器：持有 LLM，评估失败时返回中性结果
pub struct Reflector {
    llm: Arc<dyn LlmClient>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 评估一次问答；LLM 失败或输出不合法时返回 neutral，不返回错误
    pub async fn reflect(&self, question: &str, answer: &str) -> Reflection {
        let prompt = format!(
            "{}\n\nSTUDENT QUESTION:\n{}\n\nAI ANSWER:\n{}",
            REFLECTION_PROMPT, question, answer
        );
        let schema = match serde_json::to_value(schemars::schema_for!(Reflection)) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "reflection schema serialization failed");
                return Reflection::neutral();
            }
        };

        match self.llm.complete_structured(&prompt, &schema).await {
            Ok(value) => match serde_json::from_value::<Reflection>(value) {
                Ok(r) => r.clamped(),
                Err(e) => {
                    tracing::warn!(error = %e, "reflection output did not match schema");
                    Reflection::neutral()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "reflection call failed");
                Reflection::neutral()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_valid_reflection_parsed() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"score": 0.9, "critique": "Clear and accurate.", "needsImprovement": false, "suggestions": ""}"#,
        ]));
        let reflector = Reflector::new(llm);
        let r = reflector.reflect("What is photosynthesis?", "Plants...").await;
        assert!((r.score - 0.9).abs() < 1e-9);
        assert!(!r.needs_improvement);
    }

    #[tokio::test]
    async fn test_score_is_clamped() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"score": 1.7, "critique": "ok", "needsImprovement": true, "suggestions": "shorten"}"#,
        ]));
        let reflector = Reflector::new(llm);
        let r = reflector.reflect("q", "a").await;
        assert!((r.score - 1.0).abs() < 1e-9);
        assert!(r.needs_improvement);
    }

    #[tokio::test]
    async fn test_malformed_output_is_neutral() {
        let llm = Arc::new(MockLlmClient::scripted(vec!["not json at all"]));
        let reflector = Reflector::new(llm);
        let r = reflector.reflect("q", "a").await;
        assert!((r.score - 0.5).abs() < 1e-9);
        assert!(!r.needs_improvement);
        assert_eq!(r.critique, "Reflection parsing failed.");
    }

    #[tokio::test]
    async fn test_missing_suggestions_defaults_empty() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"score": 0.4, "critique": "vague", "needsImprovement": true}"#,
        ]));
        let reflector = Reflector::new(llm);
        let r = reflector.reflect("q", "a").await;
        assert!(r.needs_improvement);
        assert!(r.suggestions.is_empty());
    }
}
