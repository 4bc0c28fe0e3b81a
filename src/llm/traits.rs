//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（自由文本）、
//! complete_structured（带 JSON Schema 的结构化输出）。错误统一为字符串，
//! 由调用方映射为 TutorError 或就地降级。

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::Message;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 结构化完成：要求模型仅输出符合 schema 的 JSON，解析失败返回 Err
    ///
    /// 默认实现把 schema 拼入指令并从回复中提取 JSON 块；后端可覆盖为
    /// 原生的 response_format 支持。
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<Value, String> {
        let instruction = format!(
            "{}\n\nRespond ONLY with a single JSON object matching this JSON Schema:\n{}",
            prompt,
            serde_json::to_string_pretty(schema).map_err(|e| e.to_string())?
        );
        let output = self.complete(&[Message::user(instruction)]).await?;
        let block = extract_json_block(&output).ok_or_else(|| "no JSON object in output".to_string())?;
        serde_json::from_str(block).map_err(|e| e.to_string())
    }
}

/// 从模型输出中提取 JSON 块：优先 ```json 围栏，其次首个 { 到末个 } 的跨度
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
        return Some(inner);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}
