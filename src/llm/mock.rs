//! Mock LLM 与嵌入（用于测试，无需 API）
//!
//! MockLlmClient 按预置脚本依次出队回复，脚本耗尽后回显最后一条 User 消息；
//! MockEmbedder 把文本哈希为确定性向量并统计调用次数，便于验证 single-flight。

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{EmbeddingProvider, LlmClient};
use crate::memory::{Message, Role};

/// Mock 客户端：依次返回脚本中的回复，耗尽后回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一串回复，complete 每次出队一条
    pub fn scripted(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            return Ok(next);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 嵌入向量维度（测试用，足够让不同主题的文本分开）
const MOCK_EMBED_DIM: usize = 16;

/// 确定性嵌入：token 哈希到固定维度并归一化；embed_calls 记录调用次数
#[derive(Debug, Default)]
pub struct MockEmbedder {
    pub embed_calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; MOCK_EMBED_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % MOCK_EMBED_DIM;
            v[idx] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let llm = MockLlmClient::scripted(["first", "second"]);
        let msgs = vec![Message::user("hello")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "first");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "second");
        assert!(llm.complete(&msgs).await.unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_embed_deterministic() {
        let e = MockEmbedder::new();
        let a = e.embed("Padma Shri award").await.unwrap();
        let b = e.embed("Padma Shri award").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(e.calls(), 2);
    }
}
