//! 长期记忆：过往回答的向量化存储，跨会话检索
//!
//! 固定使用保留集合 "long_term_memory"。集合首次创建时插入一条种子占位文档
//! （seed 标记），召回过滤会始终排除它。

use std::sync::Arc;

use crate::core::TutorError;
use crate::index::{meta, Document, VectorIndexManager};

/// 保留的长期记忆集合 id
pub const MEMORY_COLLECTION: &str = "long_term_memory";

/// 种子占位文档内容
const SEED_CONTENT: &str = "Welcome to the long-term memory vector store.";

/// 长期记忆存取：对索引管理器上保留集合的一层薄封装
pub struct LongTermMemory {
    manager: Arc<VectorIndexManager>,
}

impl LongTermMemory {
    pub fn new(manager: Arc<VectorIndexManager>) -> Self {
        Self { manager }
    }

    fn seed_doc() -> Document {
        Document::new(SEED_CONTENT).with_meta(meta::SEED, true)
    }

    /// 保证记忆集合存在（不存在时用种子文档创建）
    pub async fn ensure(&self) -> Result<(), TutorError> {
        self.manager
            .get_or_create(MEMORY_COLLECTION, Some(&[Self::seed_doc()]))
            .await?;
        Ok(())
    }

    /// 存入一段文本；空白文本直接忽略
    pub async fn store(&self, text: &str, user_id: &str) -> Result<(), TutorError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.ensure().await?;
        let preview: String = text.chars().take(100).collect();
        tracing::debug!(preview = %preview, "storing to long-term memory");
        let doc = Document::new(text)
            .with_meta(meta::ID, uuid::Uuid::new_v4().to_string())
            .with_meta(meta::TYPE, "memory")
            .with_meta(meta::USER_ID, user_id)
            .with_meta(meta::TIMESTAMP, chrono::Utc::now().timestamp_millis());
        self.manager
            .append_documents(MEMORY_COLLECTION, vec![doc])
            .await
    }

    /// 按查询向量检索 k 条（含种子，由召回过滤负责剔除）
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, TutorError> {
        self.ensure().await?;
        self.manager.search(MEMORY_COLLECTION, query, k, None).await
    }
}
