//! 向量索引条目与线性检索
//!
//! Document 为不可变的内容 + 元数据映射；VectorIndex 持有 (向量, Document) 对，
//! 按 L2 距离升序返回最近邻，支持可选元数据谓词过滤。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 常用元数据键
pub mod meta {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const TENANT_ID: &str = "tenant_id";
    pub const CLASS_ID: &str = "class_id";
    pub const SUBJECT_ID: &str = "subject_id";
    pub const MATERIAL_ID: &str = "material_id";
    pub const PAGE: &str = "page";
    pub const SOURCE_PATH: &str = "source_path";
    pub const USER_ID: &str = "user_id";
    pub const TIMESTAMP: &str = "timestamp";
    /// 集合创建时插入的占位文档标记，召回时始终排除
    pub const SEED: &str = "seed";
}

/// 已嵌入集合中的一条文档：创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    content: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// 页码：非数字值视为缺失
    pub fn page(&self) -> Option<i64> {
        self.metadata.get(meta::PAGE).and_then(|v| v.as_i64())
    }

    pub fn is_seed(&self) -> bool {
        self.metadata
            .get(meta::SEED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// 检索 k 的硬边界
pub const MIN_K: usize = 1;
pub const MAX_K: usize = 50;

/// 将 k 收拢到 [MIN_K, MAX_K]
pub fn clamp_k(k: usize) -> usize {
    k.clamp(MIN_K, MAX_K)
}

/// 内存向量索引：线性扫描 + L2 距离
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    entries: Vec<(Vec<f32>, Document)>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vector: Vec<f32>, doc: Document) {
        self.entries.push((vector, doc));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 最近邻检索：按 L2 距离升序返回至多 clamp_k(k) 条；谓词为 None 时不过滤
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        predicate: Option<&(dyn Fn(&Document) -> bool + Sync)>,
    ) -> Vec<(Document, f32)> {
        let k = clamp_k(k);
        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .filter(|(_, doc)| predicate.map(|p| p(doc)).unwrap_or(true))
            .map(|(vec, doc)| (l2_distance(query, vec), doc))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(dist, doc)| (doc.clone(), dist))
            .collect()
    }
}

/// L2 距离；维度不一致时返回 f32::MAX，使该条目排到末尾
fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
