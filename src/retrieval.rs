//! 材料检索与引用
//!
//! Citation 是查询时从 Document 派生的 (page, snippet) 对，不持久化；
//! sources_line 按检索顺序对唯一页码生成确定性的 "Sources:" 行。

use crate::core::TutorError;
use crate::index::{meta, Document, VectorIndexManager};
use crate::llm::EmbeddingProvider;

/// 引用片段截断长度
const SNIPPET_CHARS: usize = 140;

/// 查询时派生的引用
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub snippet: String,
}

/// 从检索结果派生引用（保持检索顺序；非数字页码归一为 None）
pub fn docs_to_citations(docs: &[(Document, f32)]) -> Vec<Citation> {
    docs.iter()
        .map(|(doc, _)| Citation {
            page: doc.page(),
            snippet: doc.content().chars().take(SNIPPET_CHARS).collect(),
        })
        .collect()
}

/// "Sources: p.3; p.7" —— 唯一页码，按检索顺序；缺页码记 "p.?"
pub fn sources_line(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return "Sources: none".to_string();
    }
    let mut seen = Vec::new();
    for c in citations {
        let label = match c.page {
            Some(p) => format!("p.{}", p),
            None => "p.?".to_string(),
        };
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    format!("Sources: {}", seen.join("; "))
}

/// 拼接上下文并截断到 max_chars
pub fn build_context(docs: &[(Document, f32)], max_chars: usize) -> String {
    let joined = docs
        .iter()
        .map(|(d, _)| d.content())
        .collect::<Vec<_>>()
        .join("\n---\n");
    if joined.chars().count() > max_chars {
        joined.chars().take(max_chars).collect()
    } else {
        joined
    }
}

/// 从指定材料集合检索：嵌入问题后按 material_id 谓词搜索
pub async fn retrieve(
    manager: &VectorIndexManager,
    embedder: &dyn EmbeddingProvider,
    material_id: &str,
    question: &str,
    k: usize,
) -> Result<Vec<(Document, f32)>, TutorError> {
    let query = embedder
        .embed(question)
        .await
        .map_err(TutorError::Embedding)?;
    let predicate = move |doc: &Document| doc.meta_str(meta::MATERIAL_ID) == Some(material_id);
    manager.search(material_id, &query, k, Some(&predicate)).await
}
