//! retrieve_context：从当前材料集合检索相关段落

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::index::VectorIndexManager;
use crate::llm::EmbeddingProvider;
use crate::retrieval::{build_context, docs_to_citations, retrieve};
use crate::tools::Tool;

/// 检索默认 k
const DEFAULT_K: usize = 8;

/// 检索能力：embed 问题 -> 按材料谓词搜索 -> 拼上下文与引用
pub struct RetrieveContextTool {
    manager: Arc<VectorIndexManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_context_chars: usize,
}

impl RetrieveContextTool {
    pub fn new(
        manager: Arc<VectorIndexManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            manager,
            embedder,
            max_context_chars,
        }
    }
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        "retrieve_context"
    }

    fn description(&self) -> &str {
        "Retrieve relevant passages for the student's question from the active material (requires material_id)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "material_id": { "type": "string", "minLength": 1 },
                "question": { "type": "string", "minLength": 1 },
                "k": { "type": "integer", "minimum": 1, "maximum": 20 }
            },
            "required": ["material_id", "question"]
        })
    }

    fn requires_material_id(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let material_id = args
            .get("material_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "material_id is required".to_string())?;
        let question = args
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "question is required".to_string())?;
        let k = args
            .get("k")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_K);

        let docs = retrieve(&self.manager, self.embedder.as_ref(), material_id, question, k)
            .await
            .map_err(|e| e.to_string())?;

        let result = json!({
            "context": build_context(&docs, self.max_context_chars),
            "citations": docs_to_citations(&docs),
        });
        serde_json::to_string(&result).map_err(|e| e.to_string())
    }
}
