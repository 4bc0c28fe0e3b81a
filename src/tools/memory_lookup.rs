//! lookup_memory：检索长期记忆中已存储的事实或过往回答

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memory::MemoryRecallFilter;
use crate::tools::Tool;

pub struct LookupMemoryTool {
    filter: Arc<MemoryRecallFilter>,
}

impl LookupMemoryTool {
    pub fn new(filter: Arc<MemoryRecallFilter>) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl Tool for LookupMemoryTool {
    fn name(&self) -> &str {
        "lookup_memory"
    }

    fn description(&self) -> &str {
        "Search long-term memory for previously stored facts or answers. Use this when the answer might already be known or was seen earlier."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "query is required".to_string())?;

        let lookup = self.filter.lookup(query).await.map_err(|e| e.to_string())?;
        let result = json!({
            "text": lookup.text,
            "best_match_score": lookup.best_match_confidence,
        });
        serde_json::to_string(&result).map_err(|e| e.to_string())
    }
}
