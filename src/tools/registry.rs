//! 能力注册表
//!
//! 所有能力实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；validate_args 在执行前按声明 schema 校验参数，
//! 失败作为可恢复的 Observation 回喂模型而非终止本轮。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 能力 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 能力名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 能力描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式，同时用于执行前校验）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 是否为检索类能力：编排器会把当前集合 id 注入 args.material_id
    fn requires_material_id(&self) -> bool {
        false
    }

    /// 执行能力
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 按声明 schema 校验参数：required 键、类型、整数区间与字符串最小长度
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = args
        .as_object()
        .ok_or_else(|| "args must be a JSON object".to_string())?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    let props = match schema.get("properties").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => return Ok(()),
    };
    for (key, spec) in props {
        let Some(value) = obj.get(key) else { continue };
        match spec.get("type").and_then(|t| t.as_str()) {
            Some("string") => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("'{}' must be a string", key))?;
                if let Some(min) = spec.get("minLength").and_then(|m| m.as_u64()) {
                    if (s.chars().count() as u64) < min {
                        return Err(format!("'{}' must be at least {} characters", key, min));
                    }
                }
            }
            Some("integer") => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| format!("'{}' must be an integer", key))?;
                if let Some(min) = spec.get("minimum").and_then(|m| m.as_i64()) {
                    if n < min {
                        return Err(format!("'{}' must be >= {}", key, min));
                    }
                }
                if let Some(max) = spec.get("maximum").and_then(|m| m.as_i64()) {
                    if n > max {
                        return Err(format!("'{}' must be <= {}", key, max));
                    }
                }
            }
            Some("number") => {
                if !value.is_number() {
                    return Err(format!("'{}' must be a number", key));
                }
            }
            Some("boolean") => {
                if !value.is_boolean() {
                    return Err(format!("'{}' must be a boolean", key));
                }
            }
            Some("array") => {
                if !value.is_array() {
                    return Err(format!("'{}' must be an array", key));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// 能力注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 动态生成能力 schema JSON，拼入 agent 系统提示
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<serde_json::Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "minLength": 1 },
                "k": { "type": "integer", "minimum": 1, "maximum": 20 }
            },
            "required": ["question"]
        })
    }

    #[test]
    fn test_missing_required() {
        let err = validate_args(&schema(), &json!({ "k": 5 })).unwrap_err();
        assert!(err.contains("question"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate_args(&schema(), &json!({ "question": 7 })).unwrap_err();
        assert!(err.contains("string"));
    }

    #[test]
    fn test_integer_bounds() {
        let err = validate_args(&schema(), &json!({ "question": "q", "k": 21 })).unwrap_err();
        assert!(err.contains("<= 20"));
        let err = validate_args(&schema(), &json!({ "question": "q", "k": 0 })).unwrap_err();
        assert!(err.contains(">= 1"));
    }

    #[test]
    fn test_valid_args_pass() {
        validate_args(&schema(), &json!({ "question": "q", "k": 8 })).unwrap();
        // 可选参数缺省也合法
        validate_args(&schema(), &json!({ "question": "q" })).unwrap();
    }

    #[test]
    fn test_args_must_be_object() {
        assert!(validate_args(&schema(), &json!("not an object")).is_err());
    }
}
