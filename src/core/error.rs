//! 导师引擎错误类型
//!
//! 主回答路径的失败向上传播为单个用户可见错误；咨询/审计路径（反思、日志、持久化）
//! 的失败在发生处以 tracing::warn 吞掉，不经过这里。

use thiserror::Error;

/// 单轮处理中可能出现的错误（输入、索引、LLM、工具等）
#[derive(Error, Debug)]
pub enum TutorError {
    /// 输入为空或过短，直接拒绝且无副作用
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 检索类调用缺少 collection id
    #[error("Missing collection id")]
    MissingCollectionId,

    /// 既无持久化索引也无种子文档
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// LLM 调用失败：主回答路径致命，反思路径在调用处降级
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// 工具参数不符合声明 schema（循环内可恢复，作为 Observation 回喂）
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Cancelled")]
    Cancelled,
}
