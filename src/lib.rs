//! Sage - 文档驱动的反思型辅导引擎
//!
//! 模块划分：
//! - **agent**: 能力编排（Planner、输出解析、编排主循环）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **index**: 按集合管理的向量索引（单飞加载、原子持久化）
//! - **llm**: LLM 与嵌入客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话历史、长期记忆与召回过滤
//! - **pipeline**: 单轮对话状态机（记忆命中 / 编排 / 降级检索 / 反思重写）
//! - **reflect**: 结构化自我评估与 JSONL 日志
//! - **retrieval**: 材料检索、引用与 Sources 脚注
//! - **tools**: 暴露给模型的能力集合与执行设施

pub mod agent;
pub mod config;
pub mod core;
pub mod index;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod reflect;
pub mod retrieval;
pub mod tools;

pub use pipeline::{ChatMode, ChatOutcome, ChatPipeline, ChatRequest};
