//! 按集合管理的向量索引：条目存储与并发安全的生命周期

pub mod manager;
pub mod store;

pub use manager::{IndexHandle, VectorIndexManager};
pub use store::{clamp_k, meta, Document, VectorIndex};
