//! 记忆层：会话消息、长期记忆与召回过滤

pub mod conversation;
pub mod long_term;
pub mod recall;
pub mod session;

pub use conversation::{Message, Role};
pub use long_term::{LongTermMemory, MEMORY_COLLECTION};
pub use recall::{
    MemoryLookup, MemoryRecallFilter, RecallOutcome, NO_MEMORIES_SENTINEL, TOO_VAGUE_SENTINEL,
};
pub use session::SessionStore;
