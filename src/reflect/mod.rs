//! 反思模块：结构化自我评估与 JSONL 日志

pub mod log;
pub mod reflector;

pub use log::{ReflectionEntry, ReflectionLog};
pub use reflector::{Reflection, Reflector};
