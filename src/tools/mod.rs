//! 暴露给模型的能力集合与执行设施

pub mod answer;
pub mod executor;
pub mod guided;
pub mod memory_lookup;
pub mod quiz;
pub mod registry;
pub mod retrieve;
pub mod summarize;

pub use answer::AnswerWithContextTool;
pub use executor::ToolExecutor;
pub use guided::GuidedAnswerTool;
pub use memory_lookup::LookupMemoryTool;
pub use quiz::QuizFromContextTool;
pub use registry::{validate_args, Tool, ToolRegistry};
pub use retrieve::RetrieveContextTool;
pub use summarize::SummarizeContextTool;

/// 按字符数截断（上下文注入 prompt 前统一收口）
pub(crate) fn clamp_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}
