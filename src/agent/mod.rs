//! 能力编排模块：Planner、输出解析、编排主循环

pub mod loop_;
pub mod planner;

pub use loop_::{agent_loop, AgentOutcome, AgentSession};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
