//! 能力编排主循环
//!
//! Plan -> 解析 -> 执行能力 -> Observation 写回 -> 下一轮 Plan；
//! 支持取消令牌与最大步数限制。未知能力与执行失败作为 Observation
//! 写回对话，由模型自行纠正，不中断循环。

use tokio_util::sync::CancellationToken;

use crate::agent::planner::{parse_llm_output, Planner, PlannerOutput};
use crate::agent::ToolCall;
use crate::core::TutorError;
use crate::memory::Message;
use crate::retrieval::Citation;
use crate::tools::{validate_args, ToolExecutor};

/// Observation 日志预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 编排循环执行结果：最终回答与最后一次携带引用的能力调用产出的引用
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// 编排会话配置
pub struct AgentSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub cancel_token: CancellationToken,
    /// 当前对话绑定的教材；需要教材的能力自动注入该 id
    pub material_id: Option<&'a str>,
    /// 单次对话内最大步数，防止死循环
    pub max_steps: usize,
}

/// 从能力结果 JSON 中提取引用列表；结果不含 citations 字段时返回 None，
/// 以便调用方区分"未携带引用"与"携带了空引用"
fn citations_from_observation(observation: &str) -> Option<Vec<Citation>> {
    let value: serde_json::Value = serde_json::from_str(observation).ok()?;
    let raw = value.get("citations")?.clone();
    serde_json::from_value(raw).ok()
}

/// 写回对话前对 Observation 做日志预览
fn log_observation(tool: &str, observation: &str) {
    let preview: String = observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if observation.chars().count() > OBSERVATION_PREVIEW_CHARS {
        tracing::debug!(tool, preview = %format!("{}...", preview), "observation");
    } else {
        tracing::debug!(tool, preview = %preview, "observation");
    }
}

/// 执行一次能力调用，所有失败路径统一折叠为 Observation 字符串
async fn execute_call(
    session: &AgentSession<'_>,
    tc: &ToolCall,
) -> (String, Option<Vec<Citation>>) {
    let Some(tool) = session.executor.get_tool(&tc.tool) else {
        let names = session.executor.tool_names().join(", ");
        return (
            format!("Unknown tool '{}'. Available tools: {}", tc.tool, names),
            None,
        );
    };

    let mut args = if tc.args.is_object() {
        tc.args.clone()
    } else {
        serde_json::json!({})
    };

    // 教材上下文注入：模型不必自行携带 material_id
    if tool.requires_material_id() && args.get("material_id").is_none() {
        match session.material_id {
            Some(id) => {
                args["material_id"] = serde_json::Value::String(id.to_string());
            }
            None => {
                return (
                    format!(
                        "Error: tool '{}' requires a material but no material is bound to this conversation.",
                        tc.tool
                    ),
                    None,
                );
            }
        }
    }

    if let Err(reason) = validate_args(&tool.parameters_schema(), &args) {
        let err = TutorError::InvalidArguments {
            tool: tc.tool.clone(),
            reason,
        };
        return (format!("Error: {}", err), None);
    }

    match session.executor.execute(&tc.tool, args).await {
        Ok(observation) => {
            let citations = citations_from_observation(&observation);
            (observation, citations)
        }
        Err(e) => (format!("Error: {}", e), None),
    }
}

/// 执行能力编排循环
///
/// messages 是本轮的工作对话（历史 + 当前用户输入），循环在其上追加
/// Tool call / Observation 消息对。引用取最后一次携带 citations 的
/// 能力调用结果，后到的覆盖先到的。
pub async fn agent_loop(
    session: &AgentSession<'_>,
    messages: &mut Vec<Message>,
) -> Result<AgentOutcome, TutorError> {
    let mut step = 0;
    let mut citations: Vec<Citation> = Vec::new();
    let mut last_llm_output = String::new();

    loop {
        if session.cancel_token.is_cancelled() {
            return Err(TutorError::Cancelled);
        }

        if step >= session.max_steps {
            // 步数耗尽视为无输出，由上层转入降级检索路径
            tracing::warn!(
                max_steps = session.max_steps,
                last_output = %last_llm_output.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>(),
                "agent loop hit step limit"
            );
            return Ok(AgentOutcome {
                text: String::new(),
                citations,
            });
        }

        let output = session.planner.plan(messages).await?;
        last_llm_output = output.clone();

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(text)) => {
                messages.push(Message::assistant(text.clone()));
                return Ok(AgentOutcome { text, citations });
            }
            Ok(PlannerOutput::ToolCall(tc)) => {
                tracing::info!(tool = %tc.tool, "tool call");
                let (observation, obs_citations) = execute_call(session, &tc).await;
                log_observation(&tc.tool, &observation);
                if let Some(c) = obs_citations {
                    citations = c;
                }
                // 将能力调用与结果写回对话，供下一轮 Plan 使用
                messages.push(Message::assistant(format!(
                    "Tool call: {} | Result: {}",
                    tc.tool, observation
                )));
                messages.push(Message::user(format!(
                    "Observation from {}: {}",
                    tc.tool, observation
                )));
            }
            Err(e) => {
                // 解析失败（如 JSON 错误）：写回纠正提示，让模型重试
                tracing::warn!(error = %e, "planner output parse failed");
                messages.push(Message::user(format!(
                    "Your last reply could not be parsed ({}). Reply with either plain text or a single JSON object {{\"tool\": ..., \"args\": ...}}.",
                    e
                )));
            }
        }

        step += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::MockLlmClient;
    use crate::prompts::AGENT_SYSTEM;
    use crate::tools::{Tool, ToolRegistry};

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
            Ok(serde_json::json!({ "text": args["text"] }).to_string())
        }
    }

    /// 按页码返回一条引用，模拟检索类能力的结果结构
    struct CiteTool;

    #[async_trait::async_trait]
    impl Tool for CiteTool {
        fn name(&self) -> &str {
            "cite"
        }
        fn description(&self) -> &str {
            "Return a citation for the given page"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "page": { "type": "integer" } },
                "required": ["page"]
            })
        }
        async fn execute(&self, args: serde_json::Value) -> Result<String, String> {
            Ok(serde_json::json!({
                "context": "snippet",
                "citations": [{ "page": args["page"], "snippet": "snippet" }]
            })
            .to_string())
        }
    }

    fn make_executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(CiteTool);
        ToolExecutor::new(registry, 5)
    }

    #[tokio::test]
    async fn test_direct_response() {
        let llm = Arc::new(MockLlmClient::scripted(vec!["Just an answer.".to_string()]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: CancellationToken::new(),
            material_id: None,
            max_steps: 8,
        };
        let mut messages = vec![Message::user("hi".to_string())];
        let outcome = agent_loop(&session, &mut messages).await.unwrap();
        assert_eq!(outcome.text, "Just an answer.");
        assert!(outcome.citations.is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_then_response() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"tool": "echo", "args": {"text": "ping"}}"#.to_string(),
            "Done: ping".to_string(),
        ]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: CancellationToken::new(),
            material_id: None,
            max_steps: 8,
        };
        let mut messages = vec![Message::user("echo ping".to_string())];
        let outcome = agent_loop(&session, &mut messages).await.unwrap();
        assert_eq!(outcome.text, "Done: ping");
        // Observation 写回了对话
        assert!(messages
            .iter()
            .any(|m| m.content.starts_with("Observation from echo:")));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"tool": "no_such_tool", "args": {}}"#.to_string(),
            "Recovered.".to_string(),
        ]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: CancellationToken::new(),
            material_id: None,
            max_steps: 8,
        };
        let mut messages = vec![Message::user("do something".to_string())];
        let outcome = agent_loop(&session, &mut messages).await.unwrap();
        assert_eq!(outcome.text, "Recovered.");
        assert!(messages
            .iter()
            .any(|m| m.content.contains("Unknown tool 'no_such_tool'")));
    }

    #[tokio::test]
    async fn test_citations_follow_last_citing_call() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"tool": "cite", "args": {"page": 1}}"#.to_string(),
            r#"{"tool": "cite", "args": {"page": 2}}"#.to_string(),
            // echo 结果不含 citations 字段，不得清掉已有引用
            r#"{"tool": "echo", "args": {"text": "done"}}"#.to_string(),
            "Final answer.".to_string(),
        ]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: CancellationToken::new(),
            material_id: None,
            max_steps: 8,
        };
        let mut messages = vec![Message::user("cite twice".to_string())];
        let outcome = agent_loop(&session, &mut messages).await.unwrap();
        assert_eq!(outcome.text, "Final answer.");
        // 只保留最后一次携带引用的调用结果
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].page, Some(2));
    }

    #[tokio::test]
    async fn test_step_limit_yields_no_output() {
        let llm = Arc::new(MockLlmClient::scripted(vec![
            r#"{"tool": "echo", "args": {"text": "a"}}"#.to_string(),
            r#"{"tool": "echo", "args": {"text": "b"}}"#.to_string(),
            r#"{"tool": "echo", "args": {"text": "c"}}"#.to_string(),
        ]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: CancellationToken::new(),
            material_id: None,
            max_steps: 2,
        };
        let mut messages = vec![Message::user("loop forever".to_string())];
        let outcome = agent_loop(&session, &mut messages).await.unwrap();
        assert!(outcome.text.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let llm = Arc::new(MockLlmClient::scripted(vec!["unused".to_string()]));
        let planner = Planner::new(llm, AGENT_SYSTEM);
        let executor = make_executor();
        let token = CancellationToken::new();
        token.cancel();
        let session = AgentSession {
            planner: &planner,
            executor: &executor,
            cancel_token: token,
            material_id: None,
            max_steps: 8,
        };
        let mut messages = vec![Message::user("hi".to_string())];
        let err = agent_loop(&session, &mut messages).await.unwrap_err();
        assert!(matches!(err, TutorError::Cancelled));
    }
}
