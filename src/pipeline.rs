//! 对话管道：单轮处理的状态机
//!
//! START -> MEMORY_CHECK -> {HIT: REFLECT | MISS: AGENT_RUN} ->
//! {有输出: REFLECT | 无输出: FALLBACK_RAG -> REFLECT} ->
//! {需改进: IMPROVE_RETRY -> DONE | DONE}。
//! 重写至多一次，且重写结果不再反思；记忆命中路径反思但不重写。
//! 成功结束时无条件写会话历史与长期记忆，写失败只记日志。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{agent_loop, AgentOutcome, AgentSession, Planner};
use crate::config::AppConfig;
use crate::core::TutorError;
use crate::index::VectorIndexManager;
use crate::llm::{EmbeddingProvider, LlmClient};
use crate::memory::{
    LongTermMemory, MemoryLookup, MemoryRecallFilter, Message, Role, SessionStore,
    NO_MEMORIES_SENTINEL, TOO_VAGUE_SENTINEL,
};
use crate::prompts::{AGENT_SYSTEM, QA_SYSTEM};
use crate::reflect::{Reflection, ReflectionEntry, ReflectionLog, Reflector};
use crate::retrieval::{build_context, docs_to_citations, retrieve, sources_line, Citation};
use crate::tools::{
    AnswerWithContextTool, GuidedAnswerTool, LookupMemoryTool, QuizFromContextTool,
    RetrieveContextTool, SummarizeContextTool, ToolExecutor, ToolRegistry,
};

/// 回答风格：简洁直答或引导式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    #[default]
    Concise,
    Guided,
}

impl ChatMode {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("guided") {
            ChatMode::Guided
        } else {
            ChatMode::Concise
        }
    }
}

/// 一轮对话请求；会话与用户身份为必填
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_id: String,
    /// 当前绑定的材料集合 id
    pub material_id: String,
    pub input: String,
    pub mode: ChatMode,
}

/// 一轮对话结果
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub output: String,
    /// 产出回答的路径携带的引用；记忆命中路径为空
    pub citations: Vec<Citation>,
    pub reflection: Reflection,
    /// 是否发生了反思重写
    pub improved: bool,
}

/// 产出回答的阶段，决定重写时重新调用哪条路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Memory,
    Agent,
    Fallback,
}

/// 单轮状态机
enum TurnState {
    MemoryCheck,
    AgentRun,
    FallbackRag,
    Reflect {
        answer: String,
        citations: Vec<Citation>,
        stage: Stage,
    },
    ImproveRetry {
        answer: String,
        citations: Vec<Citation>,
        reflection: Reflection,
        stage: Stage,
    },
    Done {
        answer: String,
        citations: Vec<Citation>,
        reflection: Reflection,
        improved: bool,
    },
}

/// 对话管道：组装召回过滤、能力编排、反思与持久化
pub struct ChatPipeline {
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    manager: Arc<VectorIndexManager>,
    memory: Arc<LongTermMemory>,
    recall: Arc<MemoryRecallFilter>,
    sessions: Arc<SessionStore>,
    planner: Planner,
    executor: ToolExecutor,
    reflector: Reflector,
    reflection_log: ReflectionLog,
}

impl ChatPipeline {
    pub fn new(
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        manager: Arc<VectorIndexManager>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let memory = Arc::new(LongTermMemory::new(manager.clone()));
        let recall = Arc::new(MemoryRecallFilter::new(
            memory.clone(),
            embedder.clone(),
            cfg.recall.clone(),
        ));

        let max_context = cfg.agent.max_context_chars;
        let mut registry = ToolRegistry::new();
        registry.register(RetrieveContextTool::new(
            manager.clone(),
            embedder.clone(),
            max_context,
        ));
        registry.register(AnswerWithContextTool::new(llm.clone(), max_context));
        registry.register(SummarizeContextTool::new(llm.clone(), max_context));
        registry.register(QuizFromContextTool::new(llm.clone(), max_context));
        registry.register(GuidedAnswerTool::new(llm.clone(), max_context));
        registry.register(LookupMemoryTool::new(recall.clone()));

        let system_prompt = AGENT_SYSTEM.replace("{tools}", &registry.to_schema_json());
        let executor = ToolExecutor::new(registry, cfg.agent.tool_timeout_secs);
        let planner = Planner::new(llm.clone(), system_prompt);
        let reflector = Reflector::new(llm.clone());
        let reflection_log = ReflectionLog::new(cfg.app.data_root.join(&cfg.app.reflection_log));

        Self {
            cfg,
            llm,
            embedder,
            manager,
            memory,
            recall,
            sessions,
            planner,
            executor,
            reflector,
            reflection_log,
        }
    }

    pub fn index_manager(&self) -> Arc<VectorIndexManager> {
        self.manager.clone()
    }

    /// 上游契约：lookupMemory(query)
    pub async fn lookup_memory(&self, query: &str) -> Result<MemoryLookup, TutorError> {
        self.recall.lookup(query).await
    }

    /// 处理一轮对话
    pub async fn chat(
        &self,
        req: &ChatRequest,
        cancel_token: CancellationToken,
    ) -> Result<ChatOutcome, TutorError> {
        let input = req.input.trim();
        if input.chars().count() < 2 {
            return Err(TutorError::InvalidInput(
                "input must be at least 2 characters".to_string(),
            ));
        }
        if req.material_id.trim().is_empty() {
            return Err(TutorError::MissingCollectionId);
        }

        let history = self
            .sessions
            .load(
                &req.session_id,
                &req.user_id,
                self.cfg.app.max_history_messages,
            )
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session history load failed");
                Vec::new()
            });

        let instruction = build_instruction(input, req.mode);
        let mut state = TurnState::MemoryCheck;
        let mut retried = false;

        let (answer, citations, reflection, improved) = loop {
            state = match state {
                TurnState::MemoryCheck => {
                    let lookup = self.recall.lookup(input).await?;
                    if accept_memory(&lookup, self.cfg.recall.accept_threshold) {
                        tracing::info!(
                            confidence = lookup.best_match_confidence,
                            "memory hit, reusing stored answer"
                        );
                        TurnState::Reflect {
                            answer: lookup.text,
                            citations: Vec::new(),
                            stage: Stage::Memory,
                        }
                    } else {
                        TurnState::AgentRun
                    }
                }
                TurnState::AgentRun => {
                    // 编排硬错误向上传播；仅空输出走降级检索
                    let outcome = self
                        .run_agent(&history, &instruction, &req.material_id, &cancel_token)
                        .await?;
                    if outcome.text.trim().is_empty() {
                        tracing::warn!("agent produced no output, falling back to direct RAG");
                        TurnState::FallbackRag
                    } else {
                        TurnState::Reflect {
                            answer: outcome.text,
                            citations: outcome.citations,
                            stage: Stage::Agent,
                        }
                    }
                }
                TurnState::FallbackRag => {
                    let (answer, citations) =
                        self.run_fallback(&instruction, &req.material_id).await?;
                    TurnState::Reflect {
                        answer,
                        citations,
                        stage: Stage::Fallback,
                    }
                }
                TurnState::Reflect {
                    answer,
                    citations,
                    stage,
                } => {
                    let reflection = self.reflector.reflect(input, &answer).await;
                    let wants_retry = stage != Stage::Memory
                        && reflection.needs_improvement
                        && !reflection.suggestions.trim().is_empty();
                    if wants_retry {
                        TurnState::ImproveRetry {
                            answer,
                            citations,
                            reflection,
                            stage,
                        }
                    } else {
                        TurnState::Done {
                            answer,
                            citations,
                            reflection,
                            improved: false,
                        }
                    }
                }
                TurnState::ImproveRetry {
                    answer,
                    citations,
                    reflection,
                    stage,
                } => {
                    retried = true;
                    let improved_instruction = format!(
                        "{}\n\nImprove your previous answer using these notes:\n{}",
                        instruction, reflection.suggestions
                    );
                    let retry = match stage {
                        Stage::Agent => self
                            .run_agent(
                                &history,
                                &improved_instruction,
                                &req.material_id,
                                &cancel_token,
                            )
                            .await
                            .map(|o| (o.text, o.citations)),
                        Stage::Fallback => {
                            self.run_fallback(&improved_instruction, &req.material_id).await
                        }
                        Stage::Memory => unreachable!("memory hits never retry"),
                    };
                    match retry {
                        Ok((text, retry_citations)) if !text.trim().is_empty() => {
                            TurnState::Done {
                                answer: text,
                                citations: retry_citations,
                                reflection,
                                improved: true,
                            }
                        }
                        Ok(_) => TurnState::Done {
                            answer,
                            citations,
                            reflection,
                            improved: false,
                        },
                        Err(TutorError::Cancelled) => return Err(TutorError::Cancelled),
                        Err(e) => {
                            // 重写是反思附带的可选增益，失败保留原回答
                            tracing::warn!(error = %e, "improve retry failed, keeping original answer");
                            TurnState::Done {
                                answer,
                                citations,
                                reflection,
                                improved: false,
                            }
                        }
                    }
                }
                TurnState::Done {
                    answer,
                    citations,
                    reflection,
                    improved,
                } => break (answer, citations, reflection, improved),
            };
        };

        self.reflection_log.append(&ReflectionEntry::new(
            &req.session_id,
            &req.user_id,
            input,
            &reflection,
            retried,
        ));
        self.persist_turn(req, input, &answer).await;

        Ok(ChatOutcome {
            output: answer,
            citations,
            reflection,
            improved,
        })
    }

    async fn run_agent(
        &self,
        history: &[Message],
        instruction: &str,
        material_id: &str,
        cancel_token: &CancellationToken,
    ) -> Result<AgentOutcome, TutorError> {
        let session = AgentSession {
            planner: &self.planner,
            executor: &self.executor,
            cancel_token: cancel_token.clone(),
            material_id: Some(material_id),
            max_steps: self.cfg.agent.max_steps,
        };
        let mut messages = history.to_vec();
        messages.push(Message::user(instruction.to_string()));
        agent_loop(&session, &mut messages).await
    }

    /// 降级路径：直接检索 + 单次补全 + 确定性的 Sources 脚注
    async fn run_fallback(
        &self,
        instruction: &str,
        material_id: &str,
    ) -> Result<(String, Vec<Citation>), TutorError> {
        let docs = retrieve(
            &self.manager,
            self.embedder.as_ref(),
            material_id,
            instruction,
            self.cfg.fallback.k,
        )
        .await?;
        let citations = docs_to_citations(&docs);
        let context = build_context(&docs, self.cfg.agent.max_context_chars);

        let messages = vec![
            Message::system(QA_SYSTEM.to_string()),
            Message::user(format!(
                "QUESTION: {}\n\nCONTEXT:\n{}",
                instruction, context
            )),
        ];
        let answer = self.llm.complete(&messages).await.map_err(TutorError::Llm)?;
        let text = format!("{}\n\n{}", answer.trim(), sources_line(&citations));
        Ok((text, citations))
    }

    /// 成功结束后的无条件持久化：会话历史 + 长期记忆，失败均只记日志
    async fn persist_turn(&self, req: &ChatRequest, input: &str, answer: &str) {
        if let Err(e) = self
            .sessions
            .append(&req.session_id, &req.user_id, &Role::User, input)
        {
            tracing::warn!(error = %e, "session append (user) failed");
        }
        if let Err(e) =
            self.sessions
                .append(&req.session_id, &req.user_id, &Role::Assistant, answer)
        {
            tracing::warn!(error = %e, "session append (assistant) failed");
        }

        if let Err(e) = self.memory.store(answer, &req.user_id).await {
            tracing::warn!(error = %e, "long-term memory store failed");
        }
    }
}

/// 回答风格折叠进指令文本
fn build_instruction(input: &str, mode: ChatMode) -> String {
    match mode {
        ChatMode::Concise => input.to_string(),
        ChatMode::Guided => format!(
            "{}\n\n(Answer in a guided, mentoring style; prefer the guided_answer_from_context tool.)",
            input
        ),
    }
}

/// 记忆命中判定：置信度过外部闸值且文本不是哨兵
fn accept_memory(lookup: &MemoryLookup, threshold: f32) -> bool {
    lookup.best_match_confidence >= threshold
        && lookup.text != NO_MEMORIES_SENTINEL
        && lookup.text != TOO_VAGUE_SENTINEL
        && !lookup.text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(confidence: f32, text: &str) -> MemoryLookup {
        MemoryLookup {
            text: text.to_string(),
            best_match_confidence: confidence,
        }
    }

    #[test]
    fn test_accept_memory_requires_threshold_and_real_text() {
        assert!(accept_memory(
            &lookup(0.8, "Here are 2 related memories:\n..."),
            0.6
        ));
        assert!(!accept_memory(&lookup(0.5, "Here are memories"), 0.6));
        assert!(!accept_memory(&lookup(0.9, NO_MEMORIES_SENTINEL), 0.6));
        assert!(!accept_memory(&lookup(0.9, TOO_VAGUE_SENTINEL), 0.6));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(ChatMode::parse("guided"), ChatMode::Guided);
        assert_eq!(ChatMode::parse("Guided"), ChatMode::Guided);
        assert_eq!(ChatMode::parse("concise"), ChatMode::Concise);
        assert_eq!(ChatMode::parse(""), ChatMode::Concise);
    }

    #[test]
    fn test_guided_instruction_mentions_style() {
        let s = build_instruction("What is cell?", ChatMode::Guided);
        assert!(s.contains("mentoring style"));
        assert_eq!(build_instruction("hi there", ChatMode::Concise), "hi there");
    }
}
