//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SAGE__*` 覆盖（双下划线表示嵌套，
//! 如 `SAGE__RECALL__ACCEPT_THRESHOLD=0.7`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub recall: RecallSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub fallback: FallbackSection,
}

/// [app] 段：数据目录与会话历史上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 向量索引根目录，每个 collection 一个子目录
    pub data_root: PathBuf,
    /// 会话消息 SQLite 文件（相对 data_root）
    pub session_db: String,
    /// 反思日志文件（相对 data_root）
    pub reflection_log: String,
    /// 每轮注入的历史消息条数上限
    pub max_history_messages: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("vectorstores"),
            session_db: "agent_memory.sqlite".to_string(),
            reflection_log: "reflection_log.jsonl".to_string(),
            max_history_messages: 20,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与模型
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_chat_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [embedding] 段：嵌入模型（可与 LLM 共用端点）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EmbeddingSection {
    #[serde(default = "default_embed_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

/// [recall] 段：记忆召回过滤阈值
///
/// floor_similarity（过滤器内部地板 0.65）与 accept_threshold（流水线接受闸 0.6）
/// 是两个独立常量：结果可以通过过滤却仍被上游拒绝，二者分别可配。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecallSection {
    /// 最近邻数量
    pub k: usize,
    /// 绝对相似度地板
    pub floor_similarity: f32,
    /// 相对惩罚系数（minSim = max(floor, weight * mean)）
    pub relative_weight: f32,
    /// 流水线直接复用记忆所需的置信度
    pub accept_threshold: f32,
}

impl Default for RecallSection {
    fn default() -> Self {
        Self {
            k: 5,
            floor_similarity: 0.65,
            relative_weight: 0.9,
            accept_threshold: 0.6,
        }
    }
}

/// [agent] 段：能力调用循环的边界
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单轮最大能力调用次数，防止无限工具循环
    pub max_steps: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 注入 prompt 的上下文字符上限
    pub max_context_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 8,
            tool_timeout_secs: 30,
            max_context_chars: 18_000,
        }
    }
}

/// [fallback] 段：agent 无输出时的直接 RAG 兜底
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    /// 兜底检索的固定 k
    pub k: usize,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self { k: 8 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            embedding: EmbeddingSection::default(),
            recall: RecallSection::default(),
            agent: AgentSection::default(),
            fallback: FallbackSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SAGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SAGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SAGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
