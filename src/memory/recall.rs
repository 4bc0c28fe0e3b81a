//! 记忆召回过滤：决定一条长期记忆是否可信到可以直接复用
//!
//! 距离 -> 相似度用 s = 1/(1+d)（d 单调递减，值域 (0,1]）；自适应阈值
//! minSim = max(地板, 系数 * 均值)，绝对地板叠加相对惩罚，单个强匹配无法
//! 掩盖整体疲弱的邻域。纯停用词/短词查询无论向量距离如何都不予信任。

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::RecallSection;
use crate::core::TutorError;
use crate::index::Document;
use crate::llm::EmbeddingProvider;
use crate::memory::LongTermMemory;

/// 召回无果时的哨兵文本（上游据此拒绝复用）
pub const NO_MEMORIES_SENTINEL: &str = "No relevant memories found.";
pub const TOO_VAGUE_SENTINEL: &str = "Query too vague to search memory.";

/// 固定停用词集合
const STOPWORDS: [&str; 10] = ["who", "what", "is", "are", "the", "a", "an", "to", "of", "how"];

/// 记忆片段在渲染结果中的截断长度
const FRAGMENT_CHARS: usize = 300;

/// 召回判定结果
#[derive(Debug, Clone)]
pub enum RecallOutcome {
    /// 修剪后查询长度 < 3
    TooShort,
    /// 去掉停用词与短词后查询无实义 token
    TooVague,
    /// 无结果 / 仅种子 / 无一条过阈值
    Empty,
    /// 可信记忆，按相似度降序；confidence 为最高相似度
    Hit {
        memories: Vec<(Document, f32)>,
        confidence: f32,
    },
}

/// 上游契约：lookupMemory(query) 的渲染输出
#[derive(Debug, Clone)]
pub struct MemoryLookup {
    pub text: String,
    pub best_match_confidence: f32,
}

/// 距离转相似度：对所有 d ≥ 0 有 s ∈ (0,1] 且随 d 严格递减
pub fn to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}_-]+").unwrap())
}

/// Unicode 字母/数字边界分词，去掉停用词与长度 ≤ 2 的 token
fn meaningful_tokens(query: &str) -> Vec<String> {
    token_regex()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()) && t.chars().count() > 2)
        .collect()
}

/// 纯判定核心：对 (Document, distance) 列表应用种子剔除、自适应阈值与词法闸
pub fn assess(query: &str, raw: Vec<(Document, f32)>, cfg: &RecallSection) -> RecallOutcome {
    if raw.is_empty() {
        return RecallOutcome::Empty;
    }

    let scored: Vec<(Document, f32)> = raw
        .into_iter()
        .map(|(doc, dist)| {
            let sim = to_similarity(dist);
            (doc, sim)
        })
        .filter(|(doc, _)| !doc.is_seed())
        .collect();
    if scored.is_empty() {
        return RecallOutcome::Empty;
    }

    let mean: f32 = scored.iter().map(|(_, s)| s).sum::<f32>() / scored.len() as f32;
    let min_sim = cfg.floor_similarity.max(cfg.relative_weight * mean);

    if meaningful_tokens(query).is_empty() {
        return RecallOutcome::TooVague;
    }

    let mut kept: Vec<(Document, f32)> = scored
        .into_iter()
        .filter(|(doc, sim)| *sim >= min_sim && !doc.content().is_empty())
        .collect();
    if kept.is_empty() {
        return RecallOutcome::Empty;
    }
    kept.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let confidence = kept[0].1;
    RecallOutcome::Hit {
        memories: kept,
        confidence,
    }
}

/// 渲染为上游契约形态：哨兵文本 + 置信度
pub fn render(outcome: &RecallOutcome) -> MemoryLookup {
    match outcome {
        RecallOutcome::TooShort | RecallOutcome::Empty => MemoryLookup {
            text: NO_MEMORIES_SENTINEL.to_string(),
            best_match_confidence: 0.0,
        },
        RecallOutcome::TooVague => MemoryLookup {
            text: TOO_VAGUE_SENTINEL.to_string(),
            best_match_confidence: 0.0,
        },
        RecallOutcome::Hit {
            memories,
            confidence,
        } => {
            let formatted: Vec<String> = memories
                .iter()
                .map(|(doc, sim)| {
                    let fragment: String = doc.content().chars().take(FRAGMENT_CHARS).collect();
                    format!("• {} (sim: {:.3})", fragment, sim)
                })
                .collect();
            MemoryLookup {
                text: format!(
                    "Here are {} related memories:\n\n{}",
                    memories.len(),
                    formatted.join("\n\n")
                ),
                best_match_confidence: *confidence,
            }
        }
    }
}

/// 记忆召回过滤器：嵌入查询、搜索记忆集合、应用判定核心
pub struct MemoryRecallFilter {
    memory: Arc<LongTermMemory>,
    embedder: Arc<dyn EmbeddingProvider>,
    cfg: RecallSection,
}

impl MemoryRecallFilter {
    pub fn new(
        memory: Arc<LongTermMemory>,
        embedder: Arc<dyn EmbeddingProvider>,
        cfg: RecallSection,
    ) -> Self {
        Self {
            memory,
            embedder,
            cfg,
        }
    }

    pub async fn recall(&self, query: &str) -> Result<RecallOutcome, TutorError> {
        if query.trim().chars().count() < 3 {
            return Ok(RecallOutcome::TooShort);
        }
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(TutorError::Embedding)?;
        let raw = self.memory.search(&vector, self.cfg.k).await?;
        let outcome = assess(query, raw, &self.cfg);
        if let RecallOutcome::Hit { confidence, .. } = &outcome {
            tracing::debug!(confidence = confidence, "memory recall hit");
        }
        Ok(outcome)
    }

    /// 召回并渲染为 lookup 契约形态
    pub async fn lookup(&self, query: &str) -> Result<MemoryLookup, TutorError> {
        Ok(render(&self.recall(query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::meta;

    fn cfg() -> RecallSection {
        RecallSection::default()
    }

    fn doc(content: &str) -> Document {
        Document::new(content)
    }

    #[test]
    fn test_similarity_bounded_and_decreasing() {
        let mut prev = f32::MAX;
        for d in [0.0, 0.01, 0.1, 0.5, 1.0, 5.0, 100.0] {
            let s = to_similarity(d);
            assert!(s > 0.0 && s <= 1.0, "s={} out of (0,1]", s);
            assert!(s < prev || (d == 0.0 && s == 1.0));
            prev = s;
        }
        assert!((to_similarity(0.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_adaptive_threshold_never_below_floor() {
        // 全部距离极大 -> 相似度极低，均值远低于地板，仍无一条通过
        let raw = vec![(doc("weak a"), 10.0), (doc("weak b"), 20.0)];
        let outcome = assess("Padma Shri award", raw, &cfg());
        assert!(matches!(outcome, RecallOutcome::Empty));
    }

    #[test]
    fn test_relative_penalty_drops_borderline_in_strong_neighborhood() {
        // 均值很高时 0.9*mean 超过地板，把勉强过地板的结果挤掉
        let raw = vec![
            (doc("strong"), 0.02),  // sim ≈ 0.980
            (doc("strong2"), 0.04), // sim ≈ 0.962
            (doc("border"), 0.45),  // sim ≈ 0.690，高于地板但低于 0.9*mean
        ];
        let outcome = assess("Karnataka poet biography", raw, &cfg());
        match outcome {
            RecallOutcome::Hit { memories, .. } => {
                assert_eq!(memories.len(), 2);
                assert!(memories.iter().all(|(d, _)| d.content().starts_with("strong")));
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_stopword_query_is_too_vague_regardless_of_distance() {
        let raw = vec![(doc("perfect match"), 0.0)];
        let outcome = assess("what is the", raw, &cfg());
        assert!(matches!(outcome, RecallOutcome::TooVague));
    }

    #[test]
    fn test_single_topic_token_is_enough() {
        let raw = vec![(doc("Kuvempu was a poet"), 0.1)];
        let outcome = assess("Kuvempu", raw, &cfg());
        assert!(matches!(outcome, RecallOutcome::Hit { .. }));
    }

    #[test]
    fn test_seed_only_results_are_empty_not_error() {
        let raw = vec![(doc("welcome seed").with_meta(meta::SEED, true), 0.0)];
        let outcome = assess("Padma Shri", raw, &cfg());
        assert!(matches!(outcome, RecallOutcome::Empty));
    }

    #[test]
    fn test_hit_sorted_descending_with_top_confidence() {
        let raw = vec![
            (doc("ok"), 0.3),     // sim ≈ 0.769
            (doc("best"), 0.05),  // sim ≈ 0.952
            (doc("good"), 0.15),  // sim ≈ 0.870
        ];
        match assess("Padma Shri", raw, &cfg()) {
            RecallOutcome::Hit {
                memories,
                confidence,
            } => {
                assert_eq!(memories[0].0.content(), "best");
                assert!(memories.windows(2).all(|w| w[0].1 >= w[1].1));
                assert!((confidence - memories[0].1).abs() < f32::EPSILON);
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_render_sentinels() {
        assert_eq!(render(&RecallOutcome::Empty).text, NO_MEMORIES_SENTINEL);
        assert_eq!(render(&RecallOutcome::TooShort).text, NO_MEMORIES_SENTINEL);
        assert_eq!(render(&RecallOutcome::TooVague).text, TOO_VAGUE_SENTINEL);
        let hit = RecallOutcome::Hit {
            memories: vec![(doc("fact"), 0.9)],
            confidence: 0.9,
        };
        let rendered = render(&hit);
        assert!(rendered.text.contains("1 related memories"));
        assert!(rendered.text.contains("fact"));
        assert!((rendered.best_match_confidence - 0.9).abs() < f32::EPSILON);
    }
}
