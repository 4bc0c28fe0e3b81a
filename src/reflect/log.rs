//! 反思日志：JSONL 追加写
//!
//! 每轮对话的评估结果追加到一行 JSON，便于离线分析回答质量趋势。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::reflect::Reflection;

/// 一条反思日志记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub timestamp: String,
    pub session_id: String,
    pub user_id: String,
    pub question: String,
    pub score: f64,
    pub critique: String,
    pub needs_improvement: bool,
    pub suggestions: String,
    /// 本轮是否触发了重写
    pub retried: bool,
}

impl ReflectionEntry {
    pub fn new(
        session_id: &str,
        user_id: &str,
        question: &str,
        reflection: &Reflection,
        retried: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            question: question.to_string(),
            score: reflection.score,
            critique: reflection.critique.clone(),
            needs_improvement: reflection.needs_improvement,
            suggestions: reflection.suggestions.clone(),
            retried,
        }
    }
}

/// 反思日志写入器
pub struct ReflectionLog {
    path: PathBuf,
}

impl ReflectionLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 追加一条记录；写失败只记日志，不向上传播
    pub fn append(&self, entry: &ReflectionEntry) {
        if let Err(e) = self.try_append(entry) {
            tracing::warn!(error = %e, path = %self.path.display(), "reflection log append failed");
        }
    }

    fn try_append(&self, entry: &ReflectionEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
