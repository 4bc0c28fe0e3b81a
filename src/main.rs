//! Sage - 文档驱动的反思型辅导引擎
//!
//! 入口：初始化日志与配置，组装对话管道，运行一个本地 REPL。
//! 命令：/material <id> 绑定材料、/ingest <id> <file> 摄入纯文本、
//! /mode <concise|guided>、/memory <query>、/quit。

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use sage::config::load_config;
use sage::index::{meta, Document, VectorIndexManager};
use sage::llm::{OpenAiClient, OpenAiEmbedder};
use sage::memory::SessionStore;
use sage::{ChatMode, ChatPipeline, ChatRequest};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sage::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let llm = Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        None,
    ));
    let embedder = Arc::new(OpenAiEmbedder::new(
        cfg.embedding.base_url.as_deref(),
        &cfg.embedding.model,
        None,
    ));
    let manager = Arc::new(VectorIndexManager::new(
        cfg.app.data_root.clone(),
        embedder.clone(),
    ));
    let session_db = cfg.app.data_root.join(&cfg.app.session_db);
    let sessions =
        Arc::new(SessionStore::open(session_db).context("Failed to open session store")?);
    let pipeline = ChatPipeline::new(cfg, llm, embedder, manager, sessions);

    println!("sage tutor - type /help for commands");
    let mut material_id: Option<String> = None;
    let mut mode = ChatMode::Concise;

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(3, ' ');
            match parts.next().unwrap_or("") {
                "quit" | "exit" => break,
                "help" => {
                    println!("/material <id>          bind a material collection");
                    println!("/ingest <id> <file>     ingest a plain-text file as a material");
                    println!("/mode <concise|guided>  set answer style");
                    println!("/memory <query>         look up long-term memory");
                    println!("/quit                   exit");
                }
                "material" => match parts.next() {
                    Some(id) if !id.is_empty() => {
                        material_id = Some(id.to_string());
                        println!("material bound: {}", id);
                    }
                    _ => println!("usage: /material <id>"),
                },
                "mode" => {
                    mode = ChatMode::parse(parts.next().unwrap_or(""));
                    println!("mode: {:?}", mode);
                }
                "ingest" => match (parts.next(), parts.next()) {
                    (Some(id), Some(path)) => {
                        match ingest_text_file(pipeline.index_manager(), id, path).await {
                            Ok(n) => {
                                material_id = Some(id.to_string());
                                println!("ingested {} paragraphs into '{}'", n, id);
                            }
                            Err(e) => println!("ingest failed: {}", e),
                        }
                    }
                    _ => println!("usage: /ingest <id> <file>"),
                },
                "memory" => {
                    let query = parts.collect::<Vec<_>>().join(" ");
                    match pipeline.lookup_memory(&query).await {
                        Ok(lookup) => println!(
                            "{}\n(confidence: {:.3})",
                            lookup.text, lookup.best_match_confidence
                        ),
                        Err(e) => println!("memory lookup failed: {}", e),
                    }
                }
                other => println!("unknown command: /{}", other),
            }
            continue;
        }

        let Some(material) = material_id.clone() else {
            println!("no material bound; use /material <id> or /ingest <id> <file>");
            continue;
        };

        let req = ChatRequest {
            session_id: "repl".to_string(),
            user_id: "local".to_string(),
            material_id: material,
            input: line.to_string(),
            mode,
        };
        match pipeline.chat(&req, CancellationToken::new()).await {
            Ok(outcome) => {
                println!("{}", outcome.output);
                if outcome.improved {
                    println!("(answer was rewritten after self-review)");
                }
            }
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}

/// 将纯文本文件按空行分段摄入为一个材料集合，段号记作页码
async fn ingest_text_file(
    manager: Arc<VectorIndexManager>,
    material_id: &str,
    path: &str,
) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    let docs: Vec<Document> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, paragraph)| {
            Document::new(paragraph)
                .with_meta(meta::MATERIAL_ID, material_id)
                .with_meta(meta::PAGE, (i + 1) as i64)
                .with_meta(meta::SOURCE_PATH, path)
        })
        .collect();
    let count = docs.len();
    manager.append_documents(material_id, docs).await?;
    Ok(count)
}
