//! 集合向量索引的生命周期管理
//!
//! 每个 collection id 对应一个磁盘目录与至多一个进程内句柄。首次访问按 key
//! single-flight：同一 id 的并发构建/加载只执行一次，所有等待者共享结果；
//! 不同 id 互不阻塞。每个句柄的落盘相互串行，追加期间的写入不会丢失。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OnceCell, RwLock};

use crate::core::TutorError;
use crate::index::store::{clamp_k, Document, VectorIndex};
use crate::llm::EmbeddingProvider;

/// 索引文件名（每个集合目录内）
const INDEX_FILE: &str = "index.json";

/// 单个集合的进程内句柄：读写共享同一份索引，落盘按代号串行
#[derive(Debug)]
pub struct IndexHandle {
    collection_id: String,
    dir: PathBuf,
    index: RwLock<VectorIndex>,
    /// 内存索引的版本号，每次追加递增
    generation: AtomicU64,
    /// 守护值为已落盘的版本号；互斥保证同一集合至多一个在途落盘
    persisted: AsyncMutex<u64>,
}

impl IndexHandle {
    fn new(collection_id: &str, dir: PathBuf, index: VectorIndex) -> Self {
        Self {
            collection_id: collection_id.to_string(),
            dir,
            index: RwLock::new(index),
            generation: AtomicU64::new(0),
            persisted: AsyncMutex::new(0),
        }
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// 按查询向量检索（升序距离，k 收拢到 [1,50]）
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        predicate: Option<&(dyn Fn(&Document) -> bool + Sync)>,
    ) -> Vec<(Document, f32)> {
        self.index.read().await.search(query, clamp_k(k), predicate)
    }

    /// 将滞后于内存版本的部分写盘；由互斥串行，重复排队的任务直接跳过
    async fn persist_pending(&self) -> anyhow::Result<()> {
        let mut persisted = self.persisted.lock().await;
        let target = self.generation.load(Ordering::Acquire);
        if *persisted >= target {
            return Ok(());
        }
        let bytes = {
            let index = self.index.read().await;
            serde_json::to_vec(&*index)?
        };
        write_atomic(&self.dir, &bytes)?;
        *persisted = target;
        Ok(())
    }
}

/// 原子写：先写临时文件再重命名，取消或崩溃不会留下残缺索引
fn write_atomic(dir: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, dir.join(INDEX_FILE))?;
    Ok(())
}

/// 向量索引管理器：single-flight 缓存 + 嵌入 + 持久化调度
pub struct VectorIndexManager {
    root: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    /// key -> 构建完成单元；OnceCell 不缓存失败，取消的构建可由其余等待者接管
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<IndexHandle>>>>>,
}

impl VectorIndexManager {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            root: root.into(),
            embedder,
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection_id: &str) -> PathBuf {
        self.root.join(collection_id)
    }

    fn cell_for(&self, collection_id: &str) -> Arc<OnceCell<Arc<IndexHandle>>> {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(collection_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// 获取集合句柄：已有持久化索引则加载，否则用种子文档构建；
    /// 两者皆无时返回 CollectionNotFound。同一 id 的并发首次访问只构建一次。
    pub async fn get_or_create(
        &self,
        collection_id: &str,
        seeds: Option<&[Document]>,
    ) -> Result<Arc<IndexHandle>, TutorError> {
        if collection_id.trim().is_empty() {
            return Err(TutorError::MissingCollectionId);
        }
        let cell = self.cell_for(collection_id);
        cell.get_or_try_init(|| self.load_or_build(collection_id, seeds))
            .await
            .cloned()
    }

    async fn load_or_build(
        &self,
        collection_id: &str,
        seeds: Option<&[Document]>,
    ) -> Result<Arc<IndexHandle>, TutorError> {
        let dir = self.collection_dir(collection_id);
        let file = dir.join(INDEX_FILE);

        if file.exists() {
            let data = std::fs::read(&file)
                .map_err(|e| TutorError::CollectionNotFound(format!("{}: {}", collection_id, e)))?;
            let index: VectorIndex = serde_json::from_slice(&data)
                .map_err(|e| TutorError::JsonParse(format!("index {}: {}", collection_id, e)))?;
            tracing::info!(collection = collection_id, entries = index.len(), "index loaded");
            return Ok(Arc::new(IndexHandle::new(collection_id, dir, index)));
        }

        let seeds = match seeds {
            Some(s) if !s.is_empty() => s,
            _ => return Err(TutorError::CollectionNotFound(collection_id.to_string())),
        };

        let mut index = VectorIndex::new();
        for doc in seeds {
            let vector = self
                .embedder
                .embed(doc.content())
                .await
                .map_err(TutorError::Embedding)?;
            index.push(vector, doc.clone());
        }
        let bytes = serde_json::to_vec(&index)
            .map_err(|e| TutorError::JsonParse(format!("index {}: {}", collection_id, e)))?;
        // 初次落盘失败不致命：内存索引已正确，可由后续追加重试
        if let Err(e) = write_atomic(&dir, &bytes) {
            tracing::warn!(collection = collection_id, error = %e, "initial index persist failed");
        }
        tracing::info!(collection = collection_id, entries = index.len(), "index built");
        Ok(Arc::new(IndexHandle::new(collection_id, dir, index)))
    }

    /// 检索：k 收拢到 [1,50]，按距离升序返回 (Document, distance)
    pub async fn search(
        &self,
        collection_id: &str,
        query: &[f32],
        k: usize,
        predicate: Option<&(dyn Fn(&Document) -> bool + Sync)>,
    ) -> Result<Vec<(Document, f32)>, TutorError> {
        let handle = self.get_or_create(collection_id, None).await?;
        Ok(handle.search(query, k, predicate).await)
    }

    /// 原地追加文档并调度落盘；空列表为无副作用的 no-op。
    /// 集合不存在时以这批文档为种子构建（与摄取路径一致）。
    pub async fn append_documents(
        &self,
        collection_id: &str,
        docs: Vec<Document>,
    ) -> Result<(), TutorError> {
        if docs.is_empty() {
            return Ok(());
        }
        let handle = match self.get_or_create(collection_id, None).await {
            Ok(h) => h,
            Err(TutorError::CollectionNotFound(_)) => {
                // 并发的首次追加只有一方的种子会被构建吸收；
                // 输掉竞争的一方拿到对方的句柄后必须继续走常规追加路径
                let built_here = AtomicBool::new(false);
                let cell = self.cell_for(collection_id);
                let handle = cell
                    .get_or_try_init(|| async {
                        built_here.store(true, Ordering::SeqCst);
                        self.load_or_build(collection_id, Some(&docs)).await
                    })
                    .await
                    .cloned()?;
                if built_here.load(Ordering::SeqCst) {
                    return Ok(());
                }
                handle
            }
            Err(e) => return Err(e),
        };

        let mut embedded = Vec::with_capacity(docs.len());
        for doc in docs {
            let vector = self
                .embedder
                .embed(doc.content())
                .await
                .map_err(TutorError::Embedding)?;
            embedded.push((vector, doc));
        }
        {
            let mut index = handle.index.write().await;
            for (vector, doc) in embedded {
                index.push(vector, doc);
            }
        }
        handle.generation.fetch_add(1, Ordering::Release);
        Self::schedule_persist(handle);
        Ok(())
    }

    /// 后台落盘：失败仅记录，不影响已计算的内存状态
    fn schedule_persist(handle: Arc<IndexHandle>) {
        tokio::spawn(async move {
            if let Err(e) = handle.persist_pending().await {
                tracing::warn!(
                    collection = %handle.collection_id,
                    error = %e,
                    "index persist failed"
                );
            }
        });
    }

    /// 等待指定集合的落盘追平内存版本（测试与停机用）
    pub async fn flush(&self, collection_id: &str) -> Result<(), TutorError> {
        let handle = self.get_or_create(collection_id, None).await?;
        if let Err(e) = handle.persist_pending().await {
            tracing::warn!(collection = collection_id, error = %e, "index persist failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::store::meta;
    use crate::llm::MockEmbedder;

    fn seeds(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::new(format!("seed doc {}", i)).with_meta(meta::PAGE, i as i64))
            .collect()
    }

    #[tokio::test]
    async fn test_build_persist_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = Arc::new(MockEmbedder::new());
        let mgr = VectorIndexManager::new(tmp.path(), embedder.clone());

        let handle = mgr.get_or_create("mat-1", Some(&seeds(3))).await.unwrap();
        assert_eq!(handle.len().await, 3);
        assert!(tmp.path().join("mat-1").join(INDEX_FILE).exists());

        // 新管理器（空缓存）应从磁盘加载同一集合
        let mgr2 = VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new()));
        let handle2 = mgr2.get_or_create("mat-1", None).await.unwrap();
        assert_eq!(handle2.len().await, 3);
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new()));
        let err = mgr.get_or_create("absent", None).await.unwrap_err();
        assert!(matches!(err, TutorError::CollectionNotFound(_)));
        // 失败不被缓存：之后带种子仍可构建
        assert!(mgr.get_or_create("absent", Some(&seeds(1))).await.is_ok());
    }

    #[tokio::test]
    async fn test_append_empty_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new()));
        // 集合不存在也不报错、不落盘
        mgr.append_documents("nothing", Vec::new()).await.unwrap();
        assert!(!tmp.path().join("nothing").exists());
    }

    #[tokio::test]
    async fn test_append_then_flush_visible_on_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new()));
        mgr.get_or_create("mat-2", Some(&seeds(1))).await.unwrap();
        mgr.append_documents("mat-2", vec![Document::new("appended fact")])
            .await
            .unwrap();
        mgr.flush("mat-2").await.unwrap();

        let mgr2 = VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new()));
        let handle = mgr2.get_or_create("mat-2", None).await.unwrap();
        assert_eq!(handle.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_builds_once() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = Arc::new(MockEmbedder::new());
        let mgr = Arc::new(VectorIndexManager::new(tmp.path(), embedder.clone()));
        let docs = seeds(2);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let mgr = mgr.clone();
                let docs = docs.clone();
                tokio::spawn(async move { mgr.get_or_create("shared", Some(&docs)).await })
            })
            .collect();
        let handles: Vec<_> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        // 恰好一次构建：嵌入调用数等于种子数，而非 20 倍
        assert_eq!(embedder.calls(), 2);
        for h in &handles {
            assert!(Arc::ptr_eq(h, &handles[0]));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_append_keeps_both_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = Arc::new(VectorIndexManager::new(tmp.path(), Arc::new(MockEmbedder::new())));

        // 对全新集合的并发首次追加：输掉种子构建竞争的一方不得丢文档
        for round in 0..50 {
            let id = format!("fresh-{}", round);
            let a = {
                let mgr = mgr.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    mgr.append_documents(&id, vec![Document::new("fact from writer a")])
                        .await
                })
            };
            let b = {
                let mgr = mgr.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    mgr.append_documents(&id, vec![Document::new("fact from writer b")])
                        .await
                })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let handle = mgr.get_or_create(&id, None).await.unwrap();
            assert_eq!(handle.len().await, 2, "round {}", round);
        }
    }
}
