//! Conversation persistence
//!
//! One durable record per thread, addressed by continuation id. Every write
//! replaces the whole record atomically (temp file + fsync + rename), so a
//! reader sees either the previous or the next turn sequence, never a
//! half-written one. Appends to the same thread are serialized by a
//! per-thread async lock; different threads do not contend.

use super::models::{Thread, ThreadSummary, Turn};
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Durable storage of conversation threads
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty thread and return its continuation id
    async fn create_thread(&self, title: Option<String>) -> Result<String> {
        self.create_thread_with_turns(title, Vec::new()).await
    }

    /// Create a thread already holding `turns` in one atomic write
    async fn create_thread_with_turns(&self, title: Option<String>, turns: Vec<Turn>) -> Result<String>;

    /// Append one turn atomically
    async fn append_turn(&self, continuation_id: &str, turn: Turn) -> Result<()> {
        self.append_turns(continuation_id, vec![turn]).await
    }

    /// Append several turns as one atomic unit
    async fn append_turns(&self, continuation_id: &str, turns: Vec<Turn>) -> Result<()>;

    /// Load a thread; `NotFound` if absent, `CorruptState` if unreadable
    async fn load_thread(&self, continuation_id: &str) -> Result<Thread>;

    /// Summaries ordered most-recently-updated first
    async fn list_thread_summaries(&self, limit: usize) -> Result<Vec<ThreadSummary>>;

    /// Continuation ids ordered most-recently-updated first
    async fn list_recent_threads(&self, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .list_thread_summaries(limit)
            .await?
            .into_iter()
            .map(|s| s.continuation_id)
            .collect())
    }

    async fn delete_thread(&self, continuation_id: &str) -> Result<()>;
}

fn sort_recent(summaries: &mut Vec<ThreadSummary>, limit: usize) {
    summaries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.continuation_id.cmp(&b.continuation_id))
    });
    summaries.truncate(limit);
}

fn new_continuation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Per-thread write locks
#[derive(Default)]
struct ThreadLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ThreadLocks {
    async fn acquire(&self, continuation_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(continuation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    fn forget(&self, continuation_id: &str) {
        self.locks.remove(continuation_id);
    }
}

/// File-backed store: `<base_dir>/<continuation_id>.json`
pub struct FileConversationStore {
    base_dir: PathBuf,
    cache: Cache<String, Arc<Thread>>,
    locks: ThreadLocks,
}

impl FileConversationStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new(base_dir: impl Into<PathBuf>, cache_capacity: u64) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            ChatError::Configuration(format!(
                "failed to create conversations directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        info!("Conversation storage initialized at: {}", base_dir.display());

        Ok(Self {
            base_dir,
            cache: Cache::new(cache_capacity),
            locks: ThreadLocks::default(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn thread_path(&self, continuation_id: &str) -> Result<PathBuf> {
        validate_continuation_id(continuation_id)?;
        Ok(self.base_dir.join(format!("{}.json", continuation_id)))
    }

    async fn read_thread(&self, continuation_id: &str) -> Result<Arc<Thread>> {
        if let Some(thread) = self.cache.get(continuation_id).await {
            return Ok(thread);
        }

        let path = self.thread_path(continuation_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Conversation {} not found", continuation_id);
                return Err(ChatError::NotFound(continuation_id.to_string()));
            }
            Err(e) => return Err(ChatError::corrupt(continuation_id, e.to_string())),
        };

        let thread: Thread = serde_json::from_str(&content)
            .map_err(|e| ChatError::corrupt(continuation_id, e.to_string()))?;
        if thread.continuation_id != continuation_id {
            return Err(ChatError::corrupt(
                continuation_id,
                format!("record carries id {}", thread.continuation_id),
            ));
        }

        debug!(
            "Loaded conversation {} from disk with {} turns",
            continuation_id,
            thread.turns.len()
        );

        let thread = Arc::new(thread);
        self.cache
            .insert(continuation_id.to_string(), thread.clone())
            .await;
        Ok(thread)
    }

    /// Replace the record atomically
    async fn write_thread(&self, thread: &Thread) -> std::result::Result<(), String> {
        let path = self
            .thread_path(&thread.continuation_id)
            .map_err(|e| e.to_string())?;
        let content = serde_json::to_string_pretty(thread).map_err(|e| e.to_string())?;

        let tmp_path = self.base_dir.join(format!(
            ".{}.{}.tmp",
            thread.continuation_id,
            uuid::Uuid::new_v4().simple()
        ));

        let write_result = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create_thread_with_turns(&self, title: Option<String>, turns: Vec<Turn>) -> Result<String> {
        let mut continuation_id = new_continuation_id();
        while self.thread_path(&continuation_id)?.exists() {
            continuation_id = new_continuation_id();
        }

        let _guard = self.locks.acquire(&continuation_id).await;
        let mut thread = Thread::new(continuation_id.clone(), title);
        thread.push_turns(&turns);
        self.write_thread(&thread)
            .await
            .map_err(|e| ChatError::write_failed(&continuation_id, e))?;
        self.cache
            .insert(continuation_id.clone(), Arc::new(thread))
            .await;

        debug!(
            "Created conversation {} with {} turns",
            continuation_id,
            turns.len()
        );
        Ok(continuation_id)
    }

    async fn append_turns(&self, continuation_id: &str, turns: Vec<Turn>) -> Result<()> {
        let _guard = self.locks.acquire(continuation_id).await;

        let current = self.read_thread(continuation_id).await?;
        let mut thread = (*current).clone();
        thread.push_turns(&turns);

        self.write_thread(&thread)
            .await
            .map_err(|e| ChatError::write_failed(continuation_id, e))?;

        debug!(
            "Saved conversation {} with {} turns",
            continuation_id,
            thread.turns.len()
        );
        self.cache
            .insert(continuation_id.to_string(), Arc::new(thread))
            .await;
        Ok(())
    }

    async fn load_thread(&self, continuation_id: &str) -> Result<Thread> {
        let thread = self.read_thread(continuation_id).await?;
        Ok((*thread).clone())
    }

    async fn list_thread_summaries(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let mut entries = tokio::fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| ChatError::corrupt("<index>", e.to_string()))?;

        let mut candidates: Vec<(String, SystemTime)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ChatError::corrupt("<index>", e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((id.to_string(), modified));
        }

        // Every write rewrites the file, so mtime ranks records without parsing
        // them. Read newest first and stop once `limit` records are in hand,
        // plus any that share the cutoff mtime.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        let mut summaries = Vec::new();
        let mut cutoff: Option<SystemTime> = None;
        for (id, modified) in candidates {
            if cutoff.is_some_and(|cutoff| modified < cutoff) {
                break;
            }
            match self.read_thread(&id).await {
                Ok(thread) => {
                    summaries.push(thread.summary());
                    if summaries.len() >= limit && cutoff.is_none() {
                        cutoff = Some(modified);
                    }
                }
                Err(e) => warn!("Skipping unreadable conversation {}: {}", id, e),
            }
        }

        sort_recent(&mut summaries, limit);
        Ok(summaries)
    }

    async fn delete_thread(&self, continuation_id: &str) -> Result<()> {
        let guard = self.locks.acquire(continuation_id).await;
        let path = self.thread_path(continuation_id)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatError::NotFound(continuation_id.to_string()));
            }
            Err(e) => return Err(ChatError::write_failed(continuation_id, e.to_string())),
        }

        self.cache.invalidate(continuation_id).await;
        drop(guard);
        self.locks.forget(continuation_id);
        info!("Deleted conversation {}", continuation_id);
        Ok(())
    }
}

/// Reject ids that cannot name a file inside the store directory.
fn validate_continuation_id(continuation_id: &str) -> Result<()> {
    let invalid = continuation_id.is_empty()
        || continuation_id.starts_with('.')
        || continuation_id.contains('/')
        || continuation_id.contains('\\')
        || continuation_id.contains("..")
        || continuation_id.chars().any(|c| c.is_control());
    if invalid {
        return Err(ChatError::NotFound(continuation_id.to_string()));
    }
    Ok(())
}

/// Process-local store for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: RwLock<HashMap<String, Thread>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_thread_with_turns(&self, title: Option<String>, turns: Vec<Turn>) -> Result<String> {
        let mut threads = self.threads.write().await;
        let mut continuation_id = new_continuation_id();
        while threads.contains_key(&continuation_id) {
            continuation_id = new_continuation_id();
        }
        let mut thread = Thread::new(continuation_id.clone(), title);
        thread.push_turns(&turns);
        threads.insert(continuation_id.clone(), thread);
        Ok(continuation_id)
    }

    async fn append_turns(&self, continuation_id: &str, turns: Vec<Turn>) -> Result<()> {
        let mut threads = self.threads.write().await;
        let thread = threads
            .get_mut(continuation_id)
            .ok_or_else(|| ChatError::NotFound(continuation_id.to_string()))?;
        thread.push_turns(&turns);
        Ok(())
    }

    async fn load_thread(&self, continuation_id: &str) -> Result<Thread> {
        self.threads
            .read()
            .await
            .get(continuation_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(continuation_id.to_string()))
    }

    async fn list_thread_summaries(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let mut summaries: Vec<ThreadSummary> =
            self.threads.read().await.values().map(Thread::summary).collect();
        sort_recent(&mut summaries, limit);
        Ok(summaries)
    }

    async fn delete_thread(&self, continuation_id: &str) -> Result<()> {
        self.threads
            .write()
            .await
            .remove(continuation_id)
            .map(|_| ())
            .ok_or_else(|| ChatError::NotFound(continuation_id.to_string()))
    }
}
