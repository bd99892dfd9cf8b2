//! Thread retention
//!
//! Threads grow without bound unless a policy prunes them. Policies only
//! select; deletion goes through the store so locking stays in one place.

use super::models::ThreadSummary;
use super::store::ConversationStore;
use crate::error::{ChatError, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

pub trait RetentionPolicy: Send + Sync {
    /// Continuation ids that should be deleted
    fn select_expired(&self, summaries: &[ThreadSummary], now: DateTime<Utc>) -> Vec<String>;
}

/// Never prune
pub struct KeepAll;

impl RetentionPolicy for KeepAll {
    fn select_expired(&self, _summaries: &[ThreadSummary], _now: DateTime<Utc>) -> Vec<String> {
        Vec::new()
    }
}

/// Prune threads not updated within `max_age`
pub struct MaxAge {
    pub max_age: Duration,
}

impl RetentionPolicy for MaxAge {
    fn select_expired(&self, summaries: &[ThreadSummary], now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - self.max_age;
        summaries
            .iter()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.continuation_id.clone())
            .collect()
    }
}

/// Keep only the `max_threads` most recently updated threads
pub struct MaxCount {
    pub max_threads: usize,
}

impl RetentionPolicy for MaxCount {
    fn select_expired(&self, summaries: &[ThreadSummary], _now: DateTime<Utc>) -> Vec<String> {
        let mut ordered: Vec<&ThreadSummary> = summaries.iter().collect();
        ordered.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        ordered
            .into_iter()
            .skip(self.max_threads)
            .map(|s| s.continuation_id.clone())
            .collect()
    }
}

/// Apply every policy in order; a thread expired by any policy is pruned
pub struct Combined(pub Vec<Box<dyn RetentionPolicy>>);

impl RetentionPolicy for Combined {
    fn select_expired(&self, summaries: &[ThreadSummary], now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = Vec::new();
        for policy in &self.0 {
            for id in policy.select_expired(summaries, now) {
                if !expired.contains(&id) {
                    expired.push(id);
                }
            }
        }
        expired
    }
}

/// Delete expired threads, returning how many were removed
pub async fn prune_threads(
    store: &dyn ConversationStore,
    policy: &dyn RetentionPolicy,
) -> Result<usize> {
    let summaries = store.list_thread_summaries(usize::MAX).await?;
    let expired = policy.select_expired(&summaries, Utc::now());

    let mut removed = 0;
    for id in expired {
        match store.delete_thread(&id).await {
            Ok(()) => removed += 1,
            Err(ChatError::NotFound(_)) => {}
            Err(e) => warn!("Retention could not delete {}: {}", id, e),
        }
    }

    if removed > 0 {
        info!("Retention pruned {} conversations", removed);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::InMemoryConversationStore;

    fn summary(id: &str, age_days: i64, now: DateTime<Utc>) -> ThreadSummary {
        let ts = now - Duration::days(age_days);
        ThreadSummary {
            continuation_id: id.to_string(),
            title: None,
            created_at: ts,
            updated_at: ts,
            turn_count: 0,
            last_model: None,
        }
    }

    #[test]
    fn test_max_age() {
        let now = Utc::now();
        let summaries = vec![summary("fresh", 1, now), summary("stale", 40, now)];
        let policy = MaxAge {
            max_age: Duration::days(30),
        };
        assert_eq!(policy.select_expired(&summaries, now), vec!["stale".to_string()]);
    }

    #[test]
    fn test_max_count_keeps_newest() {
        let now = Utc::now();
        let summaries = vec![
            summary("old", 10, now),
            summary("new", 0, now),
            summary("mid", 5, now),
        ];
        let policy = MaxCount { max_threads: 2 };
        assert_eq!(policy.select_expired(&summaries, now), vec!["old".to_string()]);
    }

    #[test]
    fn test_combined_deduplicates() {
        let now = Utc::now();
        let summaries = vec![summary("a", 100, now), summary("b", 0, now)];
        let policy = Combined(vec![
            Box::new(MaxAge {
                max_age: Duration::days(1),
            }),
            Box::new(MaxCount { max_threads: 1 }),
            Box::new(KeepAll),
        ]);
        assert_eq!(policy.select_expired(&summaries, now), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_prune_threads() {
        let store = InMemoryConversationStore::new();
        let first = store.create_thread(None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_thread(None).await.unwrap();

        let removed = prune_threads(&store, &MaxCount { max_threads: 1 }).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_recent_threads(10).await.unwrap(), vec![second]);
        assert!(store.load_thread(&first).await.is_err());
    }
}
