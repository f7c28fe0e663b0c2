//! Agent memory.
//!
//! Two tiers: short-term items expire after a TTL, long-term items stay
//! until pruned. Consolidation promotes important short-term items;
//! pruning drops old long-term items that never became important.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Memory errors.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory item not found: {0}")]
    NotFound(String),

    #[error("Importance must be within [0, 1], got {0}")]
    InvalidImportance(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
}

/// One remembered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub agent_id: String,
    pub tier: MemoryTier,
    pub content: serde_json::Value,
    /// In [0, 1].
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    /// Short-term lifetime; the store's default is applied when unset.
    pub ttl_secs: Option<u64>,
    pub tags: Vec<String>,
}

impl MemoryItem {
    /// New short-term item.
    pub fn new(agent_id: impl Into<String>, content: serde_json::Value, importance: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            tier: MemoryTier::ShortTerm,
            content,
            importance,
            created_at: now,
            access_count: 0,
            last_access: now,
            ttl_secs: None,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tier(mut self, tier: MemoryTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn has_all_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match (self.tier, self.ttl_secs) {
            // A TTL too large to represent never elapses.
            (MemoryTier::ShortTerm, Some(ttl)) => i64::try_from(ttl)
                .ok()
                .and_then(Duration::try_seconds)
                .is_some_and(|ttl| now - self.created_at >= ttl),
            _ => false,
        }
    }
}

/// Persistence contract for agent memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store an item, returning its id.
    async fn store(&self, item: MemoryItem) -> Result<String, MemoryError>;

    /// Fetch an item and bump its access counters.
    async fn get(&self, agent_id: &str, id: &str) -> Result<MemoryItem, MemoryError>;

    /// Items of `agent_id` carrying every tag in `tags`.
    async fn search(&self, agent_id: &str, tags: &[String]) -> Result<Vec<MemoryItem>, MemoryError>;

    async fn update(&self, item: MemoryItem) -> Result<(), MemoryError>;

    async fn delete(&self, agent_id: &str, id: &str) -> Result<(), MemoryError>;

    /// Promote important short-term items. Returns how many moved.
    async fn consolidate(&self, agent_id: &str) -> Result<usize, MemoryError>;

    /// Drop stale unimportant long-term items. Returns how many went.
    async fn prune(&self, agent_id: &str) -> Result<usize, MemoryError>;
}

/// Memory tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub short_term_ttl_secs: u64,
    pub importance_threshold: f64,
    pub retention_days: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_secs: 86_400,
            importance_threshold: 0.7,
            retention_days: 30,
        }
    }
}

type Key = (String, String);

/// Process-local [`MemoryStore`].
#[derive(Default)]
pub struct InMemoryStore {
    config: MemoryConfig,
    items: RwLock<HashMap<Key, MemoryItem>>,
}

impl InMemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn check_importance(importance: f64) -> Result<(), MemoryError> {
        if (0.0..=1.0).contains(&importance) {
            Ok(())
        } else {
            Err(MemoryError::InvalidImportance(importance))
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(&self, mut item: MemoryItem) -> Result<String, MemoryError> {
        Self::check_importance(item.importance)?;

        let now = Utc::now();
        item.created_at = now;
        item.last_access = now;
        if item.tier == MemoryTier::ShortTerm && item.ttl_secs.is_none() {
            item.ttl_secs = Some(self.config.short_term_ttl_secs);
        }

        let id = item.id.clone();
        self.items
            .write()
            .await
            .insert((item.agent_id.clone(), id.clone()), item);
        Ok(id)
    }

    async fn get(&self, agent_id: &str, id: &str) -> Result<MemoryItem, MemoryError> {
        let mut items = self.items.write().await;
        let key = (agent_id.to_string(), id.to_string());
        let now = Utc::now();

        if items.get(&key).is_some_and(|i| i.is_expired_at(now)) {
            items.remove(&key);
        }

        let item = items
            .get_mut(&key)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        item.access_count += 1;
        item.last_access = now;
        Ok(item.clone())
    }

    async fn search(&self, agent_id: &str, tags: &[String]) -> Result<Vec<MemoryItem>, MemoryError> {
        let now = Utc::now();
        let mut items = self.items.write().await;
        items.retain(|_, i| !i.is_expired_at(now));

        let mut found: Vec<MemoryItem> = items
            .values()
            .filter(|i| i.agent_id == agent_id && i.has_all_tags(tags))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn update(&self, item: MemoryItem) -> Result<(), MemoryError> {
        Self::check_importance(item.importance)?;

        let mut items = self.items.write().await;
        let key = (item.agent_id.clone(), item.id.clone());
        match items.get_mut(&key) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => Err(MemoryError::NotFound(item.id)),
        }
    }

    async fn delete(&self, agent_id: &str, id: &str) -> Result<(), MemoryError> {
        self.items
            .write()
            .await
            .remove(&(agent_id.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))
    }

    async fn consolidate(&self, agent_id: &str) -> Result<usize, MemoryError> {
        let now = Utc::now();
        let threshold = self.config.importance_threshold;
        let mut moved = 0;

        let mut items = self.items.write().await;
        for item in items.values_mut() {
            if item.agent_id == agent_id
                && item.tier == MemoryTier::ShortTerm
                && !item.is_expired_at(now)
                && item.importance >= threshold
            {
                item.tier = MemoryTier::LongTerm;
                item.ttl_secs = None;
                moved += 1;
            }
        }

        debug!(agent = %agent_id, moved, "Consolidated memory");
        Ok(moved)
    }

    async fn prune(&self, agent_id: &str) -> Result<usize, MemoryError> {
        let Some(cutoff) = Duration::try_days(self.config.retention_days)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            debug!(agent = %agent_id, "Retention window out of range, nothing to prune");
            return Ok(0);
        };
        let threshold = self.config.importance_threshold;

        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, i| {
            !(i.agent_id == agent_id
                && i.tier == MemoryTier::LongTerm
                && i.created_at < cutoff
                && i.importance < threshold)
        });

        let pruned = before - items.len();
        debug!(agent = %agent_id, pruned, "Pruned memory");
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_store_and_get_counts_access() {
        let store = InMemoryStore::default();
        let id = store
            .store(MemoryItem::new("a1", json!({ "note": "hi" }), 0.5))
            .await
            .unwrap();

        let first = store.get("a1", &id).await.unwrap();
        assert_eq!(first.access_count, 1);
        assert_eq!(first.ttl_secs, Some(86_400));
        assert_eq!(store.get("a1", &id).await.unwrap().access_count, 2);

        assert!(matches!(
            store.get("a2", &id).await,
            Err(MemoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_requires_all_tags() {
        let store = InMemoryStore::default();
        store
            .store(MemoryItem::new("a1", json!(1), 0.5).with_tags(["task", "quiz", "complete"]))
            .await
            .unwrap();
        store
            .store(MemoryItem::new("a1", json!(2), 0.5).with_tags(["task", "quiz", "failed"]))
            .await
            .unwrap();
        store
            .store(MemoryItem::new("a2", json!(3), 0.5).with_tags(["task", "quiz", "failed"]))
            .await
            .unwrap();

        assert_eq!(store.search("a1", &tags(&["task", "quiz"])).await.unwrap().len(), 2);
        let failed = store.search("a1", &tags(&["quiz", "failed"])).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].content, json!(2));
    }

    #[tokio::test]
    async fn test_expired_short_term_is_invisible() {
        let store = InMemoryStore::default();
        let mut item = MemoryItem::new("a1", json!("old"), 0.9).with_tags(["x"]);
        item.ttl_secs = Some(0);
        let id = store.store(item).await.unwrap();

        assert!(store.get("a1", &id).await.is_err());
        assert!(store.search("a1", &tags(&["x"])).await.unwrap().is_empty());
        assert_eq!(store.consolidate("a1").await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_consolidate_promotes_important_items() {
        let store = InMemoryStore::default();
        let important = store.store(MemoryItem::new("a1", json!(1), 0.8)).await.unwrap();
        let trivial = store.store(MemoryItem::new("a1", json!(2), 0.2)).await.unwrap();

        assert_eq!(store.consolidate("a1").await.unwrap(), 1);
        let promoted = store.get("a1", &important).await.unwrap();
        assert_eq!(promoted.tier, MemoryTier::LongTerm);
        assert_eq!(promoted.ttl_secs, None);
        assert_eq!(store.get("a1", &trivial).await.unwrap().tier, MemoryTier::ShortTerm);
    }

    #[tokio::test]
    async fn test_prune_drops_old_unimportant_long_term() {
        let store = InMemoryStore::default();
        let old = store
            .store(MemoryItem::new("a1", json!("old"), 0.3).with_tier(MemoryTier::LongTerm))
            .await
            .unwrap();
        let kept = store
            .store(MemoryItem::new("a1", json!("kept"), 0.9).with_tier(MemoryTier::LongTerm))
            .await
            .unwrap();
        let fresh = store
            .store(MemoryItem::new("a1", json!("fresh"), 0.3).with_tier(MemoryTier::LongTerm))
            .await
            .unwrap();

        // Backdate two of them past the retention window.
        for id in [&old, &kept] {
            let mut item = store.get("a1", id).await.unwrap();
            item.created_at = Utc::now() - Duration::days(31);
            store.update(item).await.unwrap();
        }

        assert_eq!(store.prune("a1").await.unwrap(), 1);
        assert!(store.get("a1", &old).await.is_err());
        assert!(store.get("a1", &kept).await.is_ok());
        assert!(store.get("a1", &fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_huge_windows_do_not_panic() {
        let store = InMemoryStore::new(MemoryConfig {
            retention_days: i64::MAX,
            ..MemoryConfig::default()
        });
        let mut item = MemoryItem::new("a1", json!("forever"), 0.1).with_tags(["x"]);
        item.ttl_secs = Some(u64::MAX);
        let id = store.store(item).await.unwrap();

        assert!(store.get("a1", &id).await.is_ok());
        assert_eq!(store.prune("a1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_importance_rejected() {
        let store = InMemoryStore::default();
        assert!(matches!(
            store.store(MemoryItem::new("a1", json!(null), 1.5)).await,
            Err(MemoryError::InvalidImportance(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::default();
        let id = store.store(MemoryItem::new("a1", json!(1), 0.5)).await.unwrap();
        store.delete("a1", &id).await.unwrap();
        assert!(store.delete("a1", &id).await.is_err());
    }
}
