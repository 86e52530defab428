//! Vocabulary cache
//!
//! Provides:
//! - The `VocabularySource` trait consumed by the entity normalizer
//! - Per-category name lists loaded lazily from the graph store
//! - Optional TTL, explicit refresh and invalidation

use crate::errors::Result;
use crate::graph::GraphStore;
use crate::metrics::record_cache;
use crate::qa::EntityCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const CACHE_NAME: &str = "vocabulary";

/// Source of the controlled vocabulary for each entity category
#[async_trait]
pub trait VocabularySource: Send + Sync {
    /// Every known name for `category`
    async fn vocabulary(&self, category: EntityCategory) -> Result<Arc<[String]>>;
}

struct CachedVocabulary {
    names: Arc<[String]>,
    refreshed_at: DateTime<Utc>,
    loaded: Instant,
}

impl CachedVocabulary {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        ttl.map_or(true, |ttl| self.loaded.elapsed() < ttl)
    }

    fn info(&self, category: EntityCategory) -> VocabularyInfo {
        VocabularyInfo {
            category,
            count: self.names.len(),
            refreshed_at: self.refreshed_at,
        }
    }
}

/// Summary of one cached category
#[derive(Debug, Clone, Serialize)]
pub struct VocabularyInfo {
    pub category: EntityCategory,
    pub count: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// Graph-backed vocabulary cache shared by all requests.
///
/// Each category has its own slot, so a slow load of one category never
/// blocks readers of another.
pub struct VocabularyCache {
    store: Arc<dyn GraphStore>,
    ttl: Option<Duration>,
    disease: Slot,
    combo: Slot,
    point: Slot,
}

type Slot = RwLock<Option<CachedVocabulary>>;

impl VocabularyCache {
    /// Create an empty cache. `ttl = None` keeps entries until invalidated.
    pub fn new(store: Arc<dyn GraphStore>, ttl: Option<Duration>) -> Self {
        Self {
            store,
            ttl,
            disease: RwLock::new(None),
            combo: RwLock::new(None),
            point: RwLock::new(None),
        }
    }

    fn slot(&self, category: EntityCategory) -> &Slot {
        match category {
            EntityCategory::Disease => &self.disease,
            EntityCategory::Combo => &self.combo,
            EntityCategory::Point => &self.point,
        }
    }

    /// Get the names for a category, loading them on miss or expiry
    pub async fn get(&self, category: EntityCategory) -> Result<Arc<[String]>> {
        let slot = self.slot(category);
        {
            let entry = slot.read().await;
            if let Some(entry) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
                record_cache(true, CACHE_NAME);
                return Ok(entry.names.clone());
            }
        }

        let mut entry = slot.write().await;
        // Another request may have loaded it while we waited for the lock
        if let Some(loaded) = entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
            record_cache(true, CACHE_NAME);
            return Ok(loaded.names.clone());
        }

        record_cache(false, CACHE_NAME);
        let loaded = self.load(category).await?;
        let names = loaded.names.clone();
        *entry = Some(loaded);
        Ok(names)
    }

    /// Reload one category regardless of freshness
    pub async fn refresh(&self, category: EntityCategory) -> Result<VocabularyInfo> {
        let loaded = self.load(category).await?;
        let info = loaded.info(category);
        *self.slot(category).write().await = Some(loaded);
        Ok(info)
    }

    /// Reload every category
    pub async fn refresh_all(&self) -> Result<Vec<VocabularyInfo>> {
        let mut infos = Vec::with_capacity(EntityCategory::ALL.len());
        for category in EntityCategory::ALL {
            infos.push(self.refresh(category).await?);
        }
        Ok(infos)
    }

    /// Drop every cached category; the next `get` reloads
    pub async fn invalidate(&self) {
        for category in EntityCategory::ALL {
            *self.slot(category).write().await = None;
        }
        info!("Vocabulary cache invalidated");
    }

    /// Categories currently cached, in category order
    pub async fn snapshot_info(&self) -> Vec<VocabularyInfo> {
        let mut infos = Vec::new();
        for category in EntityCategory::ALL {
            if let Some(entry) = self.slot(category).read().await.as_ref() {
                infos.push(entry.info(category));
            }
        }
        infos
    }

    async fn load(&self, category: EntityCategory) -> Result<CachedVocabulary> {
        let records = self
            .store
            .run(category.vocabulary_query(), &Default::default())
            .await?;

        let names: Arc<[String]> = records
            .iter()
            .filter_map(|record| record.get("name").and_then(|v| v.as_str()))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        debug!(%category, count = names.len(), "Vocabulary loaded");

        Ok(CachedVocabulary {
            names,
            refreshed_at: Utc::now(),
            loaded: Instant::now(),
        })
    }
}

#[async_trait]
impl VocabularySource for VocabularyCache {
    async fn vocabulary(&self, category: EntityCategory) -> Result<Arc<[String]>> {
        self.get(category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphRecord, QueryParams};
    use crate::testing::FakeGraphStore;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    fn store() -> Arc<FakeGraphStore> {
        Arc::new(
            FakeGraphStore::new()
                .with_vocabulary(EntityCategory::Combo, ["颞三针", "智三针"])
                .with_vocabulary(EntityCategory::Disease, ["失眠"]),
        )
    }

    #[tokio::test]
    async fn test_loads_once_without_ttl() {
        let store = store();
        let cache = VocabularyCache::new(store.clone(), None);

        let first = assert_ok!(cache.get(EntityCategory::Combo).await);
        let second = assert_ok!(cache.get(EntityCategory::Combo).await);

        assert_eq!(&*first, &["颞三针".to_string(), "智三针".to_string()]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_reload() {
        let store = store();
        let cache = VocabularyCache::new(store.clone(), Some(Duration::ZERO));

        cache.get(EntityCategory::Disease).await.unwrap();
        cache.get(EntityCategory::Disease).await.unwrap();

        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_and_refresh() {
        let store = store();
        let cache = VocabularyCache::new(store.clone(), None);

        cache.get(EntityCategory::Combo).await.unwrap();
        cache.invalidate().await;
        assert!(cache.snapshot_info().await.is_empty());

        let infos = cache.refresh_all().await.unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].category, EntityCategory::Disease);
        assert_eq!(infos[0].count, 1);
        assert_eq!(infos[1].count, 2);
        assert_eq!(infos[2].count, 0);

        let snapshot = cache.snapshot_info().await;
        assert_eq!(snapshot.len(), 3);
        // 1 get + 3 refreshes
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test]
    async fn test_load_failure_is_not_cached() {
        let store = Arc::new(FakeGraphStore::new().failing());
        let cache = VocabularyCache::new(store.clone(), None);

        assert_err!(cache.get(EntityCategory::Point).await);
        assert!(cache.snapshot_info().await.is_empty());
        assert_err!(cache.get(EntityCategory::Point).await);
        assert_eq!(store.call_count(), 2);
    }

    /// Holds combo vocabulary loads until released
    struct GatedComboStore {
        inner: FakeGraphStore,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl GraphStore for GatedComboStore {
        async fn run(&self, query: &str, params: &QueryParams) -> Result<Vec<GraphRecord>> {
            if query == EntityCategory::Combo.vocabulary_query() {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.inner.run(query, params).await
        }
    }

    #[tokio::test]
    async fn test_cached_category_readable_while_another_loads() {
        let store = Arc::new(GatedComboStore {
            inner: FakeGraphStore::new()
                .with_vocabulary(EntityCategory::Combo, ["颞三针"])
                .with_vocabulary(EntityCategory::Disease, ["失眠"]),
            started: Notify::new(),
            release: Notify::new(),
        });
        let cache = Arc::new(VocabularyCache::new(store.clone(), None));
        assert_ok!(cache.get(EntityCategory::Disease).await);

        let loading = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get(EntityCategory::Combo).await }
        });
        store.started.notified().await;

        let diseases = tokio::time::timeout(Duration::from_millis(200), cache.get(EntityCategory::Disease))
            .await
            .expect("cached category blocked by a pending load");
        assert_eq!(&*diseases.unwrap(), &["失眠".to_string()]);

        store.release.notify_one();
        let combos = loading.await.unwrap().unwrap();
        assert_eq!(&*combos, &["颞三针".to_string()]);
    }
}
