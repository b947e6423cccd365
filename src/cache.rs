//! Memo caches for natural-key to surrogate-id lookups
//!
//! One cache object per run, loaded from the store at startup and shared by
//! every concurrent ingestion task. A key is written at most once per value;
//! two tasks racing on the same miss both reach the store, whose
//! conflict-tolerant upsert hands them the same pre-existing id.

use crate::error::Result;
use crate::store::Store;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-wide mapping tables from natural key to surrogate id for the
/// four dimensions consulted before every insert
#[derive(Default)]
pub struct MemoCache {
    classes: RwLock<HashMap<String, i64>>,
    foods: RwLock<HashMap<String, i64>>,
    biospecimens: RwLock<HashMap<String, i64>>,
    food_categories: RwLock<HashMap<String, i64>>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate all four dimensions from the store
    pub async fn load(&self, store: &Store) -> Result<()> {
        self.classes
            .write()
            .await
            .extend(store.load_classes().await?.into_iter().map(swap));
        self.foods
            .write()
            .await
            .extend(store.load_foods().await?.into_iter().map(swap));
        self.biospecimens
            .write()
            .await
            .extend(store.load_biospecimens().await?.into_iter().map(swap));
        self.food_categories
            .write()
            .await
            .extend(store.load_food_categories().await?.into_iter().map(swap));
        Ok(())
    }

    /// Cached food id, if any
    pub async fn food(&self, name: &str) -> Option<i64> {
        self.foods.read().await.get(name).copied()
    }

    pub async fn put_food(&self, name: &str, id: i64) {
        self.foods.write().await.insert(name.to_string(), id);
    }

    /// Cached biospecimen id, if any
    pub async fn biospecimen(&self, name: &str) -> Option<i64> {
        self.biospecimens.read().await.get(name).copied()
    }

    /// Resolve a class name, upserting on a miss
    pub async fn resolve_class(&self, store: &Store, name: &str) -> Result<i64> {
        if let Some(id) = self.classes.read().await.get(name).copied() {
            return Ok(id);
        }
        let id = store.upsert_class(name).await?;
        self.classes.write().await.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolve a biospecimen name, upserting on a miss
    pub async fn resolve_biospecimen(&self, store: &Store, name: &str) -> Result<i64> {
        if let Some(id) = self.biospecimens.read().await.get(name).copied() {
            return Ok(id);
        }
        let id = store.upsert_biospecimen(name).await?;
        self.biospecimens.write().await.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolve a food category name, upserting on a miss
    pub async fn resolve_category(&self, store: &Store, name: &str) -> Result<i64> {
        if let Some(id) = self.food_categories.read().await.get(name).copied() {
            return Ok(id);
        }
        let id = store.upsert_food_category(name).await?;
        self.food_categories
            .write()
            .await
            .insert(name.to_string(), id);
        Ok(id)
    }
}

fn swap((id, name): (i64, String)) -> (String, i64) {
    (name, id)
}
