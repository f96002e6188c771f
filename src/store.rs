//! Entity persistence.
//!
//! [`EntityStore`] is the storage boundary the orchestrator talks to.
//! Two implementations ship: [`InMemoryEntityStore`] for tests and
//! embedding, and [`JsonFileEntityStore`], which keeps a whole-file JSON
//! snapshot that several processes can share.

use crate::entity::{EntityId, EntityPatch, MonitoredEntity, NewEntity};
use crate::error::{MonitorError, Result};
use crate::policy::MIN_INTERVAL_DAYS;
use crate::state_lock::{LOCK_TIMEOUT, StateLock, write_replace};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Storage for monitored entities.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load one entity.
    async fn get(&self, id: &EntityId) -> Result<Option<MonitoredEntity>>;

    /// Create an entity with the default interval. Returns its new id.
    async fn insert(&self, fields: NewEntity) -> Result<EntityId>;

    /// Apply a partial update.
    ///
    /// Returns [`MonitorError::EntityNotFound`] when `id` does not exist.
    async fn patch(&self, id: &EntityId, patch: EntityPatch) -> Result<()>;

    /// Secondary lookup by platform key.
    async fn find_by_external_key(&self, key: &str) -> Result<Option<MonitoredEntity>>;

    /// All entities, ordered by id.
    async fn list(&self) -> Result<Vec<MonitoredEntity>>;

    /// Delete an entity. Returns `true` when it existed.
    async fn remove(&self, id: &EntityId) -> Result<bool>;
}

fn build_entity(fields: NewEntity) -> MonitoredEntity {
    MonitoredEntity {
        id: EntityId::generate(),
        external_key: fields.external_key,
        title: fields.title,
        page_url: fields.page_url,
        source_url: fields.source_url,
        decorated_key: fields.decorated_key,
        last_content_hash: fields.initial_hash,
        check_interval_days: MIN_INTERVAL_DAYS,
        last_checked_at: None,
        last_error: None,
        scheduled_task_id: None,
        created_at: Utc::now(),
    }
}

type EntityMap = BTreeMap<EntityId, MonitoredEntity>;

fn find_external(map: &EntityMap, key: &str) -> Option<MonitoredEntity> {
    map.values().find(|e| e.external_key == key).cloned()
}

/// Volatile store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: Mutex<EntityMap>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed record as-is (fixtures, imports).
    pub async fn put(&self, entity: MonitoredEntity) {
        self.entities.lock().await.insert(entity.id.clone(), entity);
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get(&self, id: &EntityId) -> Result<Option<MonitoredEntity>> {
        Ok(self.entities.lock().await.get(id).cloned())
    }

    async fn insert(&self, fields: NewEntity) -> Result<EntityId> {
        let entity = build_entity(fields);
        let id = entity.id.clone();
        self.entities.lock().await.insert(id.clone(), entity);
        Ok(id)
    }

    async fn patch(&self, id: &EntityId, patch: EntityPatch) -> Result<()> {
        let mut entities = self.entities.lock().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| MonitorError::EntityNotFound(id.to_string()))?;
        entity.apply(patch);
        Ok(())
    }

    async fn find_by_external_key(&self, key: &str) -> Result<Option<MonitoredEntity>> {
        Ok(find_external(&*self.entities.lock().await, key))
    }

    async fn list(&self) -> Result<Vec<MonitoredEntity>> {
        Ok(self.entities.lock().await.values().cloned().collect())
    }

    async fn remove(&self, id: &EntityId) -> Result<bool> {
        Ok(self.entities.lock().await.remove(id).is_some())
    }
}

/// Persisted store snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    /// Schema version.
    #[serde(default = "default_state_version")]
    version: u8,
    /// All entities.
    #[serde(default)]
    entities: Vec<MonitoredEntity>,
}

fn default_state_version() -> u8 {
    1
}

/// Durable store backed by a single JSON file.
///
/// The file is the only copy of the data. Reads parse it fresh, and every
/// mutation takes the cross-process [`StateLock`], re-reads the file,
/// applies the change to that copy and replaces the file. Other processes
/// sharing the path therefore never lose each other's writes, and a
/// failed write leaves the file as it was.
#[derive(Debug)]
pub struct JsonFileEntityStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl JsonFileEntityStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Persistence`] if an existing file cannot be
    /// read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let count = load_state(&path).await?.len();
        debug!(path = %path.display(), count, "opened entity store");
        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to the current file contents and persist the result.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut EntityMap) -> Result<T> + Send,
    {
        let _writer = self.writer.lock().await;
        let _lock = StateLock::acquire_async(&self.path, LOCK_TIMEOUT)
            .await
            .map_err(MonitorError::Persistence)?;
        let mut staged = load_state(&self.path).await?;
        let out = change(&mut staged)?;
        save_state(&self.path, &staged).await?;
        Ok(out)
    }
}

#[async_trait]
impl EntityStore for JsonFileEntityStore {
    async fn get(&self, id: &EntityId) -> Result<Option<MonitoredEntity>> {
        Ok(load_state(&self.path).await?.remove(id))
    }

    async fn insert(&self, fields: NewEntity) -> Result<EntityId> {
        let entity = build_entity(fields);
        self.mutate(move |map| {
            let id = entity.id.clone();
            map.insert(id.clone(), entity);
            Ok(id)
        })
        .await
    }

    async fn patch(&self, id: &EntityId, patch: EntityPatch) -> Result<()> {
        self.mutate(|map| {
            map.get_mut(id)
                .ok_or_else(|| MonitorError::EntityNotFound(id.to_string()))?
                .apply(patch);
            Ok(())
        })
        .await
    }

    async fn find_by_external_key(&self, key: &str) -> Result<Option<MonitoredEntity>> {
        Ok(find_external(&load_state(&self.path).await?, key))
    }

    async fn list(&self) -> Result<Vec<MonitoredEntity>> {
        Ok(load_state(&self.path).await?.into_values().collect())
    }

    async fn remove(&self, id: &EntityId) -> Result<bool> {
        if !load_state(&self.path).await?.contains_key(id) {
            return Ok(false);
        }
        self.mutate(|map| Ok(map.remove(id).is_some())).await
    }
}

async fn load_state(path: &Path) -> Result<EntityMap> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EntityMap::new()),
        Err(e) => {
            return Err(MonitorError::Persistence(format!(
                "cannot read entity store {}: {e}",
                path.display()
            )));
        }
    };

    let state: StoreState = serde_json::from_slice(&bytes).map_err(|e| {
        MonitorError::Persistence(format!(
            "cannot parse entity store {}: {e}",
            path.display()
        ))
    })?;
    Ok(state
        .entities
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect())
}

async fn save_state(path: &Path, entities: &EntityMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            MonitorError::Persistence(format!("cannot create store dir: {e}"))
        })?;
    }

    let state = StoreState {
        version: default_state_version(),
        entities: entities.values().cloned().collect(),
    };
    let json = serde_json::to_vec_pretty(&state)
        .map_err(|e| MonitorError::Persistence(format!("cannot serialize store: {e}")))?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_replace(&path, &json))
        .await
        .map_err(|e| MonitorError::Persistence(format!("store write task failed: {e}")))?
        .map_err(|e| MonitorError::Persistence(format!("cannot write store: {e}")))
}
