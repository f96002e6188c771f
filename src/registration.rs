//! Adding new videos to the monitor.

use crate::decorator::DECORATED_CONTENT_TYPE;
use crate::detector::CheckOutcome;
use crate::entity::{EntityPatch, MonitoredEntity, NewEntity};
use crate::error::{MonitorError, Result};
use crate::object_store::allocate_key;
use crate::orchestrator::Monitor;
use crate::policy::days_after;
use crate::scheduler::Job;
use crate::source::{MetadataLookup, SourceConfig, extract_video_id, markdown_snippet};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Default delay before the first monitoring cycle.
pub const DEFAULT_INITIAL_DELAY_DAYS: u32 = 1;

/// Result of [`Registrar::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The entity, as stored after registration.
    pub entity: MonitoredEntity,
    /// `false` when the video was already monitored.
    pub created: bool,
    /// Public URL of the decorated thumbnail.
    pub decorated_url: Option<String>,
    /// Markdown snippet linking the decorated thumbnail to the video.
    pub markdown: String,
}

/// Turns a video URL into a monitored entity with its first cycle armed.
pub struct Registrar {
    monitor: Arc<Monitor>,
    lookup: Arc<dyn MetadataLookup>,
    sources: SourceConfig,
    initial_delay_days: u32,
    /// Serialises registrations of the same video id.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Registrar {
    /// Create a registrar sharing the monitor's collaborators.
    pub fn new(monitor: Arc<Monitor>, lookup: Arc<dyn MetadataLookup>) -> Self {
        Self {
            monitor,
            lookup,
            sources: SourceConfig::default(),
            initial_delay_days: DEFAULT_INITIAL_DELAY_DAYS,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override where page and thumbnail URLs point.
    pub fn with_sources(mut self, sources: SourceConfig) -> Self {
        self.sources = sources;
        self
    }

    /// Override the delay before the first cycle.
    pub fn with_initial_delay_days(mut self, days: u32) -> Self {
        self.initial_delay_days = days;
        self
    }

    /// Register `url` now.
    pub async fn register(&self, url: &str) -> Result<Registration> {
        self.register_at(url, Utc::now()).await
    }

    /// Register `url` as of `now`.
    ///
    /// An already monitored video is returned as-is without a new task.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::InvalidSource`] for an unrecognised URL
    /// - [`MonitorError::Fetch`] if the title or thumbnail cannot be fetched
    /// - [`MonitorError::Decode`] / [`MonitorError::Encode`] if decoration fails
    /// - [`MonitorError::Schedule`] if the first cycle cannot be armed; the
    ///   entity stays stored without a pending task
    /// - [`MonitorError::Persistence`] if the task id cannot be recorded; the
    ///   armed task is cancelled again
    pub async fn register_at(&self, url: &str, now: DateTime<Utc>) -> Result<Registration> {
        let video_id = extract_video_id(url)
            .ok_or_else(|| MonitorError::InvalidSource(format!("not a video URL: {url}")))?;

        let fire_at = days_after(now, self.initial_delay_days)?;

        let lock = self.key_lock(&video_id).await;
        let _guard = lock.lock().await;

        let store = self.monitor.store();
        if let Some(existing) = store.find_by_external_key(&video_id).await? {
            info!(entity_id = %existing.id, video_id = %video_id, "video already monitored");
            return Ok(self.describe(existing, false));
        }

        let title = self.lookup.title(&video_id).await?;
        let page_url = self.sources.page_url(&video_id);
        let source_url = self.sources.thumbnail_url(&video_id);

        let (hash, bytes) = match self.monitor.detector.check(&source_url, "").await {
            CheckOutcome::Changed { hash, bytes } | CheckOutcome::Unchanged { hash, bytes } => {
                (hash, bytes)
            }
            CheckOutcome::Error(reason) => return Err(MonitorError::Fetch(reason)),
        };

        let decorated = self.monitor.decorator.decorate(&bytes)?;
        let key = allocate_key();
        self.monitor
            .objects()
            .put(&key, Bytes::from(decorated), DECORATED_CONTENT_TYPE)
            .await?;

        let id = store
            .insert(NewEntity {
                external_key: video_id.clone(),
                title,
                page_url,
                source_url,
                decorated_key: Some(key),
                initial_hash: Some(hash),
            })
            .await?;
        info!(entity_id = %id, video_id = %video_id, "video registered");

        let task_id = self
            .monitor
            .scheduler()
            .schedule_at(fire_at, Job::recheck(id.clone()))
            .await
            .inspect_err(|e| {
                warn!(entity_id = %id, error = %e, "first cycle not armed, run reschedule-all to recover");
            })?;
        if let Err(e) = store.patch(&id, EntityPatch::task(Some(task_id.clone()))).await {
            warn!(entity_id = %id, error = %e, "cannot record first task");
            if let Err(cancel_err) = self.monitor.scheduler().cancel(&task_id).await {
                warn!(task_id = %task_id, error = %cancel_err, "cannot cancel orphaned task");
            }
            return Err(e);
        }

        let entity = store
            .get(&id)
            .await?
            .ok_or_else(|| MonitorError::EntityNotFound(id.to_string()))?;
        Ok(self.describe(entity, true))
    }

    async fn key_lock(&self, video_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(video_id.to_owned()).or_default())
    }

    fn describe(&self, entity: MonitoredEntity, created: bool) -> Registration {
        let decorated_url = entity
            .decorated_key
            .as_deref()
            .map(|key| self.monitor.objects().public_url(key));
        let markdown = markdown_snippet(
            &entity,
            decorated_url.as_deref().unwrap_or(&entity.source_url),
        );
        Registration {
            entity,
            created,
            decorated_url,
            markdown,
        }
    }
}

impl std::fmt::Debug for Registrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("sources", &self.sources)
            .field("initial_delay_days", &self.initial_delay_days)
            .finish_non_exhaustive()
    }
}
