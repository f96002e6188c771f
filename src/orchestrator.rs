//! The monitoring cycle.
//!
//! [`Monitor::run_cycle`] re-checks one entity and re-arms its own next
//! run:
//!
//! 1. load the entity (a missing entity ends the cycle without re-arming)
//! 2. fetch and compare the source bytes
//! 3. on a change, re-decorate and overwrite the artifact at its stable key
//! 4. cancel the previous task, compute the next interval, arm a new task
//! 5. persist hash, interval, check time and task id in a single patch
//!
//! If arming the new task fails the entity record is left exactly as it
//! was. Cycles for the same entity are serialised by an in-process lock;
//! nothing coordinates cycles across processes.

use crate::decorator::{DECORATED_CONTENT_TYPE, Decorator};
use crate::detector::{ChangeDetector, CheckOutcome, Fetcher};
use crate::entity::{EntityId, EntityPatch, MonitoredEntity, TaskId};
use crate::error::{MonitorError, Result};
use crate::object_store::{ObjectStore, allocate_key};
use crate::policy::{IntervalPolicy, Verdict, days_after};
use crate::scheduler::{Job, JobHandler, TaskScheduler};
use crate::store::EntityStore;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// The entity no longer exists. Nothing was re-armed.
    EntityMissing,
    /// The cycle persisted its outcome and armed the next run.
    Completed(CycleSummary),
}

impl CycleReport {
    /// The summary of a completed cycle.
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::EntityMissing => None,
        }
    }
}

/// Details of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    /// How the check came out.
    pub verdict: Verdict,
    /// Interval before the cycle.
    pub previous_interval_days: u32,
    /// Interval chosen for the next run.
    pub next_interval_days: u32,
    /// The newly armed task.
    pub task_id: TaskId,
    /// When the next run fires.
    pub fire_at: DateTime<Utc>,
    /// Failure reason of an errored cycle.
    pub error: Option<String>,
}

/// Orchestrates monitoring cycles over injected collaborators.
pub struct Monitor {
    pub(crate) store: Arc<dyn EntityStore>,
    pub(crate) scheduler: Arc<dyn TaskScheduler>,
    pub(crate) objects: Arc<dyn ObjectStore>,
    pub(crate) detector: ChangeDetector,
    pub(crate) decorator: Decorator,
    pub(crate) policy: IntervalPolicy,
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl Monitor {
    /// Create a monitor with the default decorator and policy.
    pub fn new(
        store: Arc<dyn EntityStore>,
        scheduler: Arc<dyn TaskScheduler>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            store,
            scheduler,
            objects,
            detector: ChangeDetector::new(fetcher),
            decorator: Decorator::default(),
            policy: IntervalPolicy::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the image decorator.
    pub fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorator = decorator;
        self
    }

    /// Replace the interval policy.
    pub fn with_policy(mut self, policy: IntervalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The entity store.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// The task scheduler.
    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.scheduler
    }

    /// The artifact store.
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Run one cycle for `id` now.
    pub async fn run_cycle(&self, id: &EntityId) -> Result<CycleReport> {
        self.run_cycle_at(id, Utc::now()).await
    }

    /// Run one cycle for `id` as of `now`.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Schedule`] if the next run could not be armed; the
    ///   entity record is untouched.
    /// - [`MonitorError::Persistence`] if the store rejected the read or the
    ///   final update; a task armed by this cycle is cancelled first.
    pub async fn run_cycle_at(&self, id: &EntityId, now: DateTime<Utc>) -> Result<CycleReport> {
        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        let Some(entity) = self.load(id).await? else {
            info!(entity_id = %id, "entity gone, cycle ends without re-arming");
            return Ok(CycleReport::EntityMissing);
        };

        let outcome = self
            .detector
            .check(&entity.source_url, entity.previous_hash())
            .await;

        let mut new_key = None;
        let (verdict, new_hash, error_reason) = match outcome {
            CheckOutcome::Error(reason) => (Verdict::Errored, None, Some(reason)),
            CheckOutcome::Unchanged { hash, .. } => (Verdict::Unchanged, Some(hash), None),
            CheckOutcome::Changed { hash, bytes } => match self.redecorate(&entity, bytes).await {
                Ok(allocated) => {
                    new_key = allocated;
                    (Verdict::Changed, Some(hash), None)
                }
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "re-decoration failed, treating cycle as errored");
                    (Verdict::Errored, None, Some(e.to_string()))
                }
            },
        };

        if let Some(old_task) = &entity.scheduled_task_id {
            if let Err(e) = self.scheduler.cancel(old_task).await {
                warn!(entity_id = %id, task_id = %old_task, error = %e, "cannot cancel previous task");
            }
        }

        let previous = entity.check_interval_days;
        let next = self.policy.next(previous, verdict);
        let armed = match days_after(now, next) {
            Ok(fire_at) => self
                .scheduler
                .schedule_at(fire_at, Job::recheck(id.clone()))
                .await
                .map(|task_id| (task_id, fire_at)),
            Err(e) => Err(e),
        };

        let (task_id, fire_at) = match armed {
            Ok(armed) => armed,
            Err(e) => {
                error!(
                    entity_id = %id,
                    interval_days = next,
                    error = %e,
                    "cannot arm next cycle, entity left unchanged"
                );
                return Err(match e {
                    MonitorError::Schedule(_) => e,
                    other => MonitorError::Schedule(other.to_string()),
                });
            }
        };

        let patch = EntityPatch {
            decorated_key: new_key,
            last_content_hash: new_hash,
            check_interval_days: Some(next),
            last_checked_at: Some(now),
            last_error: Some(error_reason.clone()),
            scheduled_task_id: Some(Some(task_id.clone())),
        };

        if let Err(e) = self.store.patch(id, patch).await {
            if let Err(cancel_err) = self.scheduler.cancel(&task_id).await {
                warn!(task_id = %task_id, error = %cancel_err, "cannot cancel orphaned task");
            }
            if matches!(e, MonitorError::EntityNotFound(_)) {
                info!(entity_id = %id, "entity removed mid-cycle, cycle ends without re-arming");
                return Ok(CycleReport::EntityMissing);
            }
            error!(entity_id = %id, error = %e, "cannot persist cycle outcome");
            return Err(match e {
                MonitorError::Persistence(_) => e,
                other => MonitorError::Persistence(other.to_string()),
            });
        }

        info!(
            entity_id = %id,
            verdict = %verdict,
            interval_days = next,
            previous_interval_days = previous,
            task_id = %task_id,
            "cycle complete"
        );

        Ok(CycleReport::Completed(CycleSummary {
            verdict,
            previous_interval_days: previous,
            next_interval_days: next,
            task_id,
            fire_at,
            error: error_reason,
        }))
    }

    /// Decorate `bytes` and write the artifact.
    ///
    /// Returns the key when one had to be allocated, `None` when the
    /// entity's existing key was overwritten.
    async fn redecorate(&self, entity: &MonitoredEntity, bytes: Bytes) -> Result<Option<String>> {
        let decorated = self.decorator.decorate(&bytes)?;
        let (key, allocated) = match &entity.decorated_key {
            Some(key) => (key.clone(), false),
            None => (allocate_key(), true),
        };
        self.objects
            .put(&key, Bytes::from(decorated), DECORATED_CONTENT_TYPE)
            .await?;
        debug!(entity_id = %entity.id, key = %key, "artifact re-decorated");
        Ok(allocated.then_some(key))
    }

    async fn load(&self, id: &EntityId) -> Result<Option<MonitoredEntity>> {
        self.store.get(id).await.map_err(|e| match e {
            MonitorError::Persistence(_) => e,
            other => MonitorError::Persistence(other.to_string()),
        })
    }

    /// Per-entity cycle lock. Idle entries are pruned on each lookup.
    pub(crate) async fn entity_lock(&self, id: &EntityId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id.clone()).or_default())
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("decorator", &self.decorator)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobHandler for Monitor {
    async fn handle(&self, job: Job) {
        match job {
            Job::Recheck { entity_id } => {
                if let Err(e) = self.run_cycle(&entity_id).await {
                    error!(entity_id = %entity_id, error = %e, "monitoring cycle failed");
                }
            }
        }
    }
}
