//! Bulk maintenance over all monitored entities.
//!
//! `reschedule_all` is the recovery path for entities left without a
//! pending task after a scheduling failure.

use crate::entity::{EntityId, EntityPatch};
use crate::error::Result;
use crate::orchestrator::Monitor;
use crate::scheduler::Job;
use crate::policy::days_after;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of [`Monitor::reschedule_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescheduleSummary {
    /// Entities that now have a fresh pending task.
    pub rescheduled: usize,
    /// Entities that could not be re-armed.
    pub errors: usize,
}

/// Schedule state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityScheduleStatus {
    /// Entity id.
    pub id: EntityId,
    /// Platform key.
    pub external_key: String,
    /// Title.
    pub title: String,
    /// Current interval.
    pub check_interval_days: u32,
    /// Last completed cycle.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// `last_checked_at + interval`.
    pub next_check_at: Option<DateTime<Utc>>,
    /// Whether the next check time has passed.
    pub overdue: bool,
    /// Whether a task id is recorded.
    pub has_scheduled_task: bool,
    /// Reason of the last errored cycle.
    pub last_error: Option<String>,
}

impl Monitor {
    /// Re-arm every entity at `now + interval`.
    ///
    /// Only `scheduled_task_id` is touched; hashes and intervals stay.
    pub async fn reschedule_all(&self, now: DateTime<Utc>) -> Result<RescheduleSummary> {
        let ids: Vec<EntityId> = self.store.list().await?.into_iter().map(|e| e.id).collect();
        let mut summary = RescheduleSummary::default();

        for id in ids {
            let lock = self.entity_lock(&id).await;
            let _guard = lock.lock().await;

            // A cycle may have re-armed the entity since the listing.
            let entity = match self.store.get(&id).await {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "cannot load entity for reschedule");
                    summary.errors += 1;
                    continue;
                }
            };

            let fire_at = match days_after(now, entity.check_interval_days) {
                Ok(fire_at) => fire_at,
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "cannot reschedule entity");
                    summary.errors += 1;
                    continue;
                }
            };

            if let Some(old_task) = &entity.scheduled_task_id {
                if let Err(e) = self.scheduler.cancel(old_task).await {
                    warn!(entity_id = %id, task_id = %old_task, error = %e, "cannot cancel task");
                }
            }

            let task_id = match self
                .scheduler
                .schedule_at(fire_at, Job::recheck(id.clone()))
                .await
            {
                Ok(task_id) => task_id,
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "cannot reschedule entity");
                    summary.errors += 1;
                    continue;
                }
            };

            match self
                .store
                .patch(&id, EntityPatch::task(Some(task_id.clone())))
                .await
            {
                Ok(()) => summary.rescheduled += 1,
                Err(e) => {
                    warn!(entity_id = %id, error = %e, "cannot record rescheduled task");
                    if let Err(cancel_err) = self.scheduler.cancel(&task_id).await {
                        warn!(task_id = %task_id, error = %cancel_err, "cannot cancel orphaned task");
                    }
                    summary.errors += 1;
                }
            }
        }

        info!(
            rescheduled = summary.rescheduled,
            errors = summary.errors,
            "bulk reschedule complete"
        );
        Ok(summary)
    }

    /// Schedule state of every entity as of `now`.
    pub async fn schedule_status(&self, now: DateTime<Utc>) -> Result<Vec<EntityScheduleStatus>> {
        let entities = self.store.list().await?;
        Ok(entities
            .into_iter()
            .map(|entity| {
                let next_check_at = entity.next_check_at();
                EntityScheduleStatus {
                    overdue: next_check_at.is_some_and(|at| at < now),
                    next_check_at,
                    has_scheduled_task: entity.scheduled_task_id.is_some(),
                    id: entity.id,
                    external_key: entity.external_key,
                    title: entity.title,
                    check_interval_days: entity.check_interval_days,
                    last_checked_at: entity.last_checked_at,
                    last_error: entity.last_error,
                }
            })
            .collect())
    }

    /// Cancel the pending task of `id`, then delete the entity.
    ///
    /// Returns `false` if the entity did not exist.
    pub async fn retire(&self, id: &EntityId) -> Result<bool> {
        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        let Some(entity) = self.store.get(id).await? else {
            return Ok(false);
        };
        if let Some(task_id) = &entity.scheduled_task_id {
            self.scheduler.cancel(task_id).await?;
        }
        let removed = self.store.remove(id).await?;
        info!(entity_id = %id, "entity retired");
        Ok(removed)
    }
}
