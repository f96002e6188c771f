//! Scheduled job definitions.
//!
//! A [`PendingTask`] is a one-shot [`Job`] armed for a point in time.
//! Fired tasks leave a [`TaskRunRecord`] in the scheduler history.

use crate::entity::{EntityId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work a task performs when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Run one monitoring cycle for an entity.
    Recheck {
        /// Entity to re-check.
        entity_id: EntityId,
    },
}

impl Job {
    /// Convenience constructor for [`Job::Recheck`].
    pub fn recheck(entity_id: EntityId) -> Self {
        Self::Recheck { entity_id }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recheck { entity_id } => write!(f, "recheck {entity_id}"),
        }
    }
}

/// A one-shot task waiting to fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    /// Handle returned to the caller of `schedule_at`.
    pub task_id: TaskId,
    /// Earliest instant the task may fire.
    pub fire_at: DateTime<Utc>,
    /// What to run.
    pub job: Job,
}

impl PendingTask {
    /// Create a task with a fresh id.
    pub fn new(fire_at: DateTime<Utc>, job: Job) -> Self {
        Self {
            task_id: TaskId::generate(),
            fire_at,
            job,
        }
    }

    /// Returns `true` if the task may fire at `now`.
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}

/// A task that has fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunRecord {
    /// Id of the fired task.
    pub task_id: TaskId,
    /// The job that was dispatched.
    pub job: Job,
    /// When the task was due.
    pub fire_at: DateTime<Utc>,
    /// When the scheduler dispatched it.
    pub fired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Duration;

    #[test]
    fn due_is_inclusive_of_fire_time() {
        let now = Utc::now();
        let task = PendingTask::new(now, Job::recheck(EntityId::from("e")));
        assert!(task.is_due_at(now));
        assert!(task.is_due_at(now + Duration::seconds(1)));
        assert!(!task.is_due_at(now - Duration::seconds(1)));
    }

    #[test]
    fn job_serializes_with_type_tag() {
        let job = Job::recheck(EntityId::from("e1"));
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, r#"{"type":"recheck","entity_id":"e1"}"#);
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn job_display() {
        assert_eq!(Job::recheck(EntityId::from("e1")).to_string(), "recheck e1");
    }
}
