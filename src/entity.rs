//! Monitored entity model.
//!
//! One [`MonitoredEntity`] per externally hosted image under re-check.
//! `check_interval_days` defaults to [`MIN_INTERVAL_DAYS`] when a stored
//! record lacks it; that default is applied here and nowhere else.

use crate::policy::{MIN_INTERVAL_DAYS, days_after};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Allocate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a pending one-shot task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Allocate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_interval_days() -> u32 {
    MIN_INTERVAL_DAYS
}

/// The record representing one image under periodic re-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredEntity {
    /// Stable identifier assigned at creation.
    pub id: EntityId,
    /// Platform key used to find duplicates (the video id).
    pub external_key: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Canonical page URL of the source.
    #[serde(default)]
    pub page_url: String,
    /// The resource polled on every cycle. Immutable after creation.
    pub source_url: String,
    /// Object-store key of the decorated artifact. Allocated once.
    #[serde(default)]
    pub decorated_key: Option<String>,
    /// Fingerprint of the last fetched bytes. `None` means never checked.
    #[serde(default)]
    pub last_content_hash: Option<String>,
    /// The next scheduled gap, in days.
    #[serde(default = "default_interval_days")]
    pub check_interval_days: u32,
    /// When the last cycle finished.
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Reason the last cycle errored, cleared by the next clean one.
    #[serde(default)]
    pub last_error: Option<String>,
    /// The pending task that will run the next cycle.
    #[serde(default)]
    pub scheduled_task_id: Option<TaskId>,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
}

impl MonitoredEntity {
    /// Stored fingerprint, with "never checked" as the empty string.
    pub fn previous_hash(&self) -> &str {
        self.last_content_hash.as_deref().unwrap_or("")
    }

    /// When the next cycle is due, if the entity has been checked before
    /// and the date is representable.
    pub fn next_check_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
            .and_then(|at| days_after(at, self.check_interval_days).ok())
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: EntityPatch) {
        if let Some(key) = patch.decorated_key {
            self.decorated_key = Some(key);
        }
        if let Some(hash) = patch.last_content_hash {
            self.last_content_hash = Some(hash);
        }
        if let Some(days) = patch.check_interval_days {
            self.check_interval_days = days;
        }
        if let Some(at) = patch.last_checked_at {
            self.last_checked_at = Some(at);
        }
        if let Some(error) = patch.last_error {
            self.last_error = error;
        }
        if let Some(task) = patch.scheduled_task_id {
            self.scheduled_task_id = task;
        }
    }
}

/// Fields supplied when creating an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntity {
    /// Platform key (the video id).
    pub external_key: String,
    /// Human-readable title.
    pub title: String,
    /// Canonical page URL.
    pub page_url: String,
    /// Resource to poll.
    pub source_url: String,
    /// Key of the first decorated artifact.
    pub decorated_key: Option<String>,
    /// Fingerprint captured from the first fetch.
    pub initial_hash: Option<String>,
}

/// Partial update. `None` leaves a field untouched.
///
/// For the nullable fields the outer `Option` selects "touch", the inner
/// one is the new value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityPatch {
    /// New artifact key.
    pub decorated_key: Option<String>,
    /// New fingerprint.
    pub last_content_hash: Option<String>,
    /// New interval.
    pub check_interval_days: Option<u32>,
    /// New check timestamp.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// New (or cleared) error reason.
    pub last_error: Option<Option<String>>,
    /// New (or cleared) pending task.
    pub scheduled_task_id: Option<Option<TaskId>>,
}

impl EntityPatch {
    /// Patch that only re-points the pending task.
    pub fn task(task_id: Option<TaskId>) -> Self {
        Self {
            scheduled_task_id: Some(task_id),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn sample() -> MonitoredEntity {
        MonitoredEntity {
            id: EntityId::from("e1"),
            external_key: "abc".to_owned(),
            title: "A video".to_owned(),
            page_url: "https://youtu.be/abc".to_owned(),
            source_url: "https://img.example/abc.jpg".to_owned(),
            decorated_key: Some("deadbeef.jpg".to_owned()),
            last_content_hash: None,
            check_interval_days: 4,
            last_checked_at: None,
            last_error: None,
            scheduled_task_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_interval_defaults_to_one() {
        let json = r#"{
            "id": "e1",
            "external_key": "abc",
            "source_url": "https://img.example/abc.jpg",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let entity: MonitoredEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.check_interval_days, 1);
        assert!(entity.last_content_hash.is_none());
        assert_eq!(entity.previous_hash(), "");
    }

    #[test]
    fn apply_touches_only_patched_fields() {
        let mut entity = sample();
        entity.apply(EntityPatch {
            check_interval_days: Some(8),
            ..Default::default()
        });
        assert_eq!(entity.check_interval_days, 8);
        assert_eq!(entity.decorated_key.as_deref(), Some("deadbeef.jpg"));
        assert!(entity.last_checked_at.is_none());
    }

    #[test]
    fn apply_can_clear_nullable_fields() {
        let mut entity = sample();
        entity.last_error = Some("boom".to_owned());
        entity.scheduled_task_id = Some(TaskId::from("t1"));
        entity.apply(EntityPatch {
            last_error: Some(None),
            scheduled_task_id: Some(None),
            ..Default::default()
        });
        assert!(entity.last_error.is_none());
        assert!(entity.scheduled_task_id.is_none());
    }

    #[test]
    fn next_check_is_last_check_plus_interval() {
        let mut entity = sample();
        assert!(entity.next_check_at().is_none());
        let at = DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        entity.last_checked_at = Some(at);
        assert_eq!(
            entity.next_check_at().unwrap(),
            at + chrono::Duration::days(4)
        );
    }

    #[test]
    fn unrepresentable_next_check_is_none() {
        let mut entity = sample();
        entity.last_checked_at = Some(Utc::now());
        entity.check_interval_days = 200_000_000;
        assert!(entity.next_check_at().is_none());
    }

    #[test]
    fn ids_display_as_plain_strings() {
        assert_eq!(EntityId::from("x").to_string(), "x");
        assert_eq!(TaskId::from("t").as_str(), "t");
        assert_ne!(EntityId::generate(), EntityId::generate());
    }
}
