//! thumbwatch: adaptive re-checking of hosted video thumbnails.
//!
//! Each monitored video owns one pending re-check task. When it fires, the
//! [`Monitor`] fetches the thumbnail, compares its SHA-256 against the
//! stored one, re-renders the play-button artifact on a change, and arms
//! its own next run with a doubling backoff.
//!
//! # Architecture
//!
//! - **hasher / detector**: fingerprint and classify fetched bytes
//! - **decorator**: composite the play-button overlay and re-encode as JPEG
//! - **policy**: pure backoff from the current interval and the verdict
//! - **orchestrator**: one cycle as a single unit of work
//! - **store / scheduler / object_store**: the collaborators, behind traits
//! - **registration / maintenance**: adding videos and bulk operations

pub mod config;
pub mod decorator;
pub mod detector;
pub mod entity;
pub mod error;
pub mod hasher;
pub mod maintenance;
pub mod object_store;
pub mod orchestrator;
pub mod paths;
pub mod policy;
pub mod registration;
pub mod scheduler;
pub mod source;
mod state_lock;
pub mod store;

pub use config::MonitorConfig;
pub use decorator::{Decorator, DecoratorConfig};
pub use detector::{ChangeDetector, CheckOutcome, Fetcher};
pub use entity::{EntityId, EntityPatch, MonitoredEntity, NewEntity, TaskId};
pub use error::{MonitorError, Result};
pub use hasher::content_hash;
pub use maintenance::{EntityScheduleStatus, RescheduleSummary};
pub use object_store::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use orchestrator::{CycleReport, CycleSummary, Monitor};
pub use policy::{IntervalPolicy, Verdict, days_after, next_interval};
pub use registration::{Registrar, Registration};
pub use scheduler::{Job, JobHandler, LocalScheduler, TaskScheduler};
pub use source::{MetadataLookup, SourceConfig, extract_video_id, markdown_snippet};
pub use store::{EntityStore, InMemoryEntityStore, JsonFileEntityStore};
