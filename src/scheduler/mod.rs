//! One-shot task scheduling.
//!
//! Each monitored entity owns at most one pending [`Job::Recheck`]; the
//! orchestrator re-arms it at the end of every cycle.

pub mod runner;
pub mod tasks;

pub use runner::{JobHandler, LocalScheduler, SchedulerSnapshot, TaskScheduler};
pub use tasks::{Job, PendingTask, TaskRunRecord};
