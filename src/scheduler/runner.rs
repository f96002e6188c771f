//! Durable one-shot task scheduler.
//!
//! [`LocalScheduler`] keeps pending tasks in a JSON state file that several
//! processes may share, and runs a background tick loop that hands due jobs
//! to a [`JobHandler`]. Each mutation re-reads the file under a
//! cross-process lock before writing it back.

use crate::entity::TaskId;
use crate::error::{MonitorError, Result};
use crate::scheduler::tasks::{Job, PendingTask, TaskRunRecord};
use crate::state_lock::{LOCK_TIMEOUT, StateLock, write_replace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default interval between scheduler ticks (seconds).
pub const DEFAULT_TICK_SECS: u64 = 60;

/// Number of run-history entries to keep.
const DEFAULT_HISTORY_LIMIT: usize = 400;

/// Durable one-shot delayed execution with cancellation.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Arm `job` to fire no earlier than `fire_at`.
    async fn schedule_at(&self, fire_at: DateTime<Utc>, job: Job) -> Result<TaskId>;

    /// Cancel a pending task. Unknown or already fired ids succeed.
    async fn cancel(&self, task_id: &TaskId) -> Result<()>;
}

/// Receives jobs when their tasks fire.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the job. Failures are the handler's to log.
    async fn handle(&self, job: Job);
}

/// Public snapshot used by status tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Tasks waiting to fire.
    pub pending: Vec<PendingTask>,
    /// Recently fired tasks.
    #[serde(default)]
    pub history: Vec<TaskRunRecord>,
}

/// Persisted scheduler state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SchedulerState {
    /// Schema version.
    #[serde(default = "default_state_version")]
    version: u8,
    #[serde(default)]
    pending: Vec<PendingTask>,
    #[serde(default)]
    history: Vec<TaskRunRecord>,
}

fn default_state_version() -> u8 {
    1
}

/// Scheduler backed by an optional JSON state file.
pub struct LocalScheduler {
    /// Live state without a file, last state seen on disk with one.
    snapshot: Mutex<SchedulerSnapshot>,
    /// Path to persisted state. `None` keeps everything in memory.
    state_path: Option<PathBuf>,
    tick_interval: Duration,
    max_history_entries: usize,
}

impl LocalScheduler {
    /// Scheduler that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            snapshot: Mutex::new(SchedulerSnapshot::default()),
            state_path: None,
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            max_history_entries: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Open a scheduler persisted at `path`, loading any pending tasks.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Schedule`] if the state file exists but
    /// cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = load_snapshot_from_path(Some(&path))?;
        debug!(
            path = %path.display(),
            pending = snapshot.pending.len(),
            "loaded scheduler state"
        );
        Ok(Self {
            snapshot: Mutex::new(snapshot),
            state_path: Some(path),
            tick_interval: Duration::from_secs(DEFAULT_TICK_SECS),
            max_history_entries: DEFAULT_HISTORY_LIMIT,
        })
    }

    /// Override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override the in-memory and persisted run-history limit.
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.max_history_entries = max_entries.max(1);
        self
    }

    /// Copy of the current pending tasks and history.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.current()
    }

    /// Tasks waiting to fire, earliest first.
    pub fn pending(&self) -> Vec<PendingTask> {
        let mut pending = self.current().pending;
        pending.sort_by_key(|t| t.fire_at);
        pending
    }

    /// Returns `true` if `task_id` is still waiting to fire.
    pub fn is_pending(&self, task_id: &TaskId) -> bool {
        self.current().pending.iter().any(|t| &t.task_id == task_id)
    }

    /// Remove every task due at `now` and persist the removal.
    ///
    /// The returned tasks are recorded in history and will not fire again.
    /// If the removal cannot be persisted nothing fires and the tasks stay
    /// pending for the next tick.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<PendingTask> {
        let limit = self.max_history_entries;
        let result = self.update(|snapshot| {
            let (due, rest): (Vec<_>, Vec<_>) = snapshot
                .pending
                .drain(..)
                .partition(|task| task.is_due_at(now));
            snapshot.pending = rest;
            if due.is_empty() {
                return (due, false);
            }

            for task in &due {
                snapshot.history.push(TaskRunRecord {
                    task_id: task.task_id.clone(),
                    job: task.job.clone(),
                    fire_at: task.fire_at,
                    fired_at: now,
                });
            }
            trim_history(&mut snapshot.history, limit);
            (due, true)
        });

        result.unwrap_or_else(|e| {
            error!("cannot persist scheduler state, due tasks held: {e}");
            Vec::new()
        })
    }

    /// Execute one scheduler tick at `now`, dispatching each due job.
    ///
    /// Jobs run concurrently; the call waits for all of them.
    pub async fn tick_at(&self, now: DateTime<Utc>, handler: &Arc<dyn JobHandler>) -> usize {
        let due = self.take_due(now);
        let fired = due.len();
        let mut running = Vec::with_capacity(fired);
        for task in due {
            debug!(task_id = %task.task_id, job = %task.job, "firing scheduled task");
            let handler = Arc::clone(handler);
            running.push(tokio::spawn(async move { handler.handle(task.job).await }));
        }
        for join in running {
            if let Err(e) = join.await {
                error!("scheduled job panicked: {e}");
            }
        }
        fired
    }

    /// Start the background loop. Stops when `cancel` fires.
    pub fn run(
        self: Arc<Self>,
        handler: Arc<dyn JobHandler>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let pending = self.pending().len();
            info!(
                pending,
                tick_secs = self.tick_interval.as_secs(),
                "scheduler started"
            );
            let mut interval = tokio::time::interval(self.tick_interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let fired = self.tick_at(Utc::now(), &handler).await;
                        if fired > 0 {
                            debug!(fired, "scheduler tick complete");
                        }
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerSnapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Freshest readable state. Falls back to the last state seen when the
    /// file cannot be read.
    fn current(&self) -> SchedulerSnapshot {
        let mut guard = self.lock();
        if self.state_path.is_some() {
            match load_snapshot_from_path(self.state_path.as_deref()) {
                Ok(snapshot) => *guard = snapshot,
                Err(e) => warn!("cannot reload scheduler state: {e}"),
            }
        }
        guard.clone()
    }

    /// Apply `change` to the freshest state, persisting it when `change`
    /// reports a modification.
    ///
    /// With a state file, the file is locked and re-read first so tasks
    /// armed by other processes survive. A failed write leaves both the
    /// file and the cached state untouched.
    fn update<T>(&self, change: impl FnOnce(&mut SchedulerSnapshot) -> (T, bool)) -> Result<T> {
        let mut guard = self.lock();
        let Some(path) = self.state_path.as_deref() else {
            let (out, _) = change(&mut *guard);
            return Ok(out);
        };

        let _lock = StateLock::acquire(path, LOCK_TIMEOUT).map_err(MonitorError::Schedule)?;
        let mut staged = load_snapshot_from_path(Some(path))?;
        let (out, modified) = change(&mut staged);
        if modified {
            save_snapshot_to_path(Some(path), &staged)?;
        }
        *guard = staged;
        Ok(out)
    }
}

impl std::fmt::Debug for LocalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalScheduler")
            .field("state_path", &self.state_path)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TaskScheduler for LocalScheduler {
    async fn schedule_at(&self, fire_at: DateTime<Utc>, job: Job) -> Result<TaskId> {
        let task = PendingTask::new(fire_at, job);
        let task_id = task.task_id.clone();

        self.update(|snapshot| {
            snapshot.pending.push(task);
            ((), true)
        })?;
        debug!(task_id = %task_id, fire_at = %fire_at, "task armed");
        Ok(task_id)
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<()> {
        let removed = self
            .update(|snapshot| {
                let before = snapshot.pending.len();
                snapshot.pending.retain(|t| &t.task_id != task_id);
                let removed = snapshot.pending.len() != before;
                (removed, removed)
            })
            .inspect_err(|e| warn!(task_id = %task_id, "cannot persist cancellation: {e}"))?;

        if removed {
            debug!(task_id = %task_id, "task cancelled");
        } else {
            debug!(task_id = %task_id, "cancel of unknown or fired task ignored");
        }
        Ok(())
    }
}

fn trim_history(history: &mut Vec<TaskRunRecord>, limit: usize) {
    if history.len() <= limit {
        return;
    }
    let drop_count = history.len().saturating_sub(limit);
    history.drain(0..drop_count);
}

fn load_snapshot_from_path(path: Option<&Path>) -> Result<SchedulerSnapshot> {
    let Some(path) = path else {
        return Ok(SchedulerSnapshot::default());
    };

    let bytes = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SchedulerSnapshot::default());
        }
        Err(e) => {
            return Err(MonitorError::Schedule(format!("cannot read state: {e}")));
        }
    };

    let state: SchedulerState = serde_json::from_slice(&bytes)
        .map_err(|e| MonitorError::Schedule(format!("cannot parse state: {e}")))?;

    Ok(SchedulerSnapshot {
        pending: state.pending,
        history: state.history,
    })
}

fn save_snapshot_to_path(path: Option<&Path>, snapshot: &SchedulerSnapshot) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MonitorError::Schedule(format!("cannot create state dir: {e}")))?;
    }

    let state = SchedulerState {
        version: default_state_version(),
        pending: snapshot.pending.clone(),
        history: snapshot.history.clone(),
    };

    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| MonitorError::Schedule(format!("cannot serialize state: {e}")))?;

    write_replace(path, json.as_bytes())
        .map_err(|e| MonitorError::Schedule(format!("cannot write state: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::entity::EntityId;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct RecordingHandler {
        jobs: AsyncMutex<Vec<Job>>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn handle(&self, job: Job) {
            self.jobs.lock().await.push(job);
        }
    }

    fn job(id: &str) -> Job {
        Job::recheck(EntityId::from(id))
    }

    #[tokio::test]
    async fn schedule_then_cancel() {
        let scheduler = LocalScheduler::in_memory();
        let id = scheduler
            .schedule_at(Utc::now() + ChronoDuration::days(1), job("e"))
            .await
            .unwrap();
        assert!(scheduler.is_pending(&id));
        scheduler.cancel(&id).await.unwrap();
        assert!(!scheduler.is_pending(&id));
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_ok() {
        let scheduler = LocalScheduler::in_memory();
        scheduler.cancel(&TaskId::from("never-armed")).await.unwrap();
        // Second cancel of the same id is also fine.
        scheduler.cancel(&TaskId::from("never-armed")).await.unwrap();
    }

    #[tokio::test]
    async fn take_due_fires_once() {
        let scheduler = LocalScheduler::in_memory();
        let now = Utc::now();
        scheduler.schedule_at(now, job("due")).await.unwrap();
        scheduler
            .schedule_at(now + ChronoDuration::days(2), job("later"))
            .await
            .unwrap();

        let due = scheduler.take_due(now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].job, job("due"));
        assert!(scheduler.take_due(now).is_empty());
        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(scheduler.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn cancel_after_fire_is_ok() {
        let scheduler = LocalScheduler::in_memory();
        let now = Utc::now();
        let id = scheduler.schedule_at(now, job("e")).await.unwrap();
        scheduler.take_due(now);
        scheduler.cancel(&id).await.unwrap();
    }

    #[tokio::test]
    async fn tick_dispatches_due_jobs_to_handler() {
        let scheduler = LocalScheduler::in_memory();
        let now = Utc::now();
        scheduler.schedule_at(now, job("a")).await.unwrap();
        scheduler
            .schedule_at(now - ChronoDuration::hours(1), job("b"))
            .await
            .unwrap();

        let recorder = Arc::new(RecordingHandler::default());
        let handler: Arc<dyn JobHandler> = recorder.clone();
        assert_eq!(scheduler.tick_at(now, &handler).await, 2);

        let mut seen = recorder.jobs.lock().await.clone();
        seen.sort_by_key(|j| j.to_string());
        assert_eq!(seen, vec![job("a"), job("b")]);
        assert_eq!(scheduler.tick_at(now, &handler).await, 0);
    }

    #[tokio::test]
    async fn pending_tasks_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scheduler.json");
        let fire_at = Utc::now() + ChronoDuration::days(4);

        let id = {
            let scheduler = LocalScheduler::open(&path).unwrap();
            scheduler.schedule_at(fire_at, job("e")).await.unwrap()
        };

        let reopened = LocalScheduler::open(&path).unwrap();
        let pending = reopened.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_id, id);
        assert_eq!(pending[0].fire_at, fire_at);
    }

    #[tokio::test]
    async fn fired_tasks_do_not_reappear_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scheduler.json");
        let now = Utc::now();
        {
            let scheduler = LocalScheduler::open(&path).unwrap();
            scheduler.schedule_at(now, job("e")).await.unwrap();
            assert_eq!(scheduler.take_due(now).len(), 1);
        }
        let reopened = LocalScheduler::open(&path).unwrap();
        assert!(reopened.pending().is_empty());
        assert_eq!(reopened.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn unwritable_state_rejects_schedule() {
        let dir = tempfile::tempdir().expect("tempdir");
        // State path is a directory, so writes fail.
        let mut scheduler = LocalScheduler::in_memory();
        scheduler.state_path = Some(dir.path().to_path_buf());
        let err = scheduler
            .schedule_at(Utc::now(), job("e"))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Schedule(_)));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn two_handles_on_one_file_keep_each_others_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scheduler.json");
        let now = Utc::now();

        let serve = LocalScheduler::open(&path).unwrap();
        let fired = serve.schedule_at(now, job("old")).await.unwrap();

        // A second process arms the first task of a newly added video.
        let add = LocalScheduler::open(&path).unwrap();
        let added = add
            .schedule_at(now + ChronoDuration::days(1), job("new"))
            .await
            .unwrap();

        // The serving handle fires its due task and arms a follow-up.
        assert_eq!(serve.take_due(now).len(), 1);
        let follow_up = serve
            .schedule_at(now + ChronoDuration::days(2), job("old"))
            .await
            .unwrap();
        serve.cancel(&fired).await.unwrap();

        assert!(serve.is_pending(&added));
        let reopened = LocalScheduler::open(&path).unwrap();
        let ids: Vec<_> = reopened.pending().into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![added.clone(), follow_up]);

        // The adding handle sees the serving handle's firing too.
        add.cancel(&added).await.unwrap();
        assert_eq!(reopened.pending().len(), 1);
        assert_eq!(add.snapshot().history.len(), 1);
    }

    #[tokio::test]
    async fn state_file_is_replaced_not_rewritten_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scheduler.json");
        let scheduler = LocalScheduler::open(&path).unwrap();
        scheduler.schedule_at(Utc::now(), job("e")).await.unwrap();

        // A directory at the temp path makes the write fail before the rename.
        std::fs::create_dir(dir.path().join("scheduler.json.tmp")).unwrap();
        let err = scheduler
            .schedule_at(Utc::now(), job("f"))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Schedule(_)));

        // The previous file is intact and still loads.
        let reopened = LocalScheduler::open(&path).unwrap();
        assert_eq!(reopened.pending().len(), 1);
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[test]
    fn history_is_trimmed() {
        let scheduler = LocalScheduler::in_memory().with_history_limit(2);
        let now = Utc::now();
        {
            let mut guard = scheduler.lock();
            for i in 0..3 {
                guard.pending.push(PendingTask::new(now, job(&format!("e{i}"))));
            }
        }
        assert_eq!(scheduler.take_due(now).len(), 3);
        assert_eq!(scheduler.snapshot().history.len(), 2);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancel() {
        let scheduler = Arc::new(
            LocalScheduler::in_memory().with_tick_interval(std::time::Duration::from_millis(10)),
        );
        scheduler
            .schedule_at(Utc::now() - ChronoDuration::seconds(1), job("e"))
            .await
            .unwrap();
        let recorder = Arc::new(RecordingHandler::default());
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&scheduler).run(recorder.clone(), cancel.clone());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(recorder.jobs.lock().await.as_slice(), &[job("e")]);
        assert!(scheduler.pending().is_empty());
    }
}
