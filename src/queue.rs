//! Durable upload queue and its scheduler.
//!
//! `enqueue` persists a task before returning. A single scheduler per queue
//! drains eligible tasks against an [`UploadEndpoint`] with bounded
//! concurrency, retries failures with backoff, and hands terminal outcomes
//! to the [`CompletionNotifier`] in the order they are recorded.

use crate::config::QueueConfig;
use crate::endpoint::{UploadEndpoint, UploadRequest};
use crate::error::{QueueError, UploadError};
use crate::formats::content_type_for;
use crate::notifier::{Completion, CompletionNotifier, TaskOutcome};
use crate::store::TaskStore;
use crate::task::{TaskId, TaskMetadata, TaskStatus, UploadTask};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Pause before the scheduler retries after the store itself failed.
const STORE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub queued: usize,
    pub uploading: usize,
    pub retry_scheduled: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl QueueSummary {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a UploadTask>) -> Self {
        let mut summary = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Queued => summary.queued += 1,
                TaskStatus::Uploading => summary.uploading += 1,
                TaskStatus::RetryScheduled => summary.retry_scheduled += 1,
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Tasks that still have work ahead of them.
    pub fn active(&self) -> usize {
        self.queued + self.uploading + self.retry_scheduled
    }

    pub fn total(&self) -> usize {
        self.active() + self.succeeded + self.failed
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Queued => self.queued,
            TaskStatus::Uploading => self.uploading,
            TaskStatus::RetryScheduled => self.retry_scheduled,
            TaskStatus::Succeeded => self.succeeded,
            TaskStatus::Failed => self.failed,
        }
    }
}

struct QueueInner {
    store: Arc<dyn TaskStore>,
    config: QueueConfig,
    notifier: CompletionNotifier,
    wake: Notify,
    running: AtomicBool,
}

impl QueueInner {
    async fn prune_completed(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let retention = self.config.completed_retention();
        let mut pruned = 0;
        for task in self.store.list().await? {
            if task.is_expired(retention, now) {
                self.store.remove(task.id).await?;
                self.notifier.reject(task.id).await;
                log::debug!("Pruned {} task {}", task.status, task.id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            log::info!("Pruned {} completed task(s)", pruned);
        }
        Ok(pruned)
    }
}

/// Cheaply cloneable handle to one queue instance.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    pub fn new(store: Arc<dyn TaskStore>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                config,
                notifier: CompletionNotifier::new(),
                wake: Notify::new(),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Persists a new task and returns its id.
    ///
    /// The task is durable once this returns. Works the same offline: the
    /// task simply waits in `queued` until an attempt succeeds.
    pub async fn enqueue(
        &self,
        payload: Vec<u8>,
        filename: impl Into<String>,
        metadata: TaskMetadata,
    ) -> Result<TaskId, QueueError> {
        if payload.is_empty() {
            return Err(QueueError::EmptyPayload);
        }

        let filename = filename.into();
        let mut id = TaskId::new();
        while self.inner.store.contains(id).await? {
            id = TaskId::new();
        }

        let task = UploadTask::new(
            id,
            filename.as_str(),
            content_type_for(&filename),
            metadata,
            payload.len() as u64,
            self.inner.config.max_attempts,
            Utc::now(),
        );
        self.inner.store.insert(&task, &payload).await?;
        log::info!(
            "Enqueued task {} ({}, {} bytes)",
            id,
            filename,
            payload.len()
        );

        self.inner.wake.notify_one();
        Ok(id)
    }

    /// One-shot subscription to a task's terminal outcome.
    pub async fn subscribe(&self, task_id: TaskId) -> Result<Completion, QueueError> {
        self.inner
            .notifier
            .subscribe(self.inner.store.as_ref(), task_id)
            .await
    }

    /// Runs `callback` exactly once with the task's terminal outcome, or with
    /// `TaskNotFound` when the task is unknown or pruned first.
    pub async fn on_complete<F>(&self, task_id: TaskId, callback: F) -> Result<JoinHandle<()>, QueueError>
    where
        F: FnOnce(Result<TaskOutcome, QueueError>) + Send + 'static,
    {
        let completion = self.subscribe(task_id).await?;
        Ok(tokio::spawn(async move {
            callback(completion.wait().await);
        }))
    }

    pub async fn task(&self, task_id: TaskId) -> Result<Option<UploadTask>, QueueError> {
        Ok(self.inner.store.get(task_id).await?)
    }

    pub async fn tasks(&self) -> Result<Vec<UploadTask>, QueueError> {
        Ok(self.inner.store.list().await?)
    }

    pub async fn summary(&self) -> Result<QueueSummary, QueueError> {
        let tasks = self.tasks().await?;
        Ok(QueueSummary::from_tasks(&tasks))
    }

    /// Removes terminal tasks older than the retention period. Subscribers
    /// still waiting on a removed task receive `TaskNotFound`.
    pub async fn prune_completed(&self) -> Result<usize, QueueError> {
        self.inner.prune_completed().await
    }

    /// Starts the scheduler. Only one may run per queue at a time.
    ///
    /// Tasks left in `uploading` by an earlier process are put back on the
    /// schedule first. Dropping the returned handle stops the scheduler just
    /// like [`SchedulerHandle::shutdown`], without waiting for it.
    pub fn start(&self, endpoint: Arc<dyn UploadEndpoint>) -> Result<SchedulerHandle, QueueError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler {
            inner: self.inner.clone(),
            endpoint,
            in_flight: HashMap::new(),
            results_tx,
            results_rx,
        };
        let join = tokio::spawn(scheduler.run(shutdown_rx));

        Ok(SchedulerHandle {
            shutdown: Some(shutdown_tx),
            join,
        })
    }
}

pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler and waits for it. In-flight attempts are aborted
    /// and their tasks go back on the schedule uncounted.
    pub async fn shutdown(mut self) -> Result<(), QueueError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.join.await.map_err(|e| {
            log::error!("Upload scheduler ended abnormally: {}", e);
            QueueError::Shutdown
        })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

struct AttemptResult {
    task_id: TaskId,
    outcome: Result<String, UploadError>,
}

/// Clears the running flag however the scheduler task ends.
struct RunningGuard(Arc<QueueInner>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

struct Scheduler {
    inner: Arc<QueueInner>,
    endpoint: Arc<dyn UploadEndpoint>,
    in_flight: HashMap<TaskId, JoinHandle<()>>,
    results_tx: mpsc::UnboundedSender<AttemptResult>,
    results_rx: mpsc::UnboundedReceiver<AttemptResult>,
}

impl Scheduler {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let _running = RunningGuard(self.inner.clone());
        let prune_interval = self.inner.config.prune_interval();
        let mut next_prune = Instant::now() + prune_interval;
        log::info!(
            "Upload scheduler started ({} endpoint, {} concurrent)",
            self.endpoint.name(),
            self.inner.config.max_concurrent_uploads
        );

        loop {
            let deadline = match self.fill_slots().await {
                Ok(Some(next_due)) => instant_at(next_due).min(next_prune),
                Ok(None) => next_prune,
                Err(e) => {
                    log::error!("Scheduling pass failed: {}", e);
                    (Instant::now() + STORE_RETRY_DELAY).min(next_prune)
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                Some(result) = self.results_rx.recv() => self.apply(result).await,
                _ = self.inner.wake.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }

            if Instant::now() >= next_prune {
                if let Err(e) = self.inner.prune_completed().await {
                    log::warn!("Pruning completed tasks failed: {}", e);
                }
                next_prune = Instant::now() + prune_interval;
            }
        }

        self.stop().await;
        log::info!("Upload scheduler stopped");
    }

    /// Dispatches eligible tasks into free slots, earliest due first.
    /// Returns when the next retry becomes due, if any is waiting.
    async fn fill_slots(&mut self) -> Result<Option<DateTime<Utc>>, QueueError> {
        let now = Utc::now();
        let mut candidates: Vec<UploadTask> = self
            .inner
            .store
            .list()
            .await?
            .into_iter()
            .filter(|t| !t.is_terminal() && !self.in_flight.contains_key(&t.id))
            .collect();
        candidates.sort_by(|a, b| {
            a.next_attempt_at
                .cmp(&b.next_attempt_at)
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut next_due: Option<DateTime<Utc>> = None;
        for mut task in candidates {
            if task.status == TaskStatus::Uploading {
                // No attempt of ours is running, so the process that owned it is gone.
                task.recover_interrupted(now);
                self.inner.store.update(&task).await?;
                log::warn!(
                    "Recovered interrupted task {} as {}",
                    task.id,
                    task.status
                );
            }

            if !task.is_eligible(now) {
                next_due = Some(next_due.map_or(task.next_attempt_at, |due| {
                    due.min(task.next_attempt_at)
                }));
                continue;
            }
            if self.in_flight.len() >= self.inner.config.max_concurrent_uploads {
                continue;
            }
            self.dispatch(task, now).await?;
        }

        Ok(next_due)
    }

    async fn dispatch(&mut self, mut task: UploadTask, now: DateTime<Utc>) -> Result<(), QueueError> {
        task.begin_attempt(now)?;
        self.inner.store.update(&task).await?;
        log::info!(
            "Uploading task {} ({}), attempt {}/{}",
            task.id,
            task.filename,
            task.attempts + 1,
            task.max_attempts
        );

        let task_id = task.id;
        let store = self.inner.store.clone();
        let endpoint = self.endpoint.clone();
        let results = self.results_tx.clone();
        let timeout = self.inner.config.upload_timeout();
        let handle = tokio::spawn(async move {
            let outcome = run_attempt(store, endpoint, task, timeout).await;
            let _ = results.send(AttemptResult { task_id, outcome });
        });
        self.in_flight.insert(task_id, handle);
        Ok(())
    }

    async fn apply(&mut self, result: AttemptResult) {
        self.in_flight.remove(&result.task_id);
        let task_id = result.task_id;
        if let Err(e) = self.record(result).await {
            log::error!("Failed to record attempt for task {}: {}", task_id, e);
        }
    }

    async fn record(&self, result: AttemptResult) -> Result<(), QueueError> {
        let now = Utc::now();
        let Some(mut task) = self.inner.store.get(result.task_id).await? else {
            log::warn!("Task {} disappeared during its upload", result.task_id);
            return Ok(());
        };

        match result.outcome {
            Ok(url) => {
                task.record_success(url, now)?;
                log::info!(
                    "Task {} uploaded after {} attempt(s)",
                    task.id,
                    task.attempts
                );
            }
            Err(err) => {
                let delay = self.inner.config.backoff.next_delay(task.attempts + 1);
                task.record_failure(err.to_string(), delay, now)?;
                if task.status == TaskStatus::Failed {
                    log::error!(
                        "Task {} failed after {} attempts: {}",
                        task.id,
                        task.attempts,
                        err
                    );
                } else {
                    log::warn!(
                        "Task {} attempt {}/{} failed: {}; retrying in {:?}",
                        task.id,
                        task.attempts,
                        task.max_attempts,
                        err,
                        delay
                    );
                }
            }
        }

        self.inner.store.update(&task).await?;
        if let Some(outcome) = TaskOutcome::from_task(&task) {
            self.inner.notifier.dispatch(outcome).await;
        }
        Ok(())
    }

    async fn stop(&mut self) {
        // Outcomes that already arrived are recorded rather than thrown away.
        while let Ok(result) = self.results_rx.try_recv() {
            self.apply(result).await;
        }

        let now = Utc::now();
        for (task_id, handle) in self.in_flight.drain() {
            handle.abort();
            match self.inner.store.get(task_id).await {
                Ok(Some(mut task)) => {
                    if task.recover_interrupted(now) {
                        if let Err(e) = self.inner.store.update(&task).await {
                            log::error!("Failed to requeue task {}: {}", task_id, e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => log::error!("Failed to requeue task {}: {}", task_id, e),
            }
        }
    }
}

async fn run_attempt(
    store: Arc<dyn TaskStore>,
    endpoint: Arc<dyn UploadEndpoint>,
    task: UploadTask,
    timeout: Duration,
) -> Result<String, UploadError> {
    let payload = store
        .payload(task.id)
        .await
        .map_err(|e| UploadError::Storage(e.to_string()))?;
    let request = UploadRequest {
        task_id: task.id,
        filename: task.filename,
        content_type: task.content_type,
        metadata: task.metadata,
        payload,
    };

    match tokio::time::timeout(timeout, endpoint.upload(request)).await {
        Ok(result) => result,
        Err(_) => Err(UploadError::Timeout(timeout.as_millis() as u64)),
    }
}

fn instant_at(at: DateTime<Utc>) -> Instant {
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + wait
}
