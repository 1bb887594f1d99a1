//! One-shot completion subscriptions keyed by task id.
//!
//! A subscriber is told exactly once about its task's terminal state: right
//! away when the stored task is already terminal, otherwise when the
//! scheduler dispatches the outcome. Subscriptions whose task is pruned
//! before completion resolve to `TaskNotFound`.

use crate::error::QueueError;
use crate::store::TaskStore;
use crate::task::{TaskId, TaskResult, TaskStatus, UploadTask};
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded {
        task_id: TaskId,
        url: String,
        attempts: u32,
    },
    Failed {
        task_id: TaskId,
        reason: String,
        attempts: u32,
    },
}

impl TaskOutcome {
    /// Outcome of a terminal task, `None` while it is still active.
    pub fn from_task(task: &UploadTask) -> Option<Self> {
        match (task.status, &task.result) {
            (TaskStatus::Succeeded, Some(TaskResult::Uploaded { url })) => {
                Some(TaskOutcome::Succeeded {
                    task_id: task.id,
                    url: url.clone(),
                    attempts: task.attempts,
                })
            }
            (TaskStatus::Failed, result) => {
                let reason = match result {
                    Some(TaskResult::Failed { reason }) => reason.clone(),
                    _ => task
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "upload failed".to_string()),
                };
                Some(TaskOutcome::Failed {
                    task_id: task.id,
                    reason,
                    attempts: task.attempts,
                })
            }
            _ => None,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            TaskOutcome::Succeeded { task_id, .. } | TaskOutcome::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TaskOutcome::Succeeded { attempts, .. } | TaskOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

type Subscriber = oneshot::Sender<Result<TaskOutcome, QueueError>>;

/// Pending completion for one subscriber.
#[derive(Debug)]
pub struct Completion {
    task_id: TaskId,
    rx: oneshot::Receiver<Result<TaskOutcome, QueueError>>,
}

impl Completion {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Resolves once the task is terminal. A queue dropped before that
    /// yields `QueueError::Shutdown`.
    pub async fn wait(self) -> Result<TaskOutcome, QueueError> {
        self.rx.await.map_err(|_| QueueError::Shutdown)?
    }
}

#[derive(Debug, Default)]
pub struct CompletionNotifier {
    subscribers: Mutex<HashMap<TaskId, Vec<Subscriber>>>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber, reconciling against the stored task state.
    ///
    /// The registry lock is held across the store read, and [`dispatch`]
    /// takes the same lock after the terminal state has been persisted, so a
    /// subscriber is either served from the store or from the dispatch,
    /// never both and never neither.
    ///
    /// [`dispatch`]: CompletionNotifier::dispatch
    pub async fn subscribe(
        &self,
        store: &dyn TaskStore,
        task_id: TaskId,
    ) -> Result<Completion, QueueError> {
        let (tx, rx) = oneshot::channel();
        let mut subscribers = self.subscribers.lock().await;

        match store.get(task_id).await? {
            None => {
                let _ = tx.send(Err(QueueError::TaskNotFound(task_id)));
            }
            Some(task) => match TaskOutcome::from_task(&task) {
                Some(outcome) => {
                    let _ = tx.send(Ok(outcome));
                }
                None => subscribers.entry(task_id).or_default().push(tx),
            },
        }

        Ok(Completion { task_id, rx })
    }

    /// Delivers a terminal outcome to every registered subscriber of its task.
    pub async fn dispatch(&self, outcome: TaskOutcome) -> usize {
        let waiting = self
            .subscribers
            .lock()
            .await
            .remove(&outcome.task_id())
            .unwrap_or_default();
        let delivered = waiting.len();
        for tx in waiting {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(Ok(outcome.clone()));
        }
        delivered
    }

    /// Fails every subscriber of a task that no longer exists.
    pub async fn reject(&self, task_id: TaskId) -> usize {
        let waiting = self
            .subscribers
            .lock()
            .await
            .remove(&task_id)
            .unwrap_or_default();
        let rejected = waiting.len();
        for tx in waiting {
            let _ = tx.send(Err(QueueError::TaskNotFound(task_id)));
        }
        rejected
    }

    pub async fn pending(&self, task_id: TaskId) -> usize {
        self.subscribers
            .lock()
            .await
            .get(&task_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTaskStore;
    use crate::task::TaskMetadata;
    use chrono::Utc;

    async fn stored_task(store: &MemoryTaskStore) -> UploadTask {
        let task = UploadTask::new(
            TaskId::new(),
            "f.jpg",
            "image/jpeg",
            TaskMetadata::new(),
            1,
            3,
            Utc::now(),
        );
        store.insert(&task, b"x").await.unwrap();
        task
    }

    #[tokio::test]
    async fn test_every_subscriber_notified_once() {
        let store = MemoryTaskStore::new();
        let notifier = CompletionNotifier::new();
        let mut task = stored_task(&store).await;

        let first = notifier.subscribe(&store, task.id).await.unwrap();
        let second = notifier.subscribe(&store, task.id).await.unwrap();
        assert_eq!(notifier.pending(task.id).await, 2);

        task.begin_attempt(Utc::now()).unwrap();
        task.record_success("https://x/1".into(), Utc::now()).unwrap();
        store.update(&task).await.unwrap();
        let outcome = TaskOutcome::from_task(&task).unwrap();
        assert_eq!(notifier.dispatch(outcome.clone()).await, 2);
        assert_eq!(notifier.dispatch(outcome.clone()).await, 0);

        assert_eq!(first.wait().await.unwrap(), outcome);
        assert_eq!(second.wait().await.unwrap(), outcome);
    }

    #[tokio::test]
    async fn test_late_subscriber_served_from_store() {
        let store = MemoryTaskStore::new();
        let notifier = CompletionNotifier::new();
        let mut task = stored_task(&store).await;
        task.max_attempts = 1;
        task.begin_attempt(Utc::now()).unwrap();
        task.record_failure("503".into(), std::time::Duration::ZERO, Utc::now())
            .unwrap();
        store.update(&task).await.unwrap();

        let late = notifier.subscribe(&store, task.id).await.unwrap();
        assert_eq!(notifier.pending(task.id).await, 0);
        match late.wait().await.unwrap() {
            TaskOutcome::Failed {
                reason, attempts, ..
            } => {
                assert_eq!(reason, "503");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_and_pruned_tasks_fail_loudly() {
        let store = MemoryTaskStore::new();
        let notifier = CompletionNotifier::new();

        let missing = TaskId::new();
        let completion = notifier.subscribe(&store, missing).await.unwrap();
        assert!(matches!(
            completion.wait().await,
            Err(QueueError::TaskNotFound(id)) if id == missing
        ));

        let task = stored_task(&store).await;
        let waiting = notifier.subscribe(&store, task.id).await.unwrap();
        store.remove(task.id).await.unwrap();
        assert_eq!(notifier.reject(task.id).await, 1);
        assert!(matches!(
            waiting.wait().await,
            Err(QueueError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_notifier_reports_shutdown() {
        let store = MemoryTaskStore::new();
        let notifier = CompletionNotifier::new();
        let task = stored_task(&store).await;
        let completion = notifier.subscribe(&store, task.id).await.unwrap();
        drop(notifier);
        assert!(matches!(completion.wait().await, Err(QueueError::Shutdown)));
    }
}
