use crate::endpoint::UploadEndpoint;
use crate::error::QueueError;
use crate::notifier::TaskOutcome;
use crate::queue::UploadQueue;
use crate::task::TaskId;
use crate::utils::create_progress_bar;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happened to the tasks that were active when a drain began.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: Vec<(TaskId, String)>,
    pub failed: Vec<(TaskId, String)>,
    /// Tasks pruned or removed before they finished.
    pub missing: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.missing
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.missing == 0
    }
}

/// Runs the scheduler until every currently active task is terminal.
///
/// Tasks enqueued after the drain starts are uploaded if the scheduler gets
/// to them, but are not waited for.
pub async fn drain_queue(
    queue: &UploadQueue,
    endpoint: Arc<dyn UploadEndpoint>,
    quiet: bool,
) -> Result<DrainReport, QueueError> {
    let active: Vec<TaskId> = queue
        .tasks()
        .await?
        .into_iter()
        .filter(|t| !t.is_terminal())
        .map(|t| t.id)
        .collect();

    let mut report = DrainReport::default();
    if active.is_empty() {
        log::info!("Nothing to upload");
        return Ok(report);
    }

    log::info!(
        "Draining {} task(s) to the {} endpoint",
        active.len(),
        endpoint.name()
    );
    let scheduler = queue.start(endpoint)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for task_id in &active {
        let tx = tx.clone();
        queue
            .on_complete(*task_id, move |result| {
                let _ = tx.send(result);
            })
            .await?;
    }
    drop(tx);

    let progress = create_progress_bar(active.len() as u64, quiet);
    while let Some(result) = rx.recv().await {
        match result {
            Ok(TaskOutcome::Succeeded { task_id, url, .. }) => {
                progress.set_message(url.clone());
                report.succeeded.push((task_id, url));
            }
            Ok(TaskOutcome::Failed {
                task_id, reason, ..
            }) => {
                report.failed.push((task_id, reason));
            }
            Err(QueueError::TaskNotFound(task_id)) => {
                log::warn!("Task {} was removed before it finished", task_id);
                report.missing += 1;
            }
            Err(e) => {
                progress.abandon();
                scheduler.shutdown().await?;
                return Err(e);
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    scheduler.shutdown().await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::store::MemoryTaskStore;

    struct Unused;

    #[async_trait::async_trait]
    impl UploadEndpoint for Unused {
        async fn upload(
            &self,
            _request: crate::endpoint::UploadRequest,
        ) -> Result<String, crate::error::UploadError> {
            panic!("no task should be uploaded");
        }

        fn name(&self) -> &str {
            "unused"
        }
    }

    #[tokio::test]
    async fn test_drain_empty_queue_does_not_start_scheduler() {
        let queue = UploadQueue::new(Arc::new(MemoryTaskStore::new()), QueueConfig::default());
        let report = drain_queue(&queue, Arc::new(Unused), true).await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert!(report.is_success());
        assert!(!queue.is_running());
    }

    #[test]
    fn test_report_success() {
        let mut report = DrainReport::default();
        report.succeeded.push((TaskId::new(), "u".into()));
        assert!(report.is_success());
        report.failed.push((TaskId::new(), "503".into()));
        assert!(!report.is_success());
        assert_eq!(report.total(), 2);
    }
}
