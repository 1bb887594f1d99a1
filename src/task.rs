//! Upload task record and its state machine.
//!
//! ```text
//! queued ──> uploading ──> succeeded
//!               │  ▲
//!               ▼  │
//!        retry-scheduled ──> failed
//! ```
//!
//! Only the queue scheduler mutates a task. Every transition method checks
//! the current status and refuses anything the diagram does not allow.

use crate::error::QueueError;
use crate::formats::TargetFormat;
use crate::validation::sanitize_filename_component;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier assigned at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Queued,
    Uploading,
    RetryScheduled,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Uploading => "uploading",
            TaskStatus::RetryScheduled => "retry-scheduled",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn all() -> [TaskStatus; 5] {
        [
            TaskStatus::Queued,
            TaskStatus::Uploading,
            TaskStatus::RetryScheduled,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
        ]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome stored on the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskResult {
    Uploaded { url: String },
    Failed { reason: String },
}

/// Opaque key/value pairs forwarded verbatim to the upload endpoint.
pub type TaskMetadata = BTreeMap<String, String>;

/// One captured-photo-to-uploaded-URL unit of work.
///
/// The payload itself lives next to the record in the task store and is
/// loaded only when an attempt is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    pub id: TaskId,
    pub filename: String,
    pub content_type: String,
    #[serde(default)]
    pub metadata: TaskMetadata,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    pub size_bytes: u64,
}

impl UploadTask {
    pub fn new(
        id: TaskId,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        metadata: TaskMetadata,
        size_bytes: u64,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            content_type: content_type.into(),
            metadata,
            status: TaskStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
            result: None,
            size_bytes,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Queued, or retry-scheduled with its backoff elapsed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TaskStatus::Queued => true,
            TaskStatus::RetryScheduled => self.next_attempt_at <= now,
            _ => false,
        }
    }

    /// Remote URL once the task has succeeded.
    pub fn url(&self) -> Option<&str> {
        match &self.result {
            Some(TaskResult::Uploaded { url }) => Some(url),
            _ => None,
        }
    }

    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<(), QueueError> {
        if !self.is_eligible(now) {
            return Err(self.invalid(TaskStatus::Uploading));
        }
        self.status = TaskStatus::Uploading;
        self.updated_at = now;
        Ok(())
    }

    pub fn record_success(&mut self, url: String, now: DateTime<Utc>) -> Result<(), QueueError> {
        if self.status != TaskStatus::Uploading {
            return Err(self.invalid(TaskStatus::Succeeded));
        }
        self.attempts += 1;
        self.status = TaskStatus::Succeeded;
        self.result = Some(TaskResult::Uploaded { url });
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed attempt. Schedules a retry after `retry_delay` while
    /// attempts remain, otherwise fails the task for good.
    pub fn record_failure(
        &mut self,
        reason: String,
        retry_delay: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        if self.status != TaskStatus::Uploading {
            return Err(self.invalid(TaskStatus::RetryScheduled));
        }
        self.attempts += 1;
        self.updated_at = now;
        if self.attempts < self.max_attempts {
            self.status = TaskStatus::RetryScheduled;
            self.next_attempt_at =
                now + Duration::from_std(retry_delay).unwrap_or_else(|_| Duration::zero());
            self.last_error = Some(reason);
        } else {
            self.status = TaskStatus::Failed;
            self.completed_at = Some(now);
            self.result = Some(TaskResult::Failed {
                reason: reason.clone(),
            });
            self.last_error = Some(reason);
        }
        Ok(())
    }

    /// Returns a task left in `uploading` by a dead scheduler to the
    /// schedule. The interrupted attempt is not counted. Returns whether the
    /// task changed.
    pub fn recover_interrupted(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Uploading {
            return false;
        }
        self.status = if self.attempts == 0 {
            TaskStatus::Queued
        } else {
            TaskStatus::RetryScheduled
        };
        self.next_attempt_at = now;
        self.updated_at = now;
        true
    }

    /// Whether a terminal task has outlived the completed-log grace period.
    pub fn is_expired(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        match (self.is_terminal(), self.completed_at) {
            (true, Some(completed_at)) => completed_at + retention <= now,
            _ => false,
        }
    }

    fn invalid(&self, to: TaskStatus) -> QueueError {
        QueueError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }
}

/// Upload filename: `checkpoint-<context>-<epoch millis>.<ext>`.
pub fn derive_filename(context_id: &str, captured_at: DateTime<Utc>, format: TargetFormat) -> String {
    let context = sanitize_filename_component(context_id);
    format!(
        "checkpoint-{}-{}.{}",
        context,
        captured_at.timestamp_millis(),
        format.extension()
    )
}
