use crate::queue::QueueSummary;
use crate::task::{TaskStatus, UploadTask};
use crate::utils::format_file_size;
use std::fmt::Write;

/// Human-readable queue report: per-status counts followed by a task table.
pub fn format_status_report(tasks: &[UploadTask]) -> String {
    let summary = QueueSummary::from_tasks(tasks);
    let mut out = String::new();

    let _ = writeln!(out, "📊 Upload queue: {} task(s)", summary.total());
    for status in TaskStatus::all() {
        let _ = writeln!(out, "  {:<16} {}", status.as_str(), summary.count(status));
    }

    if tasks.is_empty() {
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<36}  {:<16}  {:>8}  {:>9}  {}",
        "ID", "STATUS", "ATTEMPTS", "SIZE", "FILE / RESULT"
    );
    for task in tasks {
        let detail = match (task.url(), &task.last_error) {
            (Some(url), _) => url.to_string(),
            (None, Some(error)) => format!("{} ({})", task.filename, error),
            (None, None) => task.filename.clone(),
        };
        let _ = writeln!(
            out,
            "{:<36}  {:<16}  {:>8}  {:>9}  {}",
            task.id,
            task.status.as_str(),
            format!("{}/{}", task.attempts, task.max_attempts),
            format_file_size(task.size_bytes),
            detail
        );
    }

    out
}

pub fn print_status_report(tasks: &[UploadTask]) {
    print!("{}", format_status_report(tasks));
}
