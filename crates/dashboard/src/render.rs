//! Terminal output

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tuneboard_reconciler::{DashboardRow, Notification, NotificationLevel};

/// Print notifications as they arrive; ends when every sender is gone
pub fn spawn_printer(mut rx: UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            eprintln!("{}", notification_line(&notification));
        }
    })
}

pub fn notification_line(n: &Notification) -> String {
    let marker = match n.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
        NotificationLevel::Warning => "warn",
        NotificationLevel::Info => "info",
    };
    format!("[{}] {}: {}", marker, n.title, n.message)
}

pub fn print_rows(rows: &[DashboardRow]) {
    if rows.is_empty() {
        println!("No documents uploaded yet.");
        return;
    }

    println!(
        "{:<38} {:<28} {:>10} {:<6} {:<20} {:<14} {:<18} {}",
        "ID", "FILE", "SIZE (KB)", "EXT", "UPLOADED", "DATASET", "MODEL", "ACTIONS"
    );
    for row in rows {
        println!("{}", row_line(row));
    }
}

pub fn row_line(row: &DashboardRow) -> String {
    let doc = &row.document;
    let view = &row.view;

    let mut actions = Vec::new();
    if view.actions.create_dataset {
        actions.push("dataset");
    }
    if view.actions.train {
        actions.push(if view.is_training { "progress" } else { "train" });
    }
    if view.actions.test {
        actions.push("test");
    }
    if view.actions.download {
        actions.push("download");
    }
    if view.actions.delete {
        actions.push("delete");
    }

    format!(
        "{:<38} {:<28} {:>10.2} {:<6} {:<20} {:<14} {:<18} {}",
        doc.id,
        truncate(&doc.file_name, 28),
        doc.size_kb(),
        doc.file_extension,
        doc.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        view.dataset_label(),
        view.status_label(),
        actions.join(",")
    )
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tuneboard_common::models::Document;
    use tuneboard_reconciler::ReconciledView;

    #[test]
    fn test_row_line() {
        let document = Document {
            id: "1".to_string(),
            file_name: "a.txt".to_string(),
            file_size: 2048,
            file_extension: ".txt".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            file_path: "uploads/a.txt".to_string(),
            alpaca_path: Some(String::new()),
            trained_model_path: None,
            training_status: None,
        };
        let view = ReconciledView::derive(&document, None);
        let line = row_line(&DashboardRow { document, view });

        assert!(line.contains("2.00"));
        assert!(line.contains("Not generated"));
        assert!(line.contains("Not trained"));
        assert!(line.ends_with("dataset,delete"));
    }

    #[test]
    fn test_notification_line() {
        let line = notification_line(&Notification::success("Training Completed!", "done"));
        assert_eq!(line, "[ok] Training Completed!: done");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-file-name.pdf", 10), "a-very-...");
    }
}
