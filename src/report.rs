use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Classification, Document};

pub fn document_label(document: &Document) -> String {
    match document.subject.as_deref() {
        Some(subject) => format!("{} ({})", document.title, subject),
        None => document.title.clone(),
    }
}

/// Average retention across overdue and due-today documents.
pub fn average_retention(classification: &Classification) -> Option<f64> {
    let values: Vec<u8> = classification
        .overdue
        .iter()
        .map(|entry| entry.retention_percent)
        .chain(classification.due_today.iter().map(|entry| entry.retention_percent))
        .collect();

    if values.is_empty() {
        return None;
    }

    let total: u32 = values.iter().map(|value| u32::from(*value)).sum();
    Some(f64::from(total) / values.len() as f64)
}

pub fn build_report(
    subject: Option<&str>,
    now: DateTime<Utc>,
    classification: &Classification,
) -> String {
    let summary = classification.summary();
    let mut output = String::new();
    let subject_label = subject.unwrap_or("all subjects");

    let _ = writeln!(output, "# Review Queue Report");
    let _ = writeln!(
        output,
        "Generated for {} as of {}",
        subject_label,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Overdue: {}", summary.overdue_count);
    let _ = writeln!(output, "- Due today: {}", summary.today_count);
    let _ = writeln!(output, "- Upcoming: {}", summary.upcoming_count);
    if let Some(average) = average_retention(classification) {
        let _ = writeln!(output, "- Average estimated retention: {average:.1}%");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overdue");

    if classification.overdue.is_empty() {
        let _ = writeln!(output, "Nothing overdue.");
    } else {
        for entry in classification.overdue.iter() {
            let _ = writeln!(
                output,
                "- {}: {}% retained, {} days overdue",
                document_label(&entry.document),
                entry.retention_percent,
                entry.overdue_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Due Today");

    if classification.due_today.is_empty() {
        let _ = writeln!(output, "No reviews scheduled for today.");
    } else {
        for entry in classification.due_today.iter() {
            let _ = writeln!(
                output,
                "- {}: {}% retained",
                document_label(&entry.document),
                entry.retention_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Upcoming");

    if classification.upcoming.is_empty() {
        let _ = writeln!(output, "No upcoming reviews.");
    } else {
        for entry in classification.upcoming.iter() {
            let _ = writeln!(
                output,
                "- {}: due in {} days",
                document_label(&entry.document),
                entry.days_until_due
            );
        }
    }

    if !classification.skipped.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Skipped Documents");
        for skipped in classification.skipped.iter() {
            let _ = writeln!(output, "- {}: {}", skipped.document_id, skipped.reason);
        }
    }

    output
}
