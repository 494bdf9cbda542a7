use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};

/// A document row as delivered by a listing source, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(alias = "document_id")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "subject_name")]
    pub subject: Option<String>,
    pub created_at: String,
    #[serde(default, alias = "last_reviewed_at")]
    pub last_review_date: Option<String>,
    #[serde(default)]
    pub review_count: i64,
}

/// A validated document snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_review_date: Option<DateTime<Utc>>,
    pub review_count: u32,
}

impl Document {
    /// Returns the document as it looks after one more completed review at `now`.
    ///
    /// Fails when `now` is earlier than the creation time or the previous review.
    pub fn reviewed_at(&self, now: DateTime<Utc>) -> ScheduleResult<Document> {
        if now < self.created_at {
            return Err(ScheduleError::malformed(
                &self.id,
                format!("review time {} precedes created_at", now.to_rfc3339()),
            ));
        }

        if let Some(last_review) = self.last_review_date {
            if now < last_review {
                return Err(ScheduleError::malformed(
                    &self.id,
                    format!("review time {} precedes the previous review", now.to_rfc3339()),
                ));
            }
        }

        Ok(Document {
            last_review_date: Some(now),
            review_count: self.review_count.saturating_add(1),
            ..self.clone()
        })
    }
}

/// Records loaded from a source, plus rows that could not be read as records.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<DocumentRecord>,
    pub rejected: Vec<SkippedDocument>,
}

impl From<Vec<DocumentRecord>> for RecordBatch {
    fn from(records: Vec<DocumentRecord>) -> Self {
        RecordBatch {
            records,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionEstimate {
    pub document_id: String,
    pub elapsed_days: i64,
    pub retention_percent: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverdueEntry {
    pub document: Document,
    pub retention_percent: u8,
    pub overdue_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DueTodayEntry {
    pub document: Document,
    pub retention_percent: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingEntry {
    pub document: Document,
    pub retention_percent: u8,
    pub days_until_due: i64,
}

/// A document left out of a classification pass, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub document_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub overdue: Vec<OverdueEntry>,
    pub due_today: Vec<DueTodayEntry>,
    pub upcoming: Vec<UpcomingEntry>,
    pub skipped: Vec<SkippedDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub overdue_count: usize,
    pub today_count: usize,
    pub upcoming_count: usize,
    pub skipped_count: usize,
}

impl Classification {
    pub fn summary(&self) -> QueueSummary {
        QueueSummary {
            overdue_count: self.overdue.len(),
            today_count: self.due_today.len(),
            upcoming_count: self.upcoming.len(),
            skipped_count: self.skipped.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.overdue.is_empty() && self.due_today.is_empty() && self.upcoming.is_empty()
    }
}
