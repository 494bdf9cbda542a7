use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::decay::retention_estimate;
use crate::error::{ScheduleError, ScheduleResult};
use crate::interval::next_interval_days;
use crate::models::{
    Classification, Document, DocumentRecord, DueTodayEntry, OverdueEntry, RecordBatch,
    SkippedDocument, UpcomingEntry,
};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

enum Placement {
    Overdue(OverdueEntry),
    DueToday(DueTodayEntry),
    Upcoming(UpcomingEntry),
}

/// Whole days between `since` and `now`, rounded toward negative infinity.
pub fn elapsed_days(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Parses RFC 3339, a naive ISO date-time (taken as UTC) or a bare date.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

impl TryFrom<&DocumentRecord> for Document {
    type Error = ScheduleError;

    fn try_from(record: &DocumentRecord) -> Result<Self, Self::Error> {
        let created_at = parse_timestamp(&record.created_at).ok_or_else(|| {
            ScheduleError::malformed(
                &record.id,
                format!("unparseable created_at `{}`", record.created_at),
            )
        })?;

        let last_review_date = match record.last_review_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                ScheduleError::malformed(&record.id, format!("unparseable last_review_date `{raw}`"))
            })?),
        };

        let review_count = u32::try_from(record.review_count).map_err(|_| {
            ScheduleError::malformed(
                &record.id,
                format!("review_count {} is out of range", record.review_count),
            )
        })?;

        if let Some(last_review) = last_review_date {
            if last_review < created_at {
                return Err(ScheduleError::malformed(
                    &record.id,
                    "last_review_date precedes created_at",
                ));
            }
        }

        Ok(Document {
            id: record.id.clone(),
            title: record.title.clone(),
            subject: record
                .subject
                .as_deref()
                .map(str::trim)
                .filter(|subject| !subject.is_empty())
                .map(str::to_string),
            created_at,
            last_review_date,
            review_count,
        })
    }
}

fn place(document: &Document, now: DateTime<Utc>) -> ScheduleResult<Option<Placement>> {
    let Some(last_review) = document.last_review_date else {
        let days_since_creation = elapsed_days(document.created_at, now);
        if days_since_creation < 1 {
            return Ok(None);
        }

        let estimate = retention_estimate(&document.id, days_since_creation)?;
        return Ok(Some(Placement::Overdue(OverdueEntry {
            document: document.clone(),
            retention_percent: estimate.retention_percent,
            overdue_days: days_since_creation,
        })));
    };

    if last_review < document.created_at {
        return Err(ScheduleError::malformed(
            &document.id,
            "last_review_date precedes created_at",
        ));
    }

    let days_since_review = elapsed_days(last_review, now);
    if days_since_review < 0 {
        return Err(ScheduleError::malformed(
            &document.id,
            "last_review_date is after the classification time",
        ));
    }

    let next_due = next_interval_days(i64::from(document.review_count.max(1)))?;
    let estimate = retention_estimate(&document.id, days_since_review)?;
    debug!(
        document_id = %estimate.document_id,
        elapsed_days = estimate.elapsed_days,
        retention_percent = estimate.retention_percent,
        next_due,
        "estimated retention"
    );
    let retention_percent = estimate.retention_percent;
    let document = document.clone();

    let placement = match days_since_review.cmp(&next_due) {
        Ordering::Greater => Placement::Overdue(OverdueEntry {
            document,
            retention_percent,
            overdue_days: days_since_review - next_due,
        }),
        Ordering::Equal => Placement::DueToday(DueTodayEntry {
            document,
            retention_percent,
        }),
        Ordering::Less => Placement::Upcoming(UpcomingEntry {
            document,
            retention_percent,
            days_until_due: next_due - days_since_review,
        }),
    };

    Ok(Some(placement))
}

/// Splits `documents` into overdue, due-today and upcoming buckets as of `now`.
///
/// Never-reviewed documents younger than a day are left out. Documents that
/// cannot be classified, including ones whose last review precedes their
/// creation, land in `skipped` instead of aborting the pass.
/// Overdue entries are ordered by ascending retention; the other buckets keep
/// input order.
pub fn classify(documents: &[Document], now: DateTime<Utc>) -> Classification {
    let mut classification = Classification::default();

    for document in documents {
        match place(document, now) {
            Ok(Some(Placement::Overdue(entry))) => classification.overdue.push(entry),
            Ok(Some(Placement::DueToday(entry))) => classification.due_today.push(entry),
            Ok(Some(Placement::Upcoming(entry))) => classification.upcoming.push(entry),
            Ok(None) => debug!(document_id = %document.id, "document too new to review"),
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "skipping document");
                classification.skipped.push(skipped(&document.id, err));
            }
        }
    }

    classification
        .overdue
        .sort_by_key(|entry| entry.retention_percent);

    debug!(
        overdue = classification.overdue.len(),
        due_today = classification.due_today.len(),
        upcoming = classification.upcoming.len(),
        skipped = classification.skipped.len(),
        "classified documents"
    );

    classification
}

/// Validates raw records and classifies the ones that parse.
pub fn classify_records(records: &[DocumentRecord], now: DateTime<Utc>) -> Classification {
    let mut documents = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for record in records {
        match Document::try_from(record) {
            Ok(document) => documents.push(document),
            Err(err) => {
                warn!(document_id = %record.id, error = %err, "rejecting document record");
                rejected.push(skipped(&record.id, err));
            }
        }
    }

    let mut classification = classify(&documents, now);
    rejected.append(&mut classification.skipped);
    classification.skipped = rejected;
    classification
}

/// Classifies a loaded batch; rows the source could not read come first in `skipped`.
pub fn classify_batch(batch: &RecordBatch, now: DateTime<Utc>) -> Classification {
    let mut classification = classify_records(&batch.records, now);
    let mut skipped = batch.rejected.clone();
    skipped.append(&mut classification.skipped);
    classification.skipped = skipped;
    classification
}

fn skipped(document_id: &str, err: ScheduleError) -> SkippedDocument {
    let reason = match err {
        ScheduleError::MalformedInput { reason, .. } => reason,
        other => other.to_string(),
    };

    SkippedDocument {
        document_id: document_id.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::estimate_retention;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
    }

    fn document(id: &str, created_days_ago: i64, reviewed_days_ago: Option<i64>, count: u32) -> Document {
        Document {
            id: id.to_string(),
            title: format!("Notes {id}"),
            subject: Some("Biology".to_string()),
            created_at: now() - Duration::days(created_days_ago),
            last_review_date: reviewed_days_ago.map(|days| now() - Duration::days(days)),
            review_count: count,
        }
    }

    fn record(id: &str, created_at: &str, last_review: Option<&str>, count: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: "Lecture 4".to_string(),
            subject: None,
            created_at: created_at.to_string(),
            last_review_date: last_review.map(str::to_string),
            review_count: count,
        }
    }

    #[test]
    fn elapsed_days_floors_partial_days() {
        let start = now();
        assert_eq!(elapsed_days(start, start + Duration::hours(23)), 0);
        assert_eq!(elapsed_days(start, start + Duration::hours(25)), 1);
        assert_eq!(elapsed_days(start, start - Duration::hours(1)), -1);
    }

    #[test]
    fn new_unreviewed_document_is_excluded() {
        let fresh = Document {
            created_at: now() - Duration::hours(6),
            ..document("a", 0, None, 0)
        };
        let result = classify(&[fresh], now());
        assert!(result.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn unreviewed_document_from_three_days_ago_is_overdue() {
        let result = classify(&[document("b", 3, None, 0)], now());
        assert_eq!(result.overdue.len(), 1);
        let entry = &result.overdue[0];
        assert_eq!(entry.overdue_days, 3);
        assert_eq!(entry.retention_percent, estimate_retention(3).unwrap());
        assert_eq!(entry.retention_percent, 55);
    }

    #[test]
    fn single_review_a_week_ago_is_six_days_overdue() {
        let result = classify(&[document("c", 10, Some(7), 1)], now());
        assert_eq!(result.overdue.len(), 1);
        assert_eq!(result.overdue[0].overdue_days, 6);
        assert_eq!(result.overdue[0].retention_percent, 33);
    }

    #[test]
    fn second_review_three_days_ago_is_due_today() {
        let result = classify(&[document("d", 10, Some(3), 2)], now());
        assert_eq!(result.due_today.len(), 1);
        assert_eq!(result.due_today[0].retention_percent, 55);
        assert!(result.overdue.is_empty());
        assert!(result.upcoming.is_empty());
    }

    #[test]
    fn third_review_five_days_ago_is_upcoming() {
        let result = classify(&[document("e", 20, Some(5), 3)], now());
        assert_eq!(result.upcoming.len(), 1);
        assert_eq!(result.upcoming[0].days_until_due, 2);
        assert_eq!(result.upcoming[0].retention_percent, 37);
    }

    #[test]
    fn zero_review_count_with_review_date_uses_first_interval() {
        let result = classify(&[document("f", 5, Some(1), 0)], now());
        assert_eq!(result.due_today.len(), 1);
    }

    #[test]
    fn every_eligible_document_lands_in_exactly_one_bucket() {
        let mut documents = Vec::new();
        for created in 0..12 {
            documents.push(document(&format!("new-{created}"), created, None, 0));
            for reviewed in 0..=created {
                for count in 1..=7 {
                    documents.push(document(
                        &format!("rev-{created}-{reviewed}-{count}"),
                        created,
                        Some(reviewed),
                        count,
                    ));
                }
            }
        }

        let result = classify(&documents, now());
        let ids: Vec<&str> = result
            .overdue
            .iter()
            .map(|entry| entry.document.id.as_str())
            .chain(result.due_today.iter().map(|entry| entry.document.id.as_str()))
            .chain(result.upcoming.iter().map(|entry| entry.document.id.as_str()))
            .collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();

        assert_eq!(ids.len(), unique.len());
        assert!(result.skipped.is_empty());
        assert_eq!(ids.len(), documents.len() - 1);
        assert!(!unique.contains("new-0"));
    }

    #[test]
    fn overdue_bucket_is_sorted_by_retention() {
        let documents = vec![
            document("two-days", 2, None, 0),
            document("month", 40, Some(30), 2),
            document("four-days", 4, None, 0),
            document("week", 7, None, 0),
        ];
        let result = classify(&documents, now());
        let retention: Vec<u8> = result.overdue.iter().map(|entry| entry.retention_percent).collect();

        assert_eq!(retention, vec![21, 33, 44, 45]);
        assert!(retention.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn overdue_ties_keep_input_order() {
        let documents = vec![
            document("first", 20, None, 0),
            document("second", 25, None, 0),
        ];
        let result = classify(&documents, now());
        assert_eq!(result.overdue[0].document.id, "first");
        assert_eq!(result.overdue[1].document.id, "second");
    }

    #[test]
    fn upcoming_keeps_input_order() {
        let documents = vec![
            document("z", 30, Some(1), 4),
            document("a", 30, Some(2), 5),
            document("m", 30, Some(0), 3),
        ];
        let result = classify(&documents, now());
        let ids: Vec<&str> = result.upcoming.iter().map(|entry| entry.document.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn review_in_the_future_is_skipped() {
        let future = Document {
            last_review_date: Some(now() + Duration::days(2)),
            ..document("g", 5, None, 1)
        };
        let result = classify(&[future, document("h", 3, None, 0)], now());
        assert_eq!(result.overdue.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].document_id, "g");
    }

    #[test]
    fn review_before_creation_is_skipped_for_unvalidated_documents() {
        let result = classify(&[document("i", 2, Some(5), 1)], now());
        assert!(result.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, "last_review_date precedes created_at");
    }

    #[test]
    fn batch_rejects_are_reported_ahead_of_classification_skips() {
        let batch = RecordBatch {
            records: vec![
                record("fine", "2025-03-15T12:00:00Z", None, 0),
                record("garbled", "someday", None, 0),
            ],
            rejected: vec![SkippedDocument {
                document_id: "row 2".to_string(),
                reason: "invalid row: missing review_count".to_string(),
            }],
        };
        let result = classify_batch(&batch, now());

        assert_eq!(result.overdue.len(), 1);
        let skipped: Vec<&str> = result.skipped.iter().map(|entry| entry.document_id.as_str()).collect();
        assert_eq!(skipped, vec!["row 2", "garbled"]);
        assert_eq!(result.summary().skipped_count, 2);
    }

    #[test]
    fn parses_supported_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 18, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-18T09:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-18T18:30:00+09:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-18T09:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-03-18T09:30:00.250000"),
            Some(expected + Duration::milliseconds(250))
        );
        assert_eq!(parse_timestamp("2025-03-18 09:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-03-18"),
            Some(Utc.with_ymd_and_hms(2025, 3, 18, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn record_conversion_validates_fields() {
        let ok = Document::try_from(&record("ok", "2025-03-01", Some("2025-03-05T10:00:00Z"), 2)).unwrap();
        assert_eq!(ok.review_count, 2);
        assert!(ok.last_review_date.is_some());

        let blank_review = Document::try_from(&record("blank", "2025-03-01", Some("  "), 0)).unwrap();
        assert_eq!(blank_review.last_review_date, None);

        assert!(Document::try_from(&record("bad-date", "03/01/2025", None, 0)).is_err());
        assert!(Document::try_from(&record("bad-review", "2025-03-01", Some("soon"), 1)).is_err());
        assert!(Document::try_from(&record("negative", "2025-03-01", None, -1)).is_err());
        assert!(Document::try_from(&record("backwards", "2025-03-05", Some("2025-03-01"), 1)).is_err());
    }

    #[test]
    fn malformed_records_are_reported_without_stopping_the_pass() {
        let records = vec![
            record("good", "2025-03-15T12:00:00Z", None, 0),
            record("broken", "not a date", None, 0),
            record("due", "2025-03-01T12:00:00Z", Some("2025-03-17T12:00:00Z"), 2),
        ];
        let result = classify_records(&records, now());

        assert_eq!(result.overdue.len(), 1);
        assert_eq!(result.overdue[0].document.id, "good");
        assert_eq!(result.due_today.len(), 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].document_id, "broken");
        assert!(result.skipped[0].reason.contains("created_at"));
    }

    #[test]
    fn summary_counts_each_bucket() {
        let documents = vec![
            document("o", 3, None, 0),
            document("t", 10, Some(3), 2),
            document("u", 10, Some(1), 3),
            document("u2", 10, Some(2), 3),
        ];
        let summary = classify(&documents, now()).summary();
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.today_count, 1);
        assert_eq!(summary.upcoming_count, 2);
        assert_eq!(summary.skipped_count, 0);
    }
}
