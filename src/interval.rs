use chrono::{DateTime, Duration, Utc};

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::Document;

/// Days until the next review, indexed by completed review count minus one.
pub const INTERVAL_SCHEDULE_DAYS: [i64; 6] = [1, 3, 7, 14, 30, 60];

/// Interval before the next review after `review_count` completed reviews.
/// Saturates at the last schedule entry.
pub fn next_interval_days(review_count: i64) -> ScheduleResult<i64> {
    if review_count < 1 {
        return Err(ScheduleError::InvalidArgument {
            name: "review_count",
            value: review_count,
            reason: "must be at least 1",
        });
    }

    let last = INTERVAL_SCHEDULE_DAYS.len() - 1;
    let index = usize::try_from(review_count - 1).map_or(last, |index| index.min(last));
    Ok(INTERVAL_SCHEDULE_DAYS[index])
}

/// When `document` is next due, or `None` if it has never been reviewed.
pub fn next_due_at(document: &Document) -> Option<DateTime<Utc>> {
    let last_review = document.last_review_date?;
    let reviews = i64::from(document.review_count.max(1));
    // reviews >= 1 so the schedule lookup cannot fail
    let days = next_interval_days(reviews).unwrap_or(INTERVAL_SCHEDULE_DAYS[0]);
    Some(last_review + Duration::days(days))
}
