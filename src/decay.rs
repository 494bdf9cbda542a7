use crate::error::{ScheduleError, ScheduleResult};
use crate::models::RetentionEstimate;

/// Sampled forgetting-curve values that override the exponential model.
pub const DECAY_ANCHORS: [(i64, u8); 5] = [(1, 58), (2, 44), (7, 33), (14, 28), (30, 21)];

/// Long-term retention never drops below this percentage.
pub const DECAY_FLOOR_PERCENT: u8 = 20;

/// Denominator of the exponent in `100 * e^(-days / k)`.
pub const DECAY_TIME_CONSTANT_DAYS: f64 = 5.0;

/// Estimated percentage of material still remembered `elapsed_days` after
/// the last exposure. Always within `[DECAY_FLOOR_PERCENT, 100]`.
pub fn estimate_retention(elapsed_days: i64) -> ScheduleResult<u8> {
    if elapsed_days < 0 {
        return Err(ScheduleError::InvalidArgument {
            name: "elapsed_days",
            value: elapsed_days,
            reason: "must not be negative",
        });
    }

    if elapsed_days == 0 {
        return Ok(100);
    }

    if let Some(&(_, percent)) = DECAY_ANCHORS.iter().find(|(day, _)| *day == elapsed_days) {
        return Ok(percent);
    }

    let modeled = (100.0 * (-(elapsed_days as f64) / DECAY_TIME_CONSTANT_DAYS).exp()).round();
    // modeled is in (0, 100], the cast cannot truncate
    Ok((modeled as u8).max(DECAY_FLOOR_PERCENT))
}

/// [`estimate_retention`] for one document, keeping the inputs alongside the result.
pub fn retention_estimate(
    document_id: &str,
    elapsed_days: i64,
) -> ScheduleResult<RetentionEstimate> {
    Ok(RetentionEstimate {
        document_id: document_id.to_string(),
        elapsed_days,
        retention_percent: estimate_retention(elapsed_days)?,
    })
}

/// Whether `elapsed_days` has a sampled value in [`DECAY_ANCHORS`].
pub fn is_anchor_day(elapsed_days: i64) -> bool {
    DECAY_ANCHORS.iter().any(|(day, _)| *day == elapsed_days)
}
