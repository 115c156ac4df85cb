use chrono::{DateTime, Duration, Months, Utc};

use crate::models::Frequency;

/// Contributions later than this after cycle start carry the late penalty.
pub fn late_threshold() -> Duration {
    Duration::hours(24)
}

/// End of the contribution window for a cycle starting at `start`.
pub fn cycle_end_date(start: DateTime<Utc>, frequency: Frequency) -> DateTime<Utc> {
    offset_by_periods(start, frequency, 1)
}

/// Due date of the payout slot at `position` (1-based): each slot is due one
/// frequency period after the previous one, slot 1 at cycle start.
pub fn payout_date(start: DateTime<Utc>, position: i32, frequency: Frequency) -> DateTime<Utc> {
    offset_by_periods(start, frequency, position.saturating_sub(1).max(0))
}

pub fn is_late(start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - start > late_threshold()
}

fn offset_by_periods(start: DateTime<Utc>, frequency: Frequency, periods: i32) -> DateTime<Utc> {
    match frequency {
        Frequency::Weekly => start + Duration::days(7 * i64::from(periods)),
        Frequency::Biweekly => start + Duration::days(14 * i64::from(periods)),
        Frequency::Monthly => start
            .checked_add_months(Months::new(periods as u32))
            .unwrap_or(start + Duration::days(30 * i64::from(periods))),
        Frequency::ThirtyDay => start + Duration::days(30 * i64::from(periods)),
    }
}
