//! Free-capacity extraction.
//!
//! Turns busy calendar intervals and a [`WorkPolicy`] into the free working
//! slots of every local day in a range. Days are resolved in the caller's
//! timezone; all instants stay in UTC.

use crate::domain::error::SchedulingError;
use crate::domain::models::{BusyInterval, FreeSlot, WorkPolicy};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Working window of a single local day, after the "now" cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn extract_free_slots(
    busy: &[BusyInterval],
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    policy: &WorkPolicy,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Result<Vec<FreeSlot>, SchedulingError> {
    policy.validate().map_err(SchedulingError::InvalidPolicy)?;

    let mut sorted = busy
        .iter()
        .copied()
        .filter(|interval| interval.end > interval.start)
        .collect::<Vec<_>>();
    sorted.sort_by(|left, right| left.start.cmp(&right.start));

    let mut slots = Vec::new();
    for window in working_windows(range_start, range_end, policy, now, timezone) {
        let before = slots.len();
        collect_day_slots(&window, &sorted, &mut slots);
        tracing::debug!(
            date = %window.date,
            slots = slots.len() - before,
            "extracted free slots for day"
        );
    }
    Ok(slots)
}

/// Local working windows for every eligible day in the range.
///
/// Weekend days are skipped when the policy asks for it, and today's window
/// starts no earlier than `now`. Earlier days clamp the same way, so windows
/// entirely in the past are dropped.
pub fn working_windows(
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    policy: &WorkPolicy,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Vec<DayWindow> {
    let first_day = range_start.with_timezone(&timezone).date_naive();
    let last_day = range_end.with_timezone(&timezone).date_naive();
    let today = now.with_timezone(&timezone).date_naive();

    first_day
        .iter_days()
        .take_while(|day| *day <= last_day)
        .filter(|day| !(policy.skip_weekends && is_weekend(day.weekday())))
        .filter_map(|day| {
            let day_start = local_hour(timezone, day, policy.work_start_hour)?;
            let day_end = local_hour(timezone, day, policy.work_end_hour)?;
            let start = if day <= today && day_start < now {
                now
            } else {
                day_start
            };
            (start < day_end).then_some(DayWindow {
                date: day,
                start,
                end: day_end,
            })
        })
        .collect()
}

fn collect_day_slots(window: &DayWindow, sorted_busy: &[BusyInterval], slots: &mut Vec<FreeSlot>) {
    let mut cursor = window.start;
    for interval in sorted_busy
        .iter()
        .filter(|interval| interval.overlaps(window.start, window.end))
    {
        let clipped_start = interval.start.max(window.start);
        let clipped_end = interval.end.min(window.end);
        if cursor < clipped_start {
            slots.extend(FreeSlot::from_gap(cursor, clipped_start));
        }
        cursor = cursor.max(clipped_end);
    }
    if cursor < window.end {
        slots.extend(FreeSlot::from_gap(cursor, window.end));
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// `day @ hour:00` in local time; hour 24 is the following midnight.
fn local_hour(timezone: Tz, day: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(0, 0, 0)? + Duration::hours(i64::from(hour));
    resolve_local(timezone, naive)
}

/// Picks the earlier instant for ambiguous local times and skips forward
/// past a DST gap.
fn resolve_local(timezone: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|value| value.with_timezone(&Utc))
}
