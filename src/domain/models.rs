use crate::domain::error::SchedulingError;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest unit of capacity the extractor hands out.
pub const MIN_SLOT_HOURS: f64 = 0.5;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkPolicy {
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub skip_weekends: bool,
}

impl WorkPolicy {
    pub fn new(
        work_start_hour: u32,
        work_end_hour: u32,
        skip_weekends: bool,
    ) -> Result<Self, SchedulingError> {
        let policy = Self {
            work_start_hour,
            work_end_hour,
            skip_weekends,
        };
        policy.validate().map_err(SchedulingError::InvalidPolicy)?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.work_start_hour > 23 {
            return Err(format!(
                "policy.work_start_hour must be within 0..=23 (got {})",
                self.work_start_hour
            ));
        }
        if self.work_end_hour == 0 || self.work_end_hour > 24 {
            return Err(format!(
                "policy.work_end_hour must be within 1..=24 (got {})",
                self.work_end_hour
            ));
        }
        if self.work_end_hour <= self.work_start_hour {
            return Err(format!(
                "policy.work_end_hour ({}) must be after policy.work_start_hour ({})",
                self.work_end_hour, self.work_start_hour
            ));
        }
        Ok(())
    }
}

impl Default for WorkPolicy {
    fn default() -> Self {
        Self {
            work_start_hour: 9,
            work_end_hour: 18,
            skip_weekends: true,
        }
    }
}

/// A timed calendar event blocking `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// A span of working time with no calendar conflict.
///
/// `hours` is rounded to the nearest half hour when the slot is extracted and
/// is what the allocator consumes; `end` keeps the exact gap boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hours: f64,
}

impl FreeSlot {
    /// Returns `None` for gaps shorter than half an hour.
    pub fn from_gap(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        let exact = duration_to_hours(end - start);
        if exact < MIN_SLOT_HOURS {
            return None;
        }
        Some(Self {
            start,
            end,
            hours: round_to_half_hour(exact),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulableTask {
    pub id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub estimated_hours: f64,
    pub priority: Priority,
}

impl SchedulableTask {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        if !self.estimated_hours.is_finite() || self.estimated_hours <= 0.0 {
            return Err(format!(
                "task.estimated_hours must be > 0 (task {})",
                self.id
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Schedulable,
    Tight,
    Overdue,
}

/// One contiguous placement of part of a task's effort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledSlot {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub hours: f64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSuggestion {
    pub task_id: String,
    pub scheduled_slots: Vec<ScheduledSlot>,
    pub total_scheduled_hours: f64,
    pub status: SuggestionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnschedulableTask {
    pub task_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduleResult {
    pub suggestions: Vec<TaskSuggestion>,
    pub unschedulable: Vec<UnschedulableTask>,
    pub total_free_hours: f64,
}

impl ScheduleResult {
    pub fn suggestion_for(&self, task_id: &str) -> Option<&TaskSuggestion> {
        self.suggestions
            .iter()
            .find(|suggestion| suggestion.task_id == task_id)
    }

    pub fn total_scheduled_hours(&self) -> f64 {
        self.suggestions
            .iter()
            .map(|suggestion| suggestion.total_scheduled_hours)
            .sum()
    }
}

pub fn round_to_half_hour(hours: f64) -> f64 {
    (hours * 2.0).round() / 2.0
}

pub fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * MILLIS_PER_HOUR).round() as i64)
}

pub fn duration_to_hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / MILLIS_PER_HOUR
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

/// Serde adapter for wall-clock fields rendered as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_hhmm(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("expected HH:MM, got '{raw}'")))
    }
}
