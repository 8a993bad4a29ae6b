use crate::domain::blocks::ScheduleBlockKey;
use crate::domain::models::ScheduledSlot;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::CalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// A booking to be created for one scheduled slot of a task.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BookingRequest {
    pub task_id: String,
    pub title: String,
    pub date: NaiveDate,
    #[serde(with = "crate::domain::models::hhmm")]
    pub start_time: NaiveTime,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl BookingRequest {
    pub fn from_slot(task_id: impl Into<String>, title: impl Into<String>, slot: &ScheduledSlot) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            date: slot.date,
            start_time: slot.start_time,
            start_at: slot.start_at,
            end_at: slot.end_at,
        }
    }

    pub fn key(&self) -> ScheduleBlockKey {
        ScheduleBlockKey::new(self.task_id.clone(), self.date, self.start_time)
    }

    pub fn validate(&self) -> Result<(), InfraError> {
        if self.task_id.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "booking task_id must not be empty".to_string(),
            ));
        }
        if self.end_at <= self.start_at {
            return Err(InfraError::InvalidConfig(format!(
                "booking for {} must end after it starts",
                self.key()
            )));
        }
        Ok(())
    }
}

/// Calendar that holds the bookings created for scheduled work.
#[async_trait]
pub trait BookingCalendar: Send + Sync {
    /// Creates an external booking and returns its id.
    async fn create_booking(&self, request: &BookingRequest) -> Result<String, InfraError>;

    async fn delete_booking(&self, booking_id: &str) -> Result<(), InfraError>;
}

/// Source of events that occupy working time.
#[async_trait]
pub trait BusyCalendarSource: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError>;
}
