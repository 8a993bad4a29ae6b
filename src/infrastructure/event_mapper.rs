use crate::domain::models::BusyInterval;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};

const STATUS_CANCELLED: &str = "cancelled";
const TRANSPARENCY_TRANSPARENT: &str = "transparent";

/// Start or end of a calendar event. Timed events carry `dateTime`,
/// all-day events carry `date`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CalendarEventDateTime {
    pub fn timed(value: impl Into<String>) -> Self {
        Self {
            date_time: Some(value.into()),
            date: None,
            time_zone: None,
        }
    }

    pub fn all_day(value: impl Into<String>) -> Self {
        Self {
            date_time: None,
            date: Some(value.into()),
            time_zone: None,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparency: Option<String>,
    pub start: CalendarEventDateTime,
    pub end: CalendarEventDateTime,
}

impl CalendarEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day() || self.end.is_all_day()
    }

    fn is_cancelled(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case(STATUS_CANCELLED))
    }

    fn is_transparent(&self) -> bool {
        self.transparency
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case(TRANSPARENCY_TRANSPARENT))
    }
}

/// Maps a timed, blocking event to a busy interval.
///
/// All-day, cancelled and free ("transparent") events yield `None`, as do
/// zero-length events. Unparseable timestamps are an error.
pub fn to_busy_interval(event: &CalendarEvent) -> Result<Option<BusyInterval>, InfraError> {
    if event.is_all_day() || event.is_cancelled() || event.is_transparent() {
        return Ok(None);
    }

    let start = parse_event_time(&event.start, "start.dateTime")?;
    let end = parse_event_time(&event.end, "end.dateTime")?;
    if end <= start {
        return Ok(None);
    }
    Ok(Some(BusyInterval::new(start, end)))
}

pub fn busy_intervals(events: &[CalendarEvent]) -> Result<Vec<BusyInterval>, InfraError> {
    let mut intervals = Vec::with_capacity(events.len());
    for event in events {
        if let Some(interval) = to_busy_interval(event)? {
            intervals.push(interval);
        }
    }
    Ok(intervals)
}

fn parse_event_time(
    value: &CalendarEventDateTime,
    field_name: &str,
) -> Result<DateTime<Utc>, InfraError> {
    let raw = value.date_time.as_deref().ok_or_else(|| {
        InfraError::Calendar(format!("calendar event {field_name} is missing"))
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::Calendar(format!(
                "invalid calendar event {field_name} '{raw}': {error}"
            ))
        })
}
