use crate::domain::models::{hhmm, format_hhmm, parse_hhmm, validate_non_empty, ScheduleResult, ScheduledSlot};
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

const KEY_SEPARATOR: char = '|';

/// Identity of one accepted placement: task, local date and the start time
/// the allocator produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScheduleBlockKey {
    pub task_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
}

impl ScheduleBlockKey {
    pub fn new(task_id: impl Into<String>, date: NaiveDate, start_time: NaiveTime) -> Self {
        Self {
            task_id: task_id.into(),
            date,
            start_time: truncate_to_minute(start_time),
        }
    }

    pub fn for_slot(task_id: &str, slot: &ScheduledSlot) -> Self {
        Self::new(task_id, slot.date, slot.start_time)
    }

    /// Parses `"{taskId}|{date}|{HH:MM}"`. Task ids may themselves contain `|`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut parts = raw.rsplitn(3, KEY_SEPARATOR);
        let (Some(start_time), Some(date), Some(task_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("schedule block key must be taskId|date|HH:MM: {raw}"));
        };
        validate_non_empty(task_id, "schedule_block.task_id")?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| "schedule_block.date must be YYYY-MM-DD".to_string())?;
        let start_time = parse_hhmm(start_time)
            .ok_or_else(|| "schedule_block.start_time must be HH:MM".to_string())?;
        Ok(Self::new(task_id, date, start_time))
    }
}

impl fmt::Display for ScheduleBlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{}",
            self.task_id,
            self.date.format("%Y-%m-%d"),
            format_hhmm(self.start_time)
        )
    }
}

/// A registered placement backed by an external booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleBlock {
    pub key: ScheduleBlockKey,
    pub external_booking_id: String,
    pub registered_at: DateTime<Utc>,
}

impl ScheduleBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.key.task_id, "schedule_block.task_id")?;
        validate_non_empty(&self.external_booking_id, "schedule_block.external_booking_id")
    }
}

/// One slot of the current proposal, with its registration if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedBlock {
    pub key: ScheduleBlockKey,
    pub slot: ScheduledSlot,
    pub booking_id: Option<String>,
}

impl ProposedBlock {
    pub fn is_registered(&self) -> bool {
        self.booking_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BlockReconciliation {
    pub proposed: Vec<ProposedBlock>,
    /// Registered blocks whose key matches no slot of the current proposal.
    pub orphaned: Vec<ScheduleBlock>,
}

impl BlockReconciliation {
    pub fn registered_count(&self) -> usize {
        self.proposed
            .iter()
            .filter(|proposed| proposed.is_registered())
            .count()
    }
}

/// Matches registered blocks against a fresh proposal by exact key.
///
/// A block whose placement moved is reported as orphaned next to an
/// unregistered proposal; it is never carried over to the new start time.
pub fn reconcile_blocks(result: &ScheduleResult, blocks: &[ScheduleBlock]) -> BlockReconciliation {
    let registered = blocks
        .iter()
        .map(|block| (&block.key, block))
        .collect::<HashMap<_, _>>();

    let mut matched = HashSet::new();
    let mut proposed = Vec::new();
    for suggestion in &result.suggestions {
        for slot in &suggestion.scheduled_slots {
            let key = ScheduleBlockKey::for_slot(&suggestion.task_id, slot);
            let booking_id = registered
                .get(&key)
                .map(|block| block.external_booking_id.clone());
            if booking_id.is_some() {
                matched.insert(key.clone());
            }
            proposed.push(ProposedBlock {
                key,
                slot: slot.clone(),
                booking_id,
            });
        }
    }

    let orphaned = blocks
        .iter()
        .filter(|block| !matched.contains(&block.key))
        .cloned()
        .collect();

    BlockReconciliation { proposed, orphaned }
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|time| time.with_nanosecond(0))
        .unwrap_or(time)
}
