use crate::domain::error::SchedulingError;
use crate::domain::models::{validate_non_empty, Priority, SchedulableTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A task as the persistence layer hands it over, before any filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRosterEntry {
    pub id: String,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub priority: Priority,
}

/// Roster split into allocator input and the tasks kept out of it.
///
/// `unestimated` and `undated` hold task ids. Neither list overlaps the
/// allocator's `unschedulable` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RosterPartition {
    pub schedulable: Vec<SchedulableTask>,
    pub unestimated: Vec<String>,
    pub undated: Vec<String>,
}

pub fn partition_roster(entries: Vec<TaskRosterEntry>) -> Result<RosterPartition, SchedulingError> {
    let mut partition = RosterPartition::default();
    for entry in entries {
        validate_non_empty(&entry.id, "task.id").map_err(SchedulingError::InvalidTask)?;

        let estimated_hours = entry
            .estimated_hours
            .filter(|hours| hours.is_finite() && *hours > 0.0);
        let Some(estimated_hours) = estimated_hours else {
            partition.unestimated.push(entry.id);
            continue;
        };
        let Some(due_date) = entry.due_date else {
            partition.undated.push(entry.id);
            continue;
        };

        partition.schedulable.push(SchedulableTask {
            id: entry.id,
            title: entry.title,
            due_date,
            estimated_hours,
            priority: entry.priority,
        });
    }
    Ok(partition)
}
