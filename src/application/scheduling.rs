use crate::domain::allocator::allocate;
use crate::domain::capacity::{extract_free_slots, working_windows};
use crate::domain::error::SchedulingError;
use crate::domain::models::{FreeSlot, ScheduleResult, WorkPolicy};
use crate::domain::roster::{partition_roster, TaskRosterEntry};
use crate::infrastructure::booking_calendar::BusyCalendarSource;
use crate::infrastructure::config::{load_work_policy, read_horizon_days, read_timezone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::busy_intervals;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Hands out increasing tickets; only the latest ticket is current.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: AtomicU64,
}

impl RequestTracker {
    pub fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub roster: Vec<TaskRosterEntry>,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub policy: WorkPolicy,
    pub timezone: Tz,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScheduleOutcome {
    pub request_id: u64,
    pub result: ScheduleResult,
    pub free_slots: Vec<FreeSlot>,
    pub unestimated: Vec<String>,
    pub undated: Vec<String>,
}

/// Working policy, timezone and horizon read from the workspace config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub policy: WorkPolicy,
    pub timezone: Tz,
    pub horizon_days: u32,
}

impl SchedulerSettings {
    pub fn load(config_dir: &Path) -> Result<Self, InfraError> {
        Ok(Self {
            policy: load_work_policy(config_dir)?,
            timezone: read_timezone(config_dir)?,
            horizon_days: read_horizon_days(config_dir)?,
        })
    }

    /// Request covering `now` through the end of the configured horizon.
    pub fn request(&self, roster: Vec<TaskRosterEntry>, now: DateTime<Utc>) -> ScheduleRequest {
        ScheduleRequest {
            roster,
            range_start: now,
            range_end: now + Duration::days(i64::from(self.horizon_days)),
            policy: self.policy,
            timezone: self.timezone,
        }
    }
}

pub struct SchedulingService<S>
where
    S: BusyCalendarSource,
{
    busy_source: Arc<S>,
    tracker: RequestTracker,
    now_provider: NowProvider,
}

impl<S> SchedulingService<S>
where
    S: BusyCalendarSource,
{
    pub fn new(busy_source: Arc<S>) -> Self {
        Self {
            busy_source,
            tracker: RequestTracker::default(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Fetches busy time, extracts free capacity and allocates the roster.
    ///
    /// Fails with `Superseded` when a newer computation started while the
    /// busy events were being fetched.
    pub async fn compute(&self, request: ScheduleRequest) -> Result<ScheduleOutcome, InfraError> {
        request
            .policy
            .validate()
            .map_err(SchedulingError::InvalidPolicy)?;
        let partition = partition_roster(request.roster)?;

        let ticket = self.tracker.begin();
        let now = (self.now_provider)();
        let windows = working_windows(
            request.range_start,
            request.range_end,
            &request.policy,
            now,
            request.timezone,
        );

        let events = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => self.busy_source.list_events(first.start, last.end).await?,
            _ => Vec::new(),
        };
        if !self.tracker.is_current(ticket) {
            tracing::warn!(request_id = ticket, "discarding superseded scheduling result");
            return Err(InfraError::Superseded(ticket));
        }

        let busy = busy_intervals(&events)?;
        let free_slots = extract_free_slots(
            &busy,
            request.range_start,
            request.range_end,
            &request.policy,
            now,
            request.timezone,
        )?;
        let result = allocate(&partition.schedulable, free_slots.clone(), now, request.timezone);

        tracing::info!(
            request_id = ticket,
            busy = busy.len(),
            free_slots = free_slots.len(),
            suggestions = result.suggestions.len(),
            unschedulable = result.unschedulable.len(),
            unestimated = partition.unestimated.len(),
            undated = partition.undated.len(),
            "schedule computed"
        );

        Ok(ScheduleOutcome {
            request_id: ticket,
            result,
            free_slots,
            unestimated: partition.unestimated,
            undated: partition.undated,
        })
    }
}
