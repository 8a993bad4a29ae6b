//! Deadline-aware capacity scheduling.
//!
//! Busy calendar time and a working-hours policy become free slots
//! ([`extract_free_slots`]), tasks are placed into them earliest deadline
//! first ([`allocate`]), and accepted placements are booked through the
//! [`ScheduleBlockRegistry`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::registry::{ScheduleBlockRegistry, ToggleOutcome};
pub use application::scheduling::{
    RequestTracker, ScheduleOutcome, ScheduleRequest, SchedulerSettings, SchedulingService,
};
pub use domain::allocator::allocate;
pub use domain::blocks::{reconcile_blocks, BlockReconciliation, ScheduleBlock, ScheduleBlockKey};
pub use domain::capacity::extract_free_slots;
pub use domain::error::SchedulingError;
pub use domain::models::{
    BusyInterval, FreeSlot, Priority, SchedulableTask, ScheduleResult, ScheduledSlot,
    SuggestionStatus, TaskSuggestion, UnschedulableTask, WorkPolicy,
};
pub use domain::roster::{partition_roster, RosterPartition, TaskRosterEntry};
pub use infrastructure::booking_calendar::{BookingCalendar, BookingRequest, BusyCalendarSource};
pub use infrastructure::error::InfraError;
pub use infrastructure::schedule_block_store::{
    InMemoryScheduleBlockRepository, ScheduleBlockRepository, SqliteScheduleBlockRepository,
};
pub use infrastructure::telemetry::init_tracing;
