//! Deadline-first greedy allocation of free slots to tasks.
//!
//! Tasks are processed by due date (then priority) and each one walks the
//! shared slot pool in chronological order, taking what it needs. What an
//! earlier task consumes is gone for every later one. There is no
//! rebalancing once a slot has been consumed.

use crate::domain::models::{
    hours_to_duration, FreeSlot, SchedulableTask, ScheduleResult, ScheduledSlot,
    SuggestionStatus, TaskSuggestion, UnschedulableTask,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Arena of free slots owned by a single allocation run.
#[derive(Debug, Clone)]
pub struct SlotPool {
    slots: Vec<FreeSlot>,
}

impl SlotPool {
    pub fn new(slots: Vec<FreeSlot>) -> Self {
        Self { slots }
    }

    pub fn total_hours(&self) -> f64 {
        self.slots.iter().map(|slot| slot.hours).sum()
    }

    pub fn slots(&self) -> &[FreeSlot] {
        &self.slots
    }

    fn is_eligible(&self, index: usize, deadline: Option<DateTime<Utc>>) -> bool {
        let slot = &self.slots[index];
        slot.hours > 0.0 && deadline.is_none_or(|deadline| slot.start < deadline)
    }

    /// Takes up to `wanted` hours from the front of slot `index`.
    ///
    /// Returns the consumed span as `(start, end, hours)`.
    fn consume(&mut self, index: usize, wanted: f64) -> (DateTime<Utc>, DateTime<Utc>, f64) {
        let slot = &mut self.slots[index];
        let taken = wanted.min(slot.hours);
        let start = slot.start;
        let end = start + hours_to_duration(taken);
        if taken >= slot.hours {
            slot.hours = 0.0;
        } else {
            slot.start = end;
            slot.hours -= taken;
        }
        (start, end, taken)
    }
}

pub fn allocate(
    tasks: &[SchedulableTask],
    free_slots: Vec<FreeSlot>,
    now: DateTime<Utc>,
    timezone: Tz,
) -> ScheduleResult {
    let mut pool = SlotPool::new(free_slots);
    let total_free_hours = pool.total_hours();

    let mut result = ScheduleResult {
        suggestions: Vec::new(),
        unschedulable: Vec::new(),
        total_free_hours,
    };

    for task in allocation_order(tasks) {
        // Invalid estimates never reach the pool.
        if let Err(reason) = task.validate() {
            tracing::warn!(task_id = %task.id, %reason, "skipping task with invalid estimate");
            result.unschedulable.push(UnschedulableTask {
                task_id: task.id.clone(),
                reason,
            });
            continue;
        }
        match allocate_task(task, &mut pool, now, timezone) {
            Ok(suggestion) => result.suggestions.push(suggestion),
            Err(unschedulable) => result.unschedulable.push(unschedulable),
        }
    }

    tracing::debug!(
        tasks = tasks.len(),
        suggestions = result.suggestions.len(),
        unschedulable = result.unschedulable.len(),
        total_free_hours,
        remaining_hours = pool.total_hours(),
        "allocated free capacity"
    );
    result
}

/// Due date ascending, then priority (P0 first). Stable for full ties.
pub fn allocation_order(tasks: &[SchedulableTask]) -> Vec<&SchedulableTask> {
    let mut ordered = tasks.iter().collect::<Vec<_>>();
    ordered.sort_by(|left, right| {
        left.due_date
            .cmp(&right.due_date)
            .then_with(|| left.priority.cmp(&right.priority))
    });
    ordered
}

fn allocate_task(
    task: &SchedulableTask,
    pool: &mut SlotPool,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Result<TaskSuggestion, UnschedulableTask> {
    let is_overdue = task.due_date < now;
    let deadline = (!is_overdue).then_some(task.due_date);

    let mut remaining = task.estimated_hours;
    let mut scheduled_slots = Vec::new();
    for index in 0..pool.slots().len() {
        if remaining <= 0.0 {
            break;
        }
        if !pool.is_eligible(index, deadline) {
            continue;
        }
        let (start_at, end_at, hours) = pool.consume(index, remaining);
        remaining -= hours;
        scheduled_slots.push(to_scheduled_slot(start_at, end_at, hours, timezone));
    }

    let total_scheduled_hours = scheduled_slots.iter().map(|slot| slot.hours).sum::<f64>();
    let status = if remaining <= 0.0 {
        if is_overdue {
            SuggestionStatus::Overdue
        } else {
            SuggestionStatus::Schedulable
        }
    } else if total_scheduled_hours > 0.0 {
        SuggestionStatus::Tight
    } else {
        return Err(UnschedulableTask {
            task_id: task.id.clone(),
            reason: format!(
                "insufficient free time before deadline (needed: {}h, available: 0h)",
                task.estimated_hours
            ),
        });
    };

    Ok(TaskSuggestion {
        task_id: task.id.clone(),
        scheduled_slots,
        total_scheduled_hours,
        status,
    })
}

fn to_scheduled_slot(
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    hours: f64,
    timezone: Tz,
) -> ScheduledSlot {
    let local_start = start_at.with_timezone(&timezone);
    let local_end = end_at.with_timezone(&timezone);
    ScheduledSlot {
        date: local_start.date_naive(),
        start_time: local_start.time(),
        end_time: local_end.time(),
        hours,
        start_at,
        end_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capacity::extract_free_slots;
    use crate::domain::models::{format_hhmm, BusyInterval, Priority, WorkPolicy};
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, due: &str, hours: f64, priority: Priority) -> SchedulableTask {
        SchedulableTask {
            id: id.to_string(),
            title: format!("Task {id}"),
            due_date: fixed_time(due),
            estimated_hours: hours,
            priority,
        }
    }

    fn slot(start: &str, end: &str) -> FreeSlot {
        FreeSlot::from_gap(fixed_time(start), fixed_time(end)).expect("valid slot")
    }

    #[test]
    fn earlier_deadline_claims_shared_slot_first() {
        let tasks = vec![
            task("late", "2026-02-20T18:00:00Z", 3.0, Priority::P0),
            task("early", "2026-02-17T18:00:00Z", 3.0, Priority::P3),
        ];
        let slots = vec![slot("2026-02-16T09:00:00Z", "2026-02-16T13:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        let early = result.suggestion_for("early").expect("early suggestion");
        assert_eq!(early.status, SuggestionStatus::Schedulable);
        assert_eq!(early.total_scheduled_hours, 3.0);
        assert_eq!(early.scheduled_slots[0].start_at, fixed_time("2026-02-16T09:00:00Z"));

        let late = result.suggestion_for("late").expect("late suggestion");
        assert_eq!(late.status, SuggestionStatus::Tight);
        assert_eq!(late.total_scheduled_hours, 1.0);
        assert_eq!(late.scheduled_slots[0].start_at, fixed_time("2026-02-16T12:00:00Z"));
        assert_eq!(result.suggestions[0].task_id, "early");
    }

    #[test]
    fn priority_breaks_due_date_ties() {
        let tasks = vec![
            task("p2", "2026-02-17T18:00:00Z", 2.0, Priority::P2),
            task("p0", "2026-02-17T18:00:00Z", 2.0, Priority::P0),
        ];
        let slots = vec![slot("2026-02-16T09:00:00Z", "2026-02-16T11:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        assert_eq!(
            result.suggestion_for("p0").map(|s| s.status),
            Some(SuggestionStatus::Schedulable)
        );
        assert!(result.suggestion_for("p2").is_none());
        assert_eq!(result.unschedulable[0].task_id, "p2");
    }

    #[test]
    fn unschedulable_reason_reports_needed_hours() {
        let tasks = vec![task("t", "2026-02-16T10:00:00Z", 1.5, Priority::P1)];
        let slots = vec![slot("2026-02-16T11:00:00Z", "2026-02-16T12:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        assert!(result.suggestions.is_empty());
        assert_eq!(
            result.unschedulable[0].reason,
            "insufficient free time before deadline (needed: 1.5h, available: 0h)"
        );
    }

    #[test]
    fn overdue_task_uses_any_remaining_slot() {
        let tasks = vec![task("overdue", "2026-02-10T18:00:00Z", 1.0, Priority::P1)];
        let slots = vec![slot("2026-02-19T09:00:00Z", "2026-02-19T12:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        let suggestion = result.suggestion_for("overdue").expect("overdue suggestion");
        assert_eq!(suggestion.status, SuggestionStatus::Overdue);
        assert_eq!(suggestion.total_scheduled_hours, 1.0);
        assert!(result.unschedulable.is_empty());
    }

    #[test]
    fn partially_placed_overdue_task_is_tight() {
        let tasks = vec![task("overdue", "2026-02-10T18:00:00Z", 4.0, Priority::P1)];
        let slots = vec![slot("2026-02-19T09:00:00Z", "2026-02-19T10:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);
        assert_eq!(
            result.suggestion_for("overdue").map(|s| s.status),
            Some(SuggestionStatus::Tight)
        );
    }

    #[test]
    fn slot_starting_before_deadline_may_run_past_it() {
        let tasks = vec![task("t", "2026-02-16T10:00:00Z", 3.0, Priority::P1)];
        let slots = vec![slot("2026-02-16T09:00:00Z", "2026-02-16T13:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        let suggestion = result.suggestion_for("t").expect("suggestion");
        assert_eq!(suggestion.status, SuggestionStatus::Schedulable);
        assert_eq!(suggestion.scheduled_slots[0].end_at, fixed_time("2026-02-16T12:00:00Z"));
    }

    #[test]
    fn invalid_estimates_are_reported_without_consuming_capacity() {
        let tasks = vec![
            task("nan", "2026-02-16T10:00:00Z", f64::NAN, Priority::P0),
            task("zero", "2026-02-16T11:00:00Z", 0.0, Priority::P0),
            task("negative", "2026-02-16T12:00:00Z", -1.0, Priority::P0),
            task("real", "2026-02-17T09:00:00Z", 2.0, Priority::P1),
        ];
        let slots = vec![slot("2026-02-16T09:00:00Z", "2026-02-16T18:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        let rejected = result
            .unschedulable
            .iter()
            .map(|task| task.task_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(rejected, vec!["nan", "zero", "negative"]);
        assert!(result.unschedulable[0].reason.contains("estimated_hours"));

        assert_eq!(result.suggestions.len(), 1);
        let real = result.suggestion_for("real").expect("real suggestion");
        assert_eq!(real.status, SuggestionStatus::Schedulable);
        assert_eq!(real.scheduled_slots[0].start_at, fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(real.total_scheduled_hours, 2.0);
    }

    #[test]
    fn rounded_slot_hours_can_outgrow_the_gap() {
        // 09:00-10:45 is 1.75h and rounds up to 2h; the next gap starts at 10:50.
        let slots = vec![
            slot("2026-02-16T09:00:00Z", "2026-02-16T10:45:00Z"),
            slot("2026-02-16T10:50:00Z", "2026-02-16T18:00:00Z"),
        ];
        assert_eq!(slots[0].hours, 2.0);
        assert_eq!(slots[1].hours, 7.0);
        let tasks = vec![task("t", "2026-02-20T18:00:00Z", 9.0, Priority::P1)];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);

        let placed = &result.suggestion_for("t").expect("suggestion").scheduled_slots;
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].end_at, fixed_time("2026-02-16T11:00:00Z"));
        assert_eq!(placed[1].start_at, fixed_time("2026-02-16T10:50:00Z"));
        assert_eq!(placed[1].end_at, fixed_time("2026-02-16T17:50:00Z"));
        assert!(placed[0].end_at > placed[1].start_at);
    }

    #[test]
    fn total_free_hours_ignores_consumption() {
        let tasks = vec![task("t", "2026-02-20T18:00:00Z", 2.0, Priority::P1)];
        let slots = vec![
            slot("2026-02-16T09:00:00Z", "2026-02-16T12:00:00Z"),
            slot("2026-02-17T09:00:00Z", "2026-02-17T10:30:00Z"),
        ];

        let result = allocate(&tasks, slots, fixed_time("2026-02-16T08:00:00Z"), Tz::UTC);
        assert_eq!(result.total_free_hours, 4.5);
        assert_eq!(result.total_scheduled_hours(), 2.0);
    }

    #[test]
    fn scheduled_slots_use_local_wall_clock() {
        let tokyo: Tz = "Asia/Tokyo".parse().expect("valid timezone");
        let tasks = vec![task("t", "2026-02-20T18:00:00Z", 1.5, Priority::P1)];
        let slots = vec![slot("2026-02-16T00:00:00Z", "2026-02-16T09:00:00Z")];

        let result = allocate(&tasks, slots, fixed_time("2026-02-15T00:00:00Z"), tokyo);

        let placed = &result.suggestions[0].scheduled_slots[0];
        assert_eq!(placed.date, NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date"));
        assert_eq!(format_hhmm(placed.start_time), "09:00");
        assert_eq!(format_hhmm(placed.end_time), "10:30");
    }

    #[test]
    fn two_task_scenario_spills_over_following_days() {
        // Monday 2026-02-16, now before work starts, busy 10:00-11:00 today only.
        let now = fixed_time("2026-02-16T08:00:00Z");
        let policy = WorkPolicy::new(9, 18, true).expect("valid policy");
        let busy = vec![BusyInterval::new(
            fixed_time("2026-02-16T10:00:00Z"),
            fixed_time("2026-02-16T11:00:00Z"),
        )];
        let slots = extract_free_slots(
            &busy,
            now,
            now + Duration::days(14),
            &policy,
            now,
            Tz::UTC,
        )
        .expect("extract");

        let tasks = vec![
            task("task-b", "2026-02-21T08:00:00Z", 10.0, Priority::P1),
            task("task-a", "2026-02-17T08:00:00Z", 2.0, Priority::P0),
        ];
        let result = allocate(&tasks, slots, now, Tz::UTC);

        let a = result.suggestion_for("task-a").expect("task a");
        assert_eq!(a.status, SuggestionStatus::Schedulable);
        assert_eq!(a.scheduled_slots.len(), 2);
        assert_eq!(a.scheduled_slots[0].start_at, fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(a.scheduled_slots[0].end_at, fixed_time("2026-02-16T10:00:00Z"));
        assert_eq!(a.scheduled_slots[1].start_at, fixed_time("2026-02-16T11:00:00Z"));
        assert_eq!(a.scheduled_slots[1].end_at, fixed_time("2026-02-16T12:00:00Z"));

        let b = result.suggestion_for("task-b").expect("task b");
        assert_eq!(b.status, SuggestionStatus::Schedulable);
        assert_eq!(b.total_scheduled_hours, 10.0);
        assert_eq!(b.scheduled_slots[0].start_at, fixed_time("2026-02-16T12:00:00Z"));
        assert_eq!(b.scheduled_slots[0].hours, 6.0);
        assert_eq!(b.scheduled_slots[1].start_at, fixed_time("2026-02-17T09:00:00Z"));
        assert_eq!(b.scheduled_slots[1].hours, 4.0);
    }

    #[test]
    fn identical_inputs_produce_identical_json() {
        let tasks = vec![
            task("a", "2026-02-17T18:00:00Z", 2.5, Priority::P1),
            task("b", "2026-02-17T18:00:00Z", 4.0, Priority::P1),
            task("c", "2026-02-10T18:00:00Z", 1.0, Priority::P3),
        ];
        let slots = vec![
            slot("2026-02-16T09:00:00Z", "2026-02-16T12:00:00Z"),
            slot("2026-02-16T13:00:00Z", "2026-02-16T18:00:00Z"),
        ];
        let now = fixed_time("2026-02-16T08:00:00Z");

        let first = allocate(&tasks, slots.clone(), now, Tz::UTC);
        let second = allocate(&tasks, slots, now, Tz::UTC);
        assert_eq!(
            serde_json::to_string(&first).expect("serialize"),
            serde_json::to_string(&second).expect("serialize")
        );
    }

    fn tasks_strategy() -> impl Strategy<Value = Vec<SchedulableTask>> {
        let base = fixed_time("2026-02-16T00:00:00Z");
        prop::collection::vec((0i64..(10 * 24), 1u32..24, 0u8..4), 1..12).prop_map(move |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(index, (due_offset, half_hours, priority))| SchedulableTask {
                    id: format!("tsk-{index}"),
                    title: format!("Task {index}"),
                    due_date: base + Duration::hours(due_offset),
                    estimated_hours: f64::from(half_hours) * 0.5,
                    priority: match priority {
                        0 => Priority::P0,
                        1 => Priority::P1,
                        2 => Priority::P2,
                        _ => Priority::P3,
                    },
                })
                .collect()
        })
    }

    fn slots_strategy() -> impl Strategy<Value = Vec<FreeSlot>> {
        let base = fixed_time("2026-02-16T09:00:00Z");
        prop::collection::vec(1i64..16, 0..10).prop_map(move |lengths| {
            let mut cursor = base;
            let mut slots = Vec::new();
            for length in lengths {
                let end = cursor + Duration::minutes(length * 30);
                slots.extend(FreeSlot::from_gap(cursor, end));
                cursor = end + Duration::hours(3);
            }
            slots
        })
    }

    proptest! {
        #[test]
        fn allocation_conserves_hours_and_capacity(tasks in tasks_strategy(), slots in slots_strategy(), now_offset in 0i64..(10 * 24)) {
            let now = fixed_time("2026-02-16T00:00:00Z") + Duration::hours(now_offset);
            let result = allocate(&tasks, slots, now, Tz::UTC);

            for suggestion in &result.suggestions {
                let task = tasks.iter().find(|task| task.id == suggestion.task_id).expect("known task");
                let sum = suggestion.scheduled_slots.iter().map(|slot| slot.hours).sum::<f64>();
                prop_assert!((sum - suggestion.total_scheduled_hours).abs() < 1e-9);
                prop_assert!(suggestion.total_scheduled_hours <= task.estimated_hours + 1e-9);
                prop_assert!(suggestion.total_scheduled_hours > 0.0);
            }
            prop_assert!(result.total_scheduled_hours() <= result.total_free_hours + 1e-9);
            prop_assert_eq!(result.suggestions.len() + result.unschedulable.len(), tasks.len());
        }

        #[test]
        fn allocation_is_deterministic(tasks in tasks_strategy(), slots in slots_strategy()) {
            let now = fixed_time("2026-02-18T00:00:00Z");
            let first = allocate(&tasks, slots.clone(), now, Tz::UTC);
            let second = allocate(&tasks, slots, now, Tz::UTC);
            prop_assert_eq!(
                serde_json::to_string(&first).expect("serialize"),
                serde_json::to_string(&second).expect("serialize")
            );
        }

        #[test]
        fn placements_never_overlap_across_tasks(tasks in tasks_strategy(), slots in slots_strategy()) {
            let now = fixed_time("2026-02-16T00:00:00Z");
            let result = allocate(&tasks, slots, now, Tz::UTC);
            let mut spans = result
                .suggestions
                .iter()
                .flat_map(|suggestion| suggestion.scheduled_slots.iter())
                .map(|slot| (slot.start_at, slot.end_at))
                .collect::<Vec<_>>();
            spans.sort();
            for pair in spans.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].0);
            }
        }
    }
}
