//! Integration tests for the scheduler state machine.
//!
//! Exercise the public operations against in-memory ports with a fixed
//! clock, covering arbitration, the session clock, the pending registry,
//! escalation and the persistence-failure paths.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::broadcast;

use geotask_core::ports::TaskStore;
use geotask_core::storage::memory::AlarmCall;
use geotask_core::{
    EventBus, MemoryStore, Ports, Priority, RecordingAlarms, Recurrence, Scheduler, SchedulerConfig,
    SchedulerError, SchedulerEvent, SchedulerSnapshot, TaskRecord, TaskState, TriggerKind,
    TriggerMessage,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    alarms: Arc<RecordingAlarms>,
    scheduler: Scheduler,
    events: broadcast::Receiver<SchedulerEvent>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    fn with_config(config: SchedulerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let alarms = Arc::new(RecordingAlarms::new());
        let bus = EventBus::default();
        let events = bus.subscribe();
        let ports = Ports::new(store.clone(), store.clone(), alarms.clone());
        Self {
            scheduler: Scheduler::new(&config, ports, bus),
            store,
            alarms,
            events,
        }
    }

    /// Persist a task with the given priority, due `due_in` after t0.
    fn task(&self, name: &str, priority: u8, due_in: Option<Duration>) -> TaskRecord {
        self.store.add(record(name, priority, due_in)).unwrap()
    }

    fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn record(name: &str, priority: u8, due_in: Option<Duration>) -> TaskRecord {
    let record = TaskRecord::new(name).with_priority(Priority::new(priority).unwrap());
    match due_in {
        Some(d) => record.due_at_instant(t0() + d),
        None => record,
    }
}

fn id(task: &TaskRecord) -> i64 {
    task.id.unwrap()
}

// ── End-to-end scenarios ─────────────────────────────────────────────

#[tokio::test]
async fn test_region_enter_starts_highest_ranked_candidate() {
    let mut f = Fixture::new();
    let a = f
        .store
        .add(record("a", 5, Some(Duration::minutes(5))).with_region("office"))
        .unwrap();
    let b = f
        .store
        .add(record("b", 2, Some(Duration::hours(2))).with_region("office"))
        .unwrap();

    let message = TriggerMessage::region(TriggerKind::Enter, ["office"]);
    let outcomes = f.scheduler.handle_trigger(&message, t0()).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].task_id, id(&a));
    assert!(outcomes[0].started);
    assert!(!outcomes[1].started);
    assert_eq!(f.scheduler.active_task().and_then(|t| t.id), a.id);
    assert!(f.scheduler.is_pending(id(&b)));
}

#[tokio::test]
async fn test_lower_ranked_start_is_deferred() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, Some(Duration::minutes(5)));
    let b = f.task("b", 2, Some(Duration::hours(2)));

    assert!(f.scheduler.start_task(a.clone(), t0()).unwrap());
    assert!(!f.scheduler.start_task(b.clone(), t0()).unwrap());

    assert!(f.scheduler.is_pending(id(&b)));
    let remaining = f.scheduler.pending_remaining(id(&b), t0()).unwrap();
    assert!(remaining > Duration::zero());
    assert!(remaining <= f.scheduler.default_snooze());
    assert_eq!(f.alarms.armed_at(id(&b)), Some(t0() + Duration::minutes(10)));
    assert!(f.scheduler.is_running(id(&a)));
}

#[tokio::test]
async fn test_pause_then_stop_records_time_up_to_pause() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);

    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.scheduler.pause_task(t0() + Duration::minutes(25)).unwrap();
    let record = f.scheduler.stop_task(t0() + Duration::minutes(40)).await.unwrap();

    assert_eq!(record.elapsed(), Duration::minutes(25));
    assert_eq!(f.store.history(), vec![record]);
    assert!(!f.scheduler.has_active_task());
}

// ── Clock ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_elapsed_sums_running_intervals() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);

    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.pause_task(t0() + Duration::seconds(10)).unwrap();
    f.scheduler.resume_task(t0() + Duration::seconds(60)).unwrap();
    assert_eq!(
        f.scheduler.active_elapsed(t0() + Duration::seconds(65)),
        Some(Duration::seconds(15))
    );
    let record = f.scheduler.stop_task(t0() + Duration::seconds(70)).await.unwrap();
    assert_eq!(record.elapsed(), Duration::seconds(20));
}

#[tokio::test]
async fn test_pause_and_resume_misuse_is_rejected() {
    let mut f = Fixture::new();
    assert!(matches!(
        f.scheduler.pause_task(t0()),
        Err(SchedulerError::NoActiveTask)
    ));
    assert!(matches!(
        f.scheduler.stop_task(t0()).await,
        Err(SchedulerError::NoActiveTask)
    ));

    let a = f.task("a", 3, None);
    f.scheduler.start_task(a, t0()).unwrap();
    assert!(matches!(
        f.scheduler.resume_task(t0()),
        Err(SchedulerError::InvalidOperation(_))
    ));
    f.scheduler.pause_task(t0() + Duration::seconds(5)).unwrap();
    assert!(f.scheduler.is_paused());
    assert!(matches!(
        f.scheduler.pause_task(t0() + Duration::seconds(6)),
        Err(SchedulerError::InvalidOperation(_))
    ));
    assert_eq!(
        f.scheduler.active_elapsed(t0() + Duration::minutes(9)),
        Some(Duration::seconds(5))
    );
}

// ── Arbitration ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_preemption_keeps_single_active_and_publishes_once() {
    let mut f = Fixture::new();
    let a = f.task("a", 2, None);
    let b = f.task("b", 5, None);

    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.drain_events();
    assert!(f.scheduler.start_task(b.clone(), t0() + Duration::minutes(5)).unwrap());

    assert_eq!(f.scheduler.active_task().and_then(|t| t.id), b.id);
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Paused);
    assert_eq!(f.scheduler.paused_tasks().len(), 1);
    assert!(!f.scheduler.is_running(id(&a)));

    let events = f.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        SchedulerEvent::TaskPreempted { displaced, by, .. } if displaced == id(&a) && by == id(&b)
    ));
    // displacement alone writes no history
    assert!(f.store.history().is_empty());
}

#[tokio::test]
async fn test_priority_correctness() {
    // equal due moment: higher declared priority wins
    let mut f = Fixture::new();
    let low = f.task("low", 2, Some(Duration::hours(3)));
    let high = f.task("high", 4, Some(Duration::hours(3)));
    f.scheduler.start_task(low, t0()).unwrap();
    assert!(f.scheduler.start_task(high, t0()).unwrap());

    // equal declared priority: nearer due moment wins across urgency bands
    let mut f = Fixture::new();
    let later = f.task("later", 3, Some(Duration::hours(2)));
    let sooner = f.task("sooner", 3, Some(Duration::minutes(30)));
    f.scheduler.start_task(later, t0()).unwrap();
    assert!(f.scheduler.start_task(sooner, t0()).unwrap());
}

#[tokio::test]
async fn test_nearer_due_wins_within_one_urgency_band() {
    // both due inside the hour, so their blended scores are equal
    let mut f = Fixture::new();
    let later = f.task("later", 3, Some(Duration::minutes(50)));
    let sooner = f.task("sooner", 3, Some(Duration::minutes(10)));
    f.scheduler.start_task(later.clone(), t0()).unwrap();

    assert!(f.scheduler.start_task(sooner.clone(), t0()).unwrap());
    assert!(f.scheduler.is_running(id(&sooner)));
    assert_eq!(f.scheduler.task_state(id(&later)), TaskState::Paused);
    assert!(f.scheduler.take_switch_requests().is_empty());
}

#[tokio::test]
async fn test_priority_correctness_in_both_request_orders() {
    let cases = [
        // (first, second) as (priority, due in minutes)
        ((3, 50), (3, 10)),
        ((2, 30), (4, 30)),
    ];
    for ((p_weak, due_weak), (p_strong, due_strong)) in cases {
        // weaker first: the stronger one preempts it
        let mut f = Fixture::new();
        let weak = f.task("weak", p_weak, Some(Duration::minutes(due_weak)));
        let strong = f.task("strong", p_strong, Some(Duration::minutes(due_strong)));
        f.scheduler.start_task(weak.clone(), t0()).unwrap();
        assert!(f.scheduler.start_task(strong.clone(), t0()).unwrap());
        assert!(f.scheduler.is_running(id(&strong)));

        // stronger first: the weaker one is snoozed, never escalated
        let mut f = Fixture::new();
        let weak = f.task("weak", p_weak, Some(Duration::minutes(due_weak)));
        let strong = f.task("strong", p_strong, Some(Duration::minutes(due_strong)));
        f.scheduler.start_task(strong.clone(), t0()).unwrap();
        assert!(!f.scheduler.start_task(weak.clone(), t0()).unwrap());
        assert_eq!(f.scheduler.task_state(id(&weak)), TaskState::Pending);
        assert!(f.scheduler.is_running(id(&strong)));
        assert!(f.scheduler.outstanding_switches().is_empty());
    }
}

#[tokio::test]
async fn test_starting_active_task_is_a_no_op() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    let session = f.scheduler.active_session().unwrap().session_id;
    f.drain_events();

    assert!(f.scheduler.start_task(a, t0() + Duration::minutes(1)).unwrap());
    assert_eq!(f.scheduler.active_session().unwrap().session_id, session);
    assert!(f.drain_events().is_empty());
}

#[tokio::test]
async fn test_ineligible_records_are_rejected() {
    let mut f = Fixture::new();
    let unsaved = TaskRecord::new("draft");
    assert!(matches!(
        f.scheduler.start_task(unsaved, t0()),
        Err(SchedulerError::Ineligible { .. })
    ));

    let mut done = f.task("done", 5, None);
    done.completed = true;
    assert!(matches!(
        f.scheduler.start_task(done, t0()),
        Err(SchedulerError::Ineligible { .. })
    ));
    assert!(!f.scheduler.has_active_task());
}

// ── Pending registry ─────────────────────────────────────────────────

#[tokio::test]
async fn test_redefer_keeps_one_entry_and_resets_expiry() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();

    f.scheduler.start_task(b.clone(), t0()).unwrap();
    let later = t0() + Duration::minutes(4);
    f.scheduler.start_task(b.clone(), later).unwrap();

    assert_eq!(f.scheduler.pending_entries().len(), 1);
    assert_eq!(
        f.scheduler.pending_remaining(id(&b), later),
        Some(Duration::minutes(10))
    );
    assert_eq!(f.alarms.armed_at(id(&b)), Some(later + Duration::minutes(10)));
}

#[tokio::test]
async fn test_tick_rearbitrates_expired_entries_in_expiry_order() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 2, None);
    let c = f.task("c", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();
    f.scheduler.start_task(c.clone(), t0() + Duration::minutes(1)).unwrap();
    f.scheduler.stop_task(t0() + Duration::minutes(2)).await.unwrap();

    let report = f.scheduler.tick(t0() + Duration::minutes(20)).await;
    // b expired first and took the empty slot; c then lost to b
    assert_eq!(report.started, vec![id(&b)]);
    assert_eq!(report.requeued, vec![id(&c)]);
    assert!(f.scheduler.is_running(id(&b)));
    assert!(f.scheduler.is_pending(id(&c)));
}

#[tokio::test]
async fn test_tick_before_expiry_does_nothing() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();

    let report = f.scheduler.tick(t0() + Duration::minutes(9)).await;
    assert!(report.is_empty());
    assert!(f.scheduler.is_pending(id(&b)));
}

#[tokio::test]
async fn test_tick_discards_entries_completed_in_the_store() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let mut b = f.task("b", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();

    b.completed = true;
    f.store.update_task(&b).await.unwrap();

    let report = f.scheduler.tick(t0() + Duration::minutes(11)).await;
    assert_eq!(report.discarded, vec![id(&b)]);
    assert_eq!(f.scheduler.task_state(id(&b)), TaskState::Idle);
    assert_eq!(f.alarms.armed_at(id(&b)), None);
}

// ── Alarms and stale triggers ────────────────────────────────────────

#[tokio::test]
async fn test_stale_alarm_for_deleted_task_changes_nothing() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();
    f.store.delete_task(id(&b)).await.unwrap();

    let before = f.scheduler.snapshot();
    let started = f
        .scheduler
        .on_alarm_fired(id(&b), t0() + Duration::minutes(10))
        .await
        .unwrap();

    assert!(!started);
    assert_eq!(f.scheduler.snapshot(), before);
}

#[tokio::test]
async fn test_alarm_before_snooze_expiry_is_ignored() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 1, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();

    let started = f
        .scheduler
        .on_alarm_fired(id(&b), t0() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(!started);
    assert!(f.scheduler.is_pending(id(&b)));
}

#[tokio::test]
async fn test_alarm_for_idle_task_proposes_it() {
    let mut f = Fixture::new();
    let a = f.task("a", 4, None);
    assert!(f.scheduler.on_alarm_fired(id(&a), t0()).await.unwrap());
    assert!(f.scheduler.is_running(id(&a)));
}

#[tokio::test]
async fn test_delete_drops_task_from_live_sets() {
    let mut f = Fixture::new();
    let a = f.task("a", 5, None);
    let b = f.task("b", 1, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();

    f.scheduler.delete_task(id(&b), t0()).await.unwrap();
    assert!(!f.scheduler.is_pending(id(&b)));
    assert!(f.alarms.calls().contains(&AlarmCall::Cancelled(id(&b))));

    f.scheduler.delete_task(id(&a), t0()).await.unwrap();
    assert!(!f.scheduler.has_active_task());
    assert!(f.store.history().is_empty());
}

#[tokio::test]
async fn test_exit_trigger_proposes_nothing() {
    let mut f = Fixture::new();
    f.store.add(record("a", 5, None).with_region("home")).unwrap();
    let message = TriggerMessage::region(TriggerKind::Exit, ["home"]);
    let outcomes = f.scheduler.handle_trigger(&message, t0()).await.unwrap();
    assert!(outcomes.is_empty());
    assert!(!f.scheduler.has_active_task());
}

// ── History ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_append_retains_session_and_retry_records_once() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    let session = f.scheduler.active_session().unwrap().session_id;
    f.store.fail_next_appends(1);

    let err = f.scheduler.stop_task(t0() + Duration::minutes(5)).await;
    assert!(matches!(err, Err(SchedulerError::Persistence(_))));
    assert!(f.scheduler.is_running(id(&a)));

    let record = f.scheduler.stop_task(t0() + Duration::minutes(6)).await.unwrap();
    assert_eq!(record.session_id, session);
    assert_eq!(f.store.history().len(), 1);
    assert_eq!(f.store.append_attempts(), 2);
}

#[tokio::test]
async fn test_second_stop_records_nothing_more() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a, t0()).unwrap();

    f.scheduler.stop_task(t0() + Duration::minutes(5)).await.unwrap();
    assert!(matches!(
        f.scheduler.stop_task(t0() + Duration::minutes(5)).await,
        Err(SchedulerError::NoActiveTask)
    ));
    assert_eq!(f.store.history().len(), 1);
    assert_eq!(f.store.append_attempts(), 1);
}

#[tokio::test]
async fn test_reschedule_records_partial_session() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();

    f.scheduler
        .reschedule_task_later(a.clone(), t0() + Duration::minutes(3))
        .await
        .unwrap();

    assert!(!f.scheduler.has_active_task());
    assert!(f.scheduler.is_pending(id(&a)));
    let history = f.store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].elapsed(), Duration::minutes(3));
}

#[tokio::test]
async fn test_reschedule_of_active_task_announces_stop_then_defer() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    let session = f.scheduler.active_session().unwrap().session_id;
    f.drain_events();

    f.scheduler
        .reschedule_task_later(a.clone(), t0() + Duration::minutes(5))
        .await
        .unwrap();

    let events = f.drain_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        SchedulerEvent::TaskStopped { task_id, session_id, elapsed_ms, .. }
            if task_id == id(&a) && session_id == session && elapsed_ms == 300_000
    ));
    assert!(matches!(events[1], SchedulerEvent::TaskDeferred { task_id, .. } if task_id == id(&a)));

    // an idle task only gets the deferral
    let b = f.task("b", 3, None);
    f.scheduler.reschedule_task_later(b, t0()).await.unwrap();
    let events = f.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SchedulerEvent::TaskDeferred { .. }));
}

#[tokio::test]
async fn test_complete_active_task() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.drain_events();

    let record = f
        .scheduler
        .complete_task_manually(a.clone(), t0() + Duration::minutes(15))
        .await
        .unwrap();

    assert_eq!(record.map(|r| r.elapsed()), Some(Duration::minutes(15)));
    assert!(f.store.task(id(&a)).unwrap().completed);
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Idle);
    let events = f.drain_events();
    assert!(matches!(events[0], SchedulerEvent::TaskCompleted { .. }));
    assert!(matches!(events[1], SchedulerEvent::TasksInvalidated { .. }));

    // completed records never arbitrate again
    let stored = f.store.task(id(&a)).unwrap();
    assert!(f.scheduler.start_task(stored, t0() + Duration::hours(1)).is_err());
}

#[tokio::test]
async fn test_complete_recurring_task_rolls_forward() {
    let mut f = Fixture::new();
    let a = f
        .store
        .add(
            record("standup", 3, Some(Duration::hours(-1))).with_recurrence(Recurrence::Daily),
        )
        .unwrap();

    let record = f.scheduler.complete_task_manually(a.clone(), t0()).await.unwrap();
    assert!(record.is_none());

    let stored = f.store.task(id(&a)).unwrap();
    assert!(!stored.completed);
    let next_due = t0() + Duration::hours(23);
    assert_eq!(stored.due_at(t0()), Some(next_due));
    assert_eq!(f.alarms.armed_at(id(&a)), Some(next_due));
}

#[tokio::test]
async fn test_failed_completion_leaves_live_sets_untouched() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.store.fail_next_updates(1);

    let result = f
        .scheduler
        .complete_task_manually(a.clone(), t0() + Duration::minutes(2))
        .await;
    assert!(matches!(result, Err(SchedulerError::Persistence(_))));
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Active);
    assert!(f.scheduler.active_session().unwrap().is_recorded());
    assert!(!f.store.task(id(&a)).unwrap().completed);

    // the retry re-sends the stored record, which the store ignores
    f.scheduler
        .complete_task_manually(a.clone(), t0() + Duration::minutes(3))
        .await
        .unwrap();
    assert_eq!(f.store.history().len(), 1);
    assert!(f.store.task(id(&a)).unwrap().completed);
}

#[tokio::test]
async fn test_completion_retry_returns_the_stored_record() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.store.fail_next_updates(1);

    let result = f
        .scheduler
        .complete_task_manually(a.clone(), t0() + Duration::minutes(2))
        .await;
    assert!(result.is_err());
    // the session is closed at the successful append
    assert_eq!(
        f.scheduler.active_elapsed(t0() + Duration::minutes(30)),
        Some(Duration::minutes(2))
    );
    assert!(f.scheduler.resume_task(t0() + Duration::minutes(10)).is_err());

    let record = f
        .scheduler
        .complete_task_manually(a.clone(), t0() + Duration::minutes(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.elapsed(), Duration::minutes(2));
    assert_eq!(f.store.history(), vec![record]);
    assert!(f.store.task(id(&a)).unwrap().completed);
}

#[tokio::test]
async fn test_record_state_reports_completed_records() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    let b = f.task("b", 3, None);
    assert_eq!(f.scheduler.record_state(&a), TaskState::Idle);

    f.scheduler.start_task(b.clone(), t0()).unwrap();
    assert_eq!(f.scheduler.record_state(&b), TaskState::Active);

    f.scheduler.complete_task_manually(a.clone(), t0()).await.unwrap();
    let stored = f.store.task(id(&a)).unwrap();
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Idle);
    assert_eq!(f.scheduler.record_state(&stored), TaskState::Completed);
}

// ── Paused set ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_resumed_paused_task_keeps_its_session() {
    let mut f = Fixture::new();
    let a = f.task("a", 2, None);
    let b = f.task("b", 5, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    let session = f.scheduler.active_session().unwrap().session_id;
    f.scheduler.start_task(b, t0() + Duration::minutes(5)).unwrap();
    f.scheduler.stop_task(t0() + Duration::minutes(15)).await.unwrap();
    f.drain_events();

    assert!(f
        .scheduler
        .resume_paused_task(id(&a), t0() + Duration::minutes(15))
        .unwrap());
    let events = f.drain_events();
    assert!(matches!(
        events[0],
        SchedulerEvent::TaskStarted { resumed_session: true, .. }
    ));

    let record = f.scheduler.stop_task(t0() + Duration::minutes(20)).await.unwrap();
    assert_eq!(record.session_id, session);
    assert_eq!(record.elapsed(), Duration::minutes(10));
}

#[tokio::test]
async fn test_paused_task_that_loses_stays_paused() {
    let mut f = Fixture::new();
    let a = f.task("a", 2, None);
    let b = f.task("b", 5, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.scheduler.start_task(b, t0()).unwrap();

    assert!(!f.scheduler.resume_paused_task(id(&a), t0()).unwrap());
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Paused);
    assert!(!f.scheduler.is_pending(id(&a)));
    assert!(matches!(
        f.scheduler.resume_paused_task(999, t0()),
        Err(SchedulerError::NotPaused(999))
    ));
}

// ── Escalation ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_tie_escalates_and_start_now_preempts() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    let b = f.task("b", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();

    assert!(!f.scheduler.start_task(b.clone(), t0()).unwrap());
    assert_eq!(f.scheduler.task_state(id(&b)), TaskState::AwaitingDecision);
    // a second proposal does not raise a duplicate request
    assert!(!f.scheduler.start_task(b.clone(), t0()).unwrap());
    let requests = f.scheduler.take_switch_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].deadline, t0() + Duration::minutes(10));
    assert_eq!(requests[0].incumbent.as_ref().and_then(|t| t.id), a.id);

    assert!(f
        .scheduler
        .resolve_switch(requests[0].id, true, t0() + Duration::minutes(1))
        .unwrap());
    assert!(f.scheduler.is_running(id(&b)));
    assert_eq!(f.scheduler.task_state(id(&a)), TaskState::Paused);
    assert!(matches!(
        f.scheduler.resolve_switch(requests[0].id, true, t0()),
        Err(SchedulerError::UnknownSwitch(_))
    ));
}

#[tokio::test]
async fn test_keep_deferred_answer_snoozes_candidate() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    let b = f.task("b", 3, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();
    let request = f.scheduler.take_switch_requests().remove(0);

    assert!(!f.scheduler.resolve_switch(request.id, false, t0()).unwrap());
    assert!(f.scheduler.is_pending(id(&b)));
}

#[tokio::test]
async fn test_unanswered_switch_times_out_to_deferred() {
    let mut f = Fixture::new();
    let a = f.task("a", 3, None);
    let b = f.task("b", 3, None);
    f.scheduler.start_task(a.clone(), t0()).unwrap();
    f.scheduler.start_task(b.clone(), t0()).unwrap();
    let request = f.scheduler.take_switch_requests().remove(0);

    let report = f.scheduler.tick(t0() + Duration::minutes(10)).await;
    assert_eq!(report.timed_out_switches, vec![request.id]);
    assert!(f.scheduler.is_pending(id(&b)));
    assert!(f.scheduler.outstanding_switches().is_empty());
    assert!(f.scheduler.is_running(id(&a)));
    let timed_out = f.drain_events().into_iter().any(|e| {
        matches!(e, SchedulerEvent::SwitchResolved { timed_out: true, start_now: false, .. })
    });
    assert!(timed_out);
}

#[tokio::test]
async fn test_ties_defer_when_escalation_disabled() {
    let mut config = SchedulerConfig::default();
    config.policy.escalate_ties = false;
    let mut f = Fixture::with_config(config);
    let a = f.task("a", 3, None);
    let b = f.task("b", 3, None);
    f.scheduler.start_task(a, t0()).unwrap();

    assert!(!f.scheduler.start_task(b.clone(), t0()).unwrap());
    assert!(f.scheduler.is_pending(id(&b)));
    assert!(f.scheduler.take_switch_requests().is_empty());
}

// ── Snapshot ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_snapshot_restores_live_sets() {
    let mut f = Fixture::new();
    let a = f.task("a", 2, None);
    let b = f.task("b", 5, None);
    let c = f.task("c", 1, None);
    let d = f.task("d", 5, None);
    f.scheduler.start_task(a, t0()).unwrap();
    f.scheduler.start_task(b, t0() + Duration::minutes(1)).unwrap();
    f.scheduler.start_task(c, t0() + Duration::minutes(2)).unwrap();
    f.scheduler.start_task(d, t0() + Duration::minutes(3)).unwrap();

    let snapshot = f.scheduler.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: SchedulerSnapshot = serde_json::from_str(&json).unwrap();

    let mut other = Fixture::new();
    other.scheduler.restore(decoded);
    assert_eq!(other.scheduler.snapshot(), snapshot);
    assert_eq!(other.scheduler.outstanding_switches().len(), 1);
}
