//! Effective priority ranking.
//!
//! Blends the user-declared priority with due-time urgency into a single
//! totally ordered value. Every arbitration decision compares two of these.
//!
//! The blended score is `declared * 100 + urgency`, where urgency is a
//! 0-100 band that only rises as the due moment approaches:
//!
//! | Time until due | Urgency |
//! |----------------|---------|
//! | overdue        | 100     |
//! | <= 1h          | 90      |
//! | <= 6h          | 75      |
//! | <= 24h         | 60      |
//! | <= 3 days      | 40      |
//! | <= 7 days      | 20      |
//! | later          | 5       |
//! | no due moment  | 0       |
//!
//! Declared priority dominates the score, so urgency only reorders tasks
//! sharing a declared level. Within a band the exact due moment and then the
//! task id break ties.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Priority, TaskId, TaskRecord};

/// Urgency band thresholds, nearest first.
const URGENCY_BANDS: [(i64, u32); 5] = [
    (60 * 60, 90),
    (6 * 60 * 60, 75),
    (24 * 60 * 60, 60),
    (3 * 24 * 60 * 60, 40),
    (7 * 24 * 60 * 60, 20),
];
const URGENCY_OVERDUE: u32 = 100;
const URGENCY_DISTANT: u32 = 5;

/// Comparable ranking of a task at a given instant. Greater ranks higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePriority {
    score: u32,
    declared: Priority,
    due_at: Option<DateTime<Utc>>,
    task_id: Option<TaskId>,
}

impl EffectivePriority {
    /// Blended declared-priority and urgency score.
    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn declared(&self) -> Priority {
        self.declared
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    /// Equal in everything but the task-id tie-break.
    pub fn same_standing(&self, other: &Self) -> bool {
        self.score == other.score && self.declared == other.declared && self.due_at == other.due_at
    }
}

impl Ord for EffectivePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.declared.cmp(&other.declared))
            // earlier due wins; no due moment ranks below any due moment
            .then_with(|| match (self.due_at, other.due_at) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
            // lower id wins; unsaved records rank last
            .then_with(|| match (self.task_id, other.task_id) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            })
    }
}

impl PartialOrd for EffectivePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rank a task at `now`.
pub fn rank(task: &TaskRecord, now: DateTime<Utc>) -> EffectivePriority {
    let due_at = task.due_at(now);
    let urgency = due_at.map(|due| urgency(due - now)).unwrap_or(0);
    EffectivePriority {
        score: u32::from(task.priority.get()) * 100 + urgency,
        declared: task.priority,
        due_at,
        task_id: task.id,
    }
}

fn urgency(until_due: Duration) -> u32 {
    let secs = until_due.num_seconds();
    if secs <= 0 {
        return URGENCY_OVERDUE;
    }
    URGENCY_BANDS
        .iter()
        .find(|(limit, _)| secs <= *limit)
        .map(|(_, band)| *band)
        .unwrap_or(URGENCY_DISTANT)
}

/// Sort tasks best-first by their rank at `now`.
pub fn sort_by_rank(tasks: &mut [TaskRecord], now: DateTime<Utc>) {
    tasks.sort_by(|a, b| rank(b, now).cmp(&rank(a, now)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn task(id: TaskId, priority: u8) -> TaskRecord {
        TaskRecord::new(format!("task-{id}"))
            .with_id(id)
            .with_priority(Priority::new(priority).unwrap())
    }

    #[test]
    fn equal_due_higher_declared_wins() {
        let due = now() + Duration::hours(2);
        let high = task(1, 4).due_at_instant(due);
        let low = task(2, 2).due_at_instant(due);
        assert!(rank(&high, now()) > rank(&low, now()));
    }

    #[test]
    fn equal_declared_nearer_due_wins() {
        let near = task(1, 3).due_at_instant(now() + Duration::minutes(30));
        let far = task(2, 3).due_at_instant(now() + Duration::days(2));
        assert!(rank(&near, now()) > rank(&far, now()));

        // same band, still ordered by the exact moment
        let nearer = task(3, 3).due_at_instant(now() + Duration::minutes(10));
        assert!(rank(&nearer, now()) > rank(&near, now()));
    }

    #[test]
    fn overdue_outranks_upcoming() {
        let overdue = task(1, 3).due_at_instant(now() - Duration::hours(1));
        let soon = task(2, 3).due_at_instant(now() + Duration::minutes(5));
        assert!(rank(&overdue, now()) > rank(&soon, now()));
    }

    #[test]
    fn urgency_is_monotone_as_due_approaches() {
        let t = task(1, 2).due_at_instant(now() + Duration::days(10));
        let mut previous = rank(&t, now()).score();
        for hours in (0..=240).rev() {
            let at = now() + Duration::days(10) - Duration::hours(hours);
            let score = rank(&t, at).score();
            assert!(score >= previous, "score dropped at {at}");
            previous = score;
        }
    }

    #[test]
    fn full_tie_broken_by_lower_id() {
        let a = task(7, 3);
        let b = task(9, 3);
        assert!(rank(&a, now()) > rank(&b, now()));
        assert_eq!(rank(&a, now()).score(), rank(&b, now()).score());
    }

    #[test]
    fn sort_by_rank_puts_best_first() {
        let mut tasks = vec![
            task(1, 2).due_at_instant(now() + Duration::hours(2)),
            task(2, 5).due_at_instant(now() + Duration::minutes(5)),
            task(3, 3),
        ];
        sort_by_rank(&mut tasks, now());
        let ids: Vec<_> = tasks.iter().map(|t| t.id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
