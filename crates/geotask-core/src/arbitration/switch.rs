//! Switch requests raised when arbitration is ambiguous.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::task::TaskRecord;

/// Identifier of an outstanding switch request.
pub type SwitchId = u64;

/// An escalation waiting for an external "start now" / "keep deferred" answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRequest {
    pub id: SwitchId,
    pub candidate: TaskRecord,
    pub incumbent: Option<TaskRecord>,
    pub requested_at: DateTime<Utc>,
    /// After this instant the request resolves to "keep deferred".
    pub deadline: DateTime<Utc>,
}

/// Single-use answer hook handed to the decision-maker.
///
/// `resolve` consumes the responder, so a request can be answered at most
/// once. Dropping it unanswered counts as "keep deferred".
#[derive(Debug)]
pub struct SwitchResponder {
    id: SwitchId,
    tx: oneshot::Sender<bool>,
}

impl SwitchResponder {
    pub fn channel(id: SwitchId) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> SwitchId {
        self.id
    }

    /// Answer the request. Returns false if the scheduler stopped waiting
    /// (timeout or shutdown) before the answer arrived.
    pub fn resolve(self, start_now: bool) -> bool {
        self.tx.send(start_now).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responder_delivers_answer_once() {
        let (responder, rx) = SwitchResponder::channel(7);
        assert_eq!(responder.id(), 7);
        assert!(responder.resolve(true));
        assert_eq!(rx.await.ok(), Some(true));
    }

    #[tokio::test]
    async fn dropped_responder_closes_channel() {
        let (responder, rx) = SwitchResponder::channel(1);
        drop(responder);
        assert!(rx.await.is_err());
    }

    #[test]
    fn resolve_after_receiver_dropped_reports_false() {
        let (responder, rx) = SwitchResponder::channel(2);
        drop(rx);
        assert!(!responder.resolve(false));
    }
}
