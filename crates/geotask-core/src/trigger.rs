//! Trigger boundary.
//!
//! Region events and notification actions arrive from outside the owner
//! context. They are decoded into [`TriggerMessage`] and validated here, so
//! nothing malformed ever reaches the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TriggerError;
use crate::ranking::sort_by_rank;
use crate::task::TaskRecord;

/// Kind of region transition reported by the sensing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Enter,
    Exit,
    Dwell,
}

/// Payload attached to a tapped location notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub notification_id: i64,
    pub geofence_ids: Vec<String>,
}

impl NotificationPayload {
    fn validate(self) -> Result<Self, TriggerError> {
        if self.notification_id < 0 {
            return Err(TriggerError::Invalid(format!(
                "negative notificationId {}",
                self.notification_id
            )));
        }
        if self.geofence_ids.is_empty() {
            return Err(TriggerError::Invalid("geofenceIds is empty".into()));
        }
        if self.geofence_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(TriggerError::Invalid("geofenceIds contains a blank id".into()));
        }
        Ok(self)
    }
}

/// A validated trigger, ready to be marshalled into the owner context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerMessage {
    Region {
        region_ids: Vec<String>,
        kind: TriggerKind,
    },
    NotificationAction(NotificationPayload),
}

impl TriggerMessage {
    pub fn region(kind: TriggerKind, region_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        TriggerMessage::Region {
            region_ids: region_ids.into_iter().map(Into::into).collect(),
            kind,
        }
    }

    pub fn region_ids(&self) -> &[String] {
        match self {
            TriggerMessage::Region { region_ids, .. } => region_ids,
            TriggerMessage::NotificationAction(payload) => &payload.geofence_ids,
        }
    }

    /// Whether this trigger proposes candidates. Leaving a region does not.
    pub fn proposes(&self) -> bool {
        !matches!(
            self,
            TriggerMessage::Region {
                kind: TriggerKind::Exit,
                ..
            }
        )
    }

    /// Region ids to resolve, or `None` when the trigger proposes nothing.
    pub fn proposing_regions(&self) -> Option<&[String]> {
        self.proposes().then(|| self.region_ids())
    }
}

/// Decode and validate a notification-action payload.
pub fn parse_notification_payload(raw: &str) -> Result<NotificationPayload, TriggerError> {
    let payload: NotificationPayload = serde_json::from_str(raw)?;
    payload.validate()
}

/// Like [`parse_notification_payload`], but logs and drops bad input.
pub fn decode_notification_action(raw: &str) -> Option<TriggerMessage> {
    match parse_notification_payload(raw) {
        Ok(payload) => Some(TriggerMessage::NotificationAction(payload)),
        Err(e) => {
            warn!(error = %e, "discarding notification payload");
            None
        }
    }
}

/// Stored tasks linked to any of `region_ids` that may take part in
/// arbitration, best rank first.
pub fn resolve_candidates(
    tasks: Vec<TaskRecord>,
    region_ids: &[String],
    now: DateTime<Utc>,
) -> Vec<TaskRecord> {
    let mut candidates: Vec<TaskRecord> = tasks
        .into_iter()
        .filter(|t| t.is_eligible())
        .filter(|t| {
            t.region_id
                .as_deref()
                .map(|region| region_ids.iter().any(|id| id == region))
                .unwrap_or(false)
        })
        .collect();
    sort_by_rank(&mut candidates, now);
    candidates
}
