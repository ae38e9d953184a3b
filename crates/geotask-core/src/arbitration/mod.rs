//! Switch arbitration.
//!
//! Decides what happens to a start request while another task holds the
//! active slot. The arbitrator is pure: it looks at two ranks and a policy
//! and never touches scheduler state.

mod switch;

pub use switch::{SwitchId, SwitchRequest, SwitchResponder};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ranking::{rank, EffectivePriority};
use crate::task::TaskRecord;

/// Outcome of arbitrating a candidate against the incumbent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Candidate takes the active slot now
    StartImmediately,
    /// Candidate is snoozed for the given duration
    DeferCandidate(Duration),
    /// Too close to call; ask the external decision-maker
    EscalateToExternalDecision,
}

/// Tunables for [`SwitchArbitrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationPolicy {
    /// Score lead a candidate needs over the incumbent to preempt it.
    /// Zero means any strict lead.
    pub preemption_margin: u32,
    /// Score distance treated as ambiguous. Zero means exact score ties only.
    pub escalation_band: u32,
    /// When false, ambiguous cases defer instead of escalating.
    pub escalate_ties: bool,
    /// Snooze applied to deferred candidates.
    #[serde(with = "duration_secs")]
    pub default_snooze: Duration,
}

impl Default for ArbitrationPolicy {
    fn default() -> Self {
        Self {
            preemption_margin: 0,
            escalation_band: 0,
            escalate_ties: true,
            default_snooze: Duration::minutes(10),
        }
    }
}

/// Stateless decision function over an [`ArbitrationPolicy`].
#[derive(Debug, Clone, Default)]
pub struct SwitchArbitrator {
    policy: ArbitrationPolicy,
}

impl SwitchArbitrator {
    pub fn new(policy: ArbitrationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ArbitrationPolicy {
        &self.policy
    }

    pub fn arbitrate(
        &self,
        incumbent: Option<&TaskRecord>,
        candidate: &TaskRecord,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(incumbent) = incumbent else {
            return Decision::StartImmediately;
        };
        let decision = self.compare(rank(incumbent, now), rank(candidate, now));
        debug!(
            incumbent = ?incumbent.id,
            candidate = ?candidate.id,
            ?decision,
            "arbitrated start request"
        );
        decision
    }

    /// Decide from precomputed ranks.
    ///
    /// With a zero band only ranks of the same standing are ambiguous, and
    /// everything else is decided by the full rank order. A non-zero band
    /// treats scores within that distance as ambiguous.
    pub fn compare(&self, incumbent: EffectivePriority, candidate: EffectivePriority) -> Decision {
        let lead = i64::from(candidate.score()) - i64::from(incumbent.score());
        let band = i64::from(self.policy.escalation_band);
        let margin = i64::from(self.policy.preemption_margin);

        let ambiguous = if band == 0 {
            candidate.same_standing(&incumbent)
        } else {
            lead.abs() <= band
        };
        let outranks = candidate > incumbent && (margin == 0 || lead > margin);

        if ambiguous {
            if self.policy.escalate_ties {
                Decision::EscalateToExternalDecision
            } else {
                Decision::DeferCandidate(self.policy.default_snooze)
            }
        } else if outranks {
            Decision::StartImmediately
        } else {
            Decision::DeferCandidate(self.policy.default_snooze)
        }
    }
}

/// Serde helper storing a `chrono::Duration` as whole seconds.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}
