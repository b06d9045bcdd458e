//! Lifecycle states for workflow entities
//!
//! Two parameterized machines share one engine: control lists and work
//! sessions each define their allowed-edge set here. Unknown edges are
//! rejected regardless of role, independently of the policy engine.

use crate::policy::Action;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for statuses governed by the shared state machine engine
pub trait WorkflowStatus:
    Copy + Clone + Debug + PartialEq + Eq + Send + Sync + 'static
{
    /// Stable lowercase name, used in event types and error messages
    fn name(&self) -> &'static str;

    /// Whether this is a terminal state (no outgoing transitions)
    fn is_terminal(&self) -> bool;

    /// All legal target states from this state
    fn valid_transitions(&self) -> Vec<Self>;

    /// The policy action a transition to `target` corresponds to
    ///
    /// Returns `None` for edges outside the allowed set.
    fn action_for(&self, target: &Self) -> Option<Action>;

    /// Whether a review transition (approve/reject) is legal from here
    fn is_reviewable(&self) -> bool;

    /// Whether this state permits operator edits
    fn allows_operator_edit(&self) -> bool;

    /// Check if a transition to the target state is in the edge set
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }
}

/// Lifecycle states of a control list
///
/// `pending -> completed -> {approved, rejected}`, with
/// `rejected -> pending` (revert-to-resubmit) and `pending -> expired`
/// reached by a time-based trigger. `approved` and `expired` are terminal;
/// `rejected` is resubmittable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlListStatus {
    /// Being filled by the owning operator
    Pending,
    /// Submitted, awaiting review
    Completed,
    /// Terminal: accepted by a manager
    Approved,
    /// Sent back by a manager, resubmittable
    Rejected,
    /// Terminal: scheduled date passed without completion
    Expired,
}

impl WorkflowStatus for ControlListStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Expired)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ControlListStatus::*;

        match self {
            Pending => vec![Completed, Expired],
            Completed => vec![Approved, Rejected],
            Rejected => vec![Pending],
            Approved | Expired => vec![],
        }
    }

    fn action_for(&self, target: &Self) -> Option<Action> {
        use ControlListStatus::*;

        match (self, target) {
            (Pending, Completed) => Some(Action::Complete),
            (Pending, Expired) => Some(Action::Expire),
            (Completed, Approved) => Some(Action::Approve),
            (Completed, Rejected) => Some(Action::Reject),
            (Rejected, Pending) => Some(Action::Resubmit),
            _ => None,
        }
    }

    fn is_reviewable(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn allows_operator_edit(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl Default for ControlListStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Lifecycle states of a work session
///
/// `in_progress -> completed -> {approved, rejected}`. Both review outcomes
/// are terminal; a rejected session is closed and a new one is opened
/// instead of reverting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkSessionStatus {
    /// The operator is on the machine
    InProgress,
    /// Ended, awaiting review
    Completed,
    /// Terminal: accepted by a manager
    Approved,
    /// Terminal: declined by a manager
    Rejected,
}

impl WorkflowStatus for WorkSessionStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use WorkSessionStatus::*;

        match self {
            InProgress => vec![Completed],
            Completed => vec![Approved, Rejected],
            Approved | Rejected => vec![],
        }
    }

    fn action_for(&self, target: &Self) -> Option<Action> {
        use WorkSessionStatus::*;

        match (self, target) {
            (InProgress, Completed) => Some(Action::Complete),
            (Completed, Approved) => Some(Action::Approve),
            (Completed, Rejected) => Some(Action::Reject),
            _ => None,
        }
    }

    fn is_reviewable(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn allows_operator_edit(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl Default for WorkSessionStatus {
    fn default() -> Self {
        Self::InProgress
    }
}
