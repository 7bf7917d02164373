//! Prompt turns.
//!
//! A [`Turn`] is one client prompt cycle: it starts `Idle`, alternates
//! between `AwaitingBackend` and `ExecutingTool`, and ends in exactly one
//! terminal state. The [`engine`] drives it; the [`registry`] enforces one
//! live turn per session.

pub mod engine;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::budget::{BudgetLimits, TurnBudget};
use crate::tools::{ToolCallStatus, ToolCallUpdate};
use crate::{AppError, Result};

pub use engine::TurnEngine;
pub use registry::{ActiveTurnGuard, TurnRegistry};

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its reply.
    EndTurn,
    /// The token budget (or the model's own token ceiling) was hit.
    MaxTokens,
    /// The round-trip budget was hit.
    MaxTurnRequests,
    /// The client cancelled the turn.
    Cancelled,
    /// The model declined the request.
    Refusal,
}

/// Normalised update delivered to the client, in observation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientUpdate {
    /// Incremental assistant text.
    ContentChunk {
        /// Text fragment.
        text: String,
    },
    /// Tool invocation progress.
    ToolCallStatus(ToolCallUpdate),
    /// The turn is over.
    StopReasonReached {
        /// Final classification.
        stop_reason: StopReason,
    },
}

/// Engine state for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    /// Created, nothing sent yet.
    Idle,
    /// Waiting for the next backend event.
    AwaitingBackend,
    /// Waiting for a tool's terminal status.
    ExecutingTool {
        /// Invocation being awaited.
        tool_call_id: String,
    },
    /// Ended with a stop reason.
    Terminated(StopReason),
    /// Ended with a hard failure.
    Failed(String),
}

impl TurnState {
    /// `true` once the turn has ended, either way.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Terminated(_) | Self::Failed(_))
    }
}

/// One tool round-trip within a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    /// Backend tool-use identifier.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// When the tool was dispatched.
    pub started_at: DateTime<Utc>,
    /// Terminal tool status, once known.
    pub outcome: Option<ToolCallStatus>,
}

/// One client prompt cycle.
#[derive(Debug, Clone)]
pub struct Turn {
    id: String,
    session_id: String,
    started_at: DateTime<Utc>,
    state: TurnState,
    round_trips: Vec<RoundTrip>,
    budget: TurnBudget,
    backend_session_token: Option<String>,
    model: Option<String>,
}

impl Turn {
    /// New idle turn for `session_id` with fresh counters under `limits`.
    #[must_use]
    pub fn new(session_id: impl Into<String>, limits: BudgetLimits) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            started_at: Utc::now(),
            state: TurnState::Idle,
            round_trips: Vec::new(),
            budget: TurnBudget::new(limits),
            backend_session_token: None,
            model: None,
        }
    }

    /// Turn identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning session.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Creation time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &TurnState {
        &self.state
    }

    /// Final stop reason, once assigned.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            TurnState::Terminated(reason) => Some(reason),
            _ => None,
        }
    }

    /// Tool round-trips dispatched so far, in order.
    #[must_use]
    pub fn round_trips(&self) -> &[RoundTrip] {
        &self.round_trips
    }

    /// Budget counters.
    #[must_use]
    pub fn budget(&self) -> &TurnBudget {
        &self.budget
    }

    /// Backend session token from the latest init or result event.
    #[must_use]
    pub fn backend_session_token(&self) -> Option<&str> {
        self.backend_session_token.as_deref()
    }

    /// Model reported by the backend.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub(crate) fn budget_mut(&mut self) -> &mut TurnBudget {
        &mut self.budget
    }

    pub(crate) fn record_backend_session(&mut self, token: String, model: Option<String>) {
        self.backend_session_token = Some(token);
        if model.is_some() {
            self.model = model;
        }
    }

    pub(crate) fn begin_round_trip(&mut self, tool_call_id: &str, tool_name: &str) {
        self.round_trips.push(RoundTrip {
            tool_call_id: tool_call_id.to_owned(),
            tool_name: tool_name.to_owned(),
            started_at: Utc::now(),
            outcome: None,
        });
    }

    pub(crate) fn complete_round_trip(&mut self, tool_call_id: &str, outcome: ToolCallStatus) {
        if let Some(trip) = self
            .round_trips
            .iter_mut()
            .rev()
            .find(|trip| trip.tool_call_id == tool_call_id)
        {
            trip.outcome = Some(outcome);
        }
    }

    /// Move to a non-final state.
    pub(crate) fn transition(&mut self, next: TurnState) -> Result<()> {
        if self.state.is_final() {
            return Err(AppError::Protocol(format!(
                "turn {} already ended ({:?}); refusing {next:?}",
                self.id, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Assign the final stop reason. Assignment happens once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the turn already ended.
    pub(crate) fn terminate(&mut self, reason: StopReason) -> Result<()> {
        self.transition(TurnState::Terminated(reason))
    }

    pub(crate) fn fail(&mut self, reason: String) {
        if !self.state.is_final() {
            self.state = TurnState::Failed(reason);
        }
    }
}
