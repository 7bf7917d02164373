//! Per-turn resource budget.
//!
//! [`TurnBudget`] is a plain value owned by the turn engine for the lifetime
//! of one turn. Both checks mutate the counters first and compare second, so
//! an over-limit call is still recorded; the engine can then report exactly
//! how the limit was reached.

use serde::Serialize;

use crate::config::TurnConfig;

/// Which ceiling a denied call ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLimit {
    /// Too many tool round-trips.
    MaxTurnRequests,
    /// Too many tokens.
    MaxTokens,
}

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Still within budget.
    Allowed,
    /// The named limit was exceeded by this call.
    Denied(BudgetLimit),
}

impl BudgetDecision {
    /// `true` for [`BudgetDecision::Allowed`].
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Configured ceilings; `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetLimits {
    /// Maximum tool round-trips per turn.
    pub max_round_trips: Option<u64>,
    /// Maximum tokens per turn.
    pub max_tokens: Option<u64>,
}

impl From<&TurnConfig> for BudgetLimits {
    fn from(config: &TurnConfig) -> Self {
        Self {
            max_round_trips: config.max_turn_requests,
            max_tokens: config.max_tokens,
        }
    }
}

/// Counters plus ceilings for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnBudget {
    round_trips: u64,
    tokens_used: u64,
    limits: BudgetLimits,
}

impl TurnBudget {
    /// Fresh counters under `limits`.
    #[must_use]
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            round_trips: 0,
            tokens_used: 0,
            limits,
        }
    }

    /// Count one more round-trip and check it against `max_round_trips`.
    pub fn try_consume_round_trip(&mut self) -> BudgetDecision {
        self.round_trips = self.round_trips.saturating_add(1);
        match self.limits.max_round_trips {
            Some(max) if self.round_trips > max => {
                BudgetDecision::Denied(BudgetLimit::MaxTurnRequests)
            }
            _ => BudgetDecision::Allowed,
        }
    }

    /// Add `tokens` to the running total and check it against `max_tokens`.
    pub fn record_token_usage(&mut self, tokens: u64) -> BudgetDecision {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
        match self.limits.max_tokens {
            Some(max) if self.tokens_used > max => BudgetDecision::Denied(BudgetLimit::MaxTokens),
            _ => BudgetDecision::Allowed,
        }
    }

    /// Round-trips counted so far, including a denied one.
    #[must_use]
    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    /// Tokens counted so far, including a denied batch.
    #[must_use]
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    /// Configured ceilings.
    #[must_use]
    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    /// The first limit the counters currently exceed, if any.
    #[must_use]
    pub fn exceeded(&self) -> Option<BudgetLimit> {
        if self
            .limits
            .max_round_trips
            .is_some_and(|max| self.round_trips > max)
        {
            return Some(BudgetLimit::MaxTurnRequests);
        }
        if self
            .limits
            .max_tokens
            .is_some_and(|max| self.tokens_used > max)
        {
            return Some(BudgetLimit::MaxTokens);
        }
        None
    }
}
