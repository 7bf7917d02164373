//! Per-session active-turn tracking.
//!
//! Session management lives outside this crate; it asks the registry
//! whether a turn is live before accepting another prompt. Slots are
//! released by dropping the [`ActiveTurnGuard`], so a turn that errors out
//! or is abandoned mid-flight never leaves its session wedged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{AppError, Result};

/// Shared map type alias: `session_id` → live `turn_id`.
type ActiveMap = Arc<Mutex<HashMap<String, String>>>;

/// Tracks which sessions have a turn in flight.
#[derive(Debug, Clone, Default)]
pub struct TurnRegistry {
    active: ActiveMap,
}

impl TurnRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id` for `turn_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::TurnActive`] if the session already has a live turn.
    pub fn try_begin(&self, session_id: &str, turn_id: &str) -> Result<ActiveTurnGuard> {
        let mut active = lock(&self.active);
        if let Some(existing) = active.get(session_id) {
            return Err(AppError::TurnActive(format!(
                "session '{session_id}' already has turn '{existing}' in flight"
            )));
        }
        active.insert(session_id.to_owned(), turn_id.to_owned());
        debug!(session_id, turn_id, "turn registry: slot claimed");

        Ok(ActiveTurnGuard {
            active: Arc::clone(&self.active),
            session_id: session_id.to_owned(),
            turn_id: turn_id.to_owned(),
        })
    }

    /// Whether `session_id` has a turn in flight.
    #[must_use]
    pub fn is_active(&self, session_id: &str) -> bool {
        lock(&self.active).contains_key(session_id)
    }

    /// The live turn for `session_id`, if any.
    #[must_use]
    pub fn active_turn(&self, session_id: &str) -> Option<String> {
        lock(&self.active).get(session_id).cloned()
    }
}

/// Holds a session's turn slot; releases it on drop.
#[derive(Debug)]
pub struct ActiveTurnGuard {
    active: ActiveMap,
    session_id: String,
    turn_id: String,
}

impl ActiveTurnGuard {
    /// Session this guard holds.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for ActiveTurnGuard {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if active.get(&self.session_id) == Some(&self.turn_id) {
            active.remove(&self.session_id);
            debug!(
                session_id = self.session_id.as_str(),
                turn_id = self.turn_id.as_str(),
                "turn registry: slot released"
            );
        }
    }
}

fn lock(map: &ActiveMap) -> MutexGuard<'_, HashMap<String, String>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
