//! Prompt turn engine.
//!
//! Drives one [`Turn`] from the user message to a single [`StopReason`]:
//!
//! ```text
//! Idle ──send prompt──▶ AwaitingBackend ◀──tool result sent── ExecutingTool
//!                           │   ▲                                   ▲
//!                           │   └── AssistantDelta (ContentChunk) ──┤
//!                           │                                       │
//!                           ├── ToolRequest ── budget ok ───────────┘
//!                           ├── ToolRequest ── budget denied ──▶ Terminated(MaxTurnRequests)
//!                           └── TurnResult ──▶ Terminated(EndTurn | MaxTokens | Refusal)
//!
//! any suspension point ── cancellation ──▶ Terminated(Cancelled)
//! ```
//!
//! Every wait goes through a `biased` `select!` with the cancellation token
//! first, so each suspension point is a cancellation checkpoint. That
//! includes delivering progress updates to a slow client; only terminal
//! notifications (a tool's closing status, the stop reason) are delivered
//! unconditionally. All state
//! (budget, stop reason) is touched only from this single loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::TurnRegistry;
use super::{ClientUpdate, StopReason, Turn, TurnState};
use crate::backend::{BackendItem, BackendLink};
use crate::budget::{BudgetDecision, BudgetLimits};
use crate::client::UpdateEmitter;
use crate::config::TurnConfig;
use crate::protocol::{
    BackendEvent, OutboundMessage, ToolRequest, ToolResultMessage, TurnResult, UserContent,
};
use crate::refusal::{PatternRefusalDetector, RefusalDetector};
use crate::tools::{ToolCallContent, ToolCoordinator, ToolExecution};
use crate::{AppError, Result};

/// Raw backend stop reasons that mean the model ran out of tokens.
pub const MAX_TOKENS_STOP_REASONS: &[&str] = &["max_tokens", "model_context_window_exceeded"];

/// Result subtype the backend uses when its own turn limit is hit.
pub const BACKEND_MAX_TURNS_SUBTYPE: &str = "error_max_turns";

/// How a wait ended.
enum Wait<T> {
    Ready(T),
    Cancelled,
}

/// Drives prompt turns.
pub struct TurnEngine<E> {
    config: TurnConfig,
    coordinator: ToolCoordinator,
    refusal: Arc<dyn RefusalDetector>,
    registry: TurnRegistry,
    emitter: E,
}

impl<E: UpdateEmitter> TurnEngine<E> {
    /// Engine using the default phrase-table refusal detector.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the refusal detector cannot be built.
    pub fn new(config: TurnConfig, coordinator: ToolCoordinator, emitter: E) -> Result<Self> {
        let refusal = PatternRefusalDetector::new(config.refusal_short_text_threshold)?;
        Ok(Self {
            config,
            coordinator,
            refusal: Arc::new(refusal),
            registry: TurnRegistry::new(),
            emitter,
        })
    }

    /// Replace the refusal detector.
    #[must_use]
    pub fn with_refusal_detector(mut self, detector: Arc<dyn RefusalDetector>) -> Self {
        self.refusal = detector;
        self
    }

    /// Share an existing registry, e.g. one also consulted by session management.
    #[must_use]
    pub fn with_registry(mut self, registry: TurnRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registry of live turns.
    #[must_use]
    pub fn registry(&self) -> &TurnRegistry {
        &self.registry
    }

    /// A fresh idle turn for `session_id` under this engine's limits.
    #[must_use]
    pub fn new_turn(&self, session_id: &str) -> Turn {
        Turn::new(session_id, BudgetLimits::from(&self.config))
    }

    /// Whether `session_id` has a turn in flight.
    #[must_use]
    pub fn is_turn_active(&self, session_id: &str) -> bool {
        self.registry.is_active(session_id)
    }

    /// Drive `turn` to completion.
    ///
    /// On success the stop reason has been assigned to `turn` and emitted
    /// as the last [`ClientUpdate`].
    ///
    /// # Errors
    ///
    /// - [`AppError::TurnActive`] if the session already has a live turn.
    /// - [`AppError::Backend`] if the backend goes away before its result.
    /// - [`AppError::BackendReported`] for a non-budget error result.
    /// - [`AppError::Protocol`] for an empty prompt, or a malformed line in
    ///   strict mode.
    /// - [`AppError::ToolCallMismatch`] if a tool result is keyed wrongly.
    ///
    /// No stop reason is emitted on error. If the prompt had reached the
    /// backend, its round is interrupted and drained first so the next turn
    /// on `backend` starts clean.
    pub async fn run_turn(
        &self,
        turn: &mut Turn,
        backend: &mut BackendLink,
        prompt: UserContent,
        cancel: &CancellationToken,
    ) -> Result<StopReason> {
        let _slot = self.registry.try_begin(turn.session_id(), turn.id())?;
        info!(
            session_id = turn.session_id(),
            turn_id = turn.id(),
            "prompt turn started"
        );

        match self.drive(turn, backend, prompt, cancel).await {
            Ok(stop_reason) => {
                turn.terminate(stop_reason)?;
                info!(
                    session_id = turn.session_id(),
                    turn_id = turn.id(),
                    ?stop_reason,
                    round_trips = turn.budget().round_trips(),
                    tokens_used = turn.budget().tokens_used(),
                    "prompt turn finished"
                );
                self.emit(turn, ClientUpdate::StopReasonReached { stop_reason })
                    .await;
                Ok(stop_reason)
            }
            Err(err) => {
                if round_left_open(turn, &err) {
                    self.stop_backend(turn, backend).await;
                }
                warn!(
                    session_id = turn.session_id(),
                    turn_id = turn.id(),
                    error = %err,
                    "prompt turn failed"
                );
                turn.fail(err.to_string());
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        turn: &mut Turn,
        backend: &mut BackendLink,
        prompt: UserContent,
        cancel: &CancellationToken,
    ) -> Result<StopReason> {
        if prompt.is_empty() {
            return Err(AppError::Protocol("prompt must not be empty".into()));
        }

        if let Wait::Cancelled = send(backend, OutboundMessage::User(prompt), cancel).await? {
            // Nothing reached the backend, so there is nothing to stop.
            return Ok(StopReason::Cancelled);
        }
        turn.transition(TurnState::AwaitingBackend)?;

        let mut assistant_text = String::new();
        let mut last_stop_raw: Option<String> = None;

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(self.abandon_round(turn, backend).await),
                item = backend.recv() => item,
            };

            let event = match item {
                None => {
                    return Err(AppError::Backend(
                        "backend channel closed before turn result".into(),
                    ))
                }
                Some(BackendItem::Closed { reason }) => {
                    return Err(AppError::Backend(format!(
                        "backend output ended before turn result: {reason}"
                    )))
                }
                Some(BackendItem::Malformed(malformed)) => {
                    if self.config.strict_protocol {
                        return Err(AppError::Protocol(format!(
                            "{malformed}: {}",
                            malformed.raw_line
                        )));
                    }
                    warn!(
                        session_id = turn.session_id(),
                        reason = malformed.reason.as_str(),
                        raw_line = malformed.raw_line.as_str(),
                        "skipping malformed backend line"
                    );
                    continue;
                }
                Some(BackendItem::Event(event)) => event,
            };

            match event {
                BackendEvent::SystemInit {
                    model,
                    session_token,
                } => {
                    debug!(
                        session_id = turn.session_id(),
                        model = model.as_deref(),
                        "backend session initialised"
                    );
                    turn.record_backend_session(session_token, model);
                }
                BackendEvent::AssistantDelta { text } => {
                    assistant_text.push_str(&text);
                    let chunk = ClientUpdate::ContentChunk { text };
                    if let Wait::Cancelled = self.emit_progress(turn, chunk, cancel).await {
                        return Ok(self.abandon_round(turn, backend).await);
                    }
                }
                BackendEvent::AssistantStop { stop_reason_raw } => {
                    last_stop_raw = Some(stop_reason_raw);
                }
                BackendEvent::ToolRequest(request) => {
                    if let BudgetDecision::Denied(limit) = turn.budget_mut().try_consume_round_trip()
                    {
                        info!(
                            session_id = turn.session_id(),
                            tool_call_id = request.id.as_str(),
                            ?limit,
                            round_trips = turn.budget().round_trips(),
                            "round-trip budget exhausted; tool not dispatched"
                        );
                        self.stop_backend(turn, backend).await;
                        return Ok(StopReason::MaxTurnRequests);
                    }

                    turn.begin_round_trip(&request.id, &request.name);
                    turn.transition(TurnState::ExecutingTool {
                        tool_call_id: request.id.clone(),
                    })?;

                    let Wait::Ready(result) = self.run_tool(turn, request, cancel).await? else {
                        return Ok(self.abandon_round(turn, backend).await);
                    };

                    if let Wait::Cancelled =
                        send(backend, OutboundMessage::ToolResult(result), cancel).await?
                    {
                        return Ok(self.abandon_round(turn, backend).await);
                    }
                    turn.transition(TurnState::AwaitingBackend)?;
                }
                BackendEvent::TurnResult(result) => {
                    return self.classify(turn, result, last_stop_raw, &assistant_text);
                }
                BackendEvent::Unknown { kind } => {
                    debug!(
                        session_id = turn.session_id(),
                        kind = kind.as_str(),
                        "ignoring backend event"
                    );
                }
            }
        }
    }

    /// Run one tool to its terminal status, forwarding every update.
    ///
    /// On cancellation the tool is aborted and, if the client has seen it,
    /// closed with a `failed` status. Nothing goes back to the backend.
    async fn run_tool(
        &self,
        turn: &mut Turn,
        request: ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<Wait<ToolResultMessage>> {
        let mut execution = self.coordinator.execute(turn.session_id(), request.clone());
        let mut announced = false;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => Wait::Cancelled,
                next = execution.next_update() => Wait::Ready(next),
            };
            let Wait::Ready(next) = next else {
                self.abandon_tool(turn, &mut execution, announced).await;
                return Ok(Wait::Cancelled);
            };

            let Some(update) = next else {
                return Err(AppError::Tool(format!(
                    "tool '{}' finished without a terminal status",
                    request.name
                )));
            };

            if update.status.is_terminal() {
                let (text, is_error) = update
                    .content
                    .as_ref()
                    .map(ToolCallContent::to_result_text)
                    .unwrap_or_default();
                let tool_call_id = update.tool_call_id.clone();
                turn.complete_round_trip(&tool_call_id, update.status);
                self.emit(turn, ClientUpdate::ToolCallStatus(update)).await;
                let result = ToolResultMessage::checked(&request, &tool_call_id, text, is_error)?;
                return Ok(Wait::Ready(result));
            }

            let progress = ClientUpdate::ToolCallStatus(update);
            if let Wait::Cancelled = self.emit_progress(turn, progress, cancel).await {
                self.abandon_tool(turn, &mut execution, announced).await;
                return Ok(Wait::Cancelled);
            }
            announced = true;
        }
    }

    /// Close a tool invocation cut off by cancellation.
    async fn abandon_tool(&self, turn: &mut Turn, execution: &mut ToolExecution, announced: bool) {
        debug!(
            session_id = turn.session_id(),
            tool_call_id = execution.request().id.as_str(),
            "cancelled while tool running; its result will be discarded"
        );
        let Some(update) = execution.abandon("cancelled") else {
            return;
        };
        turn.complete_round_trip(&update.tool_call_id, update.status);
        if announced {
            self.emit(turn, ClientUpdate::ToolCallStatus(update)).await;
        }
    }

    /// Map a terminal backend result to a stop reason.
    ///
    /// Order of precedence: token budget, backend error, raw max-tokens
    /// string, refusal, end of turn.
    fn classify(
        &self,
        turn: &mut Turn,
        result: TurnResult,
        last_stop_raw: Option<String>,
        assistant_text: &str,
    ) -> Result<StopReason> {
        if let Some(token) = result.session_token.clone() {
            turn.record_backend_session(token, None);
        }

        let usage = result.token_usage.total();
        if let BudgetDecision::Denied(limit) = turn.budget_mut().record_token_usage(usage) {
            info!(
                session_id = turn.session_id(),
                ?limit,
                tokens_used = turn.budget().tokens_used(),
                "token budget exhausted"
            );
            return Ok(StopReason::MaxTokens);
        }

        if result.is_error {
            if result.subtype == BACKEND_MAX_TURNS_SUBTYPE {
                return Ok(StopReason::MaxTurnRequests);
            }
            return Err(AppError::BackendReported(format!(
                "{}: {}",
                result.subtype,
                result.result_text.unwrap_or_default()
            )));
        }

        let raw = result.stop_reason_raw.or(last_stop_raw);
        if raw
            .as_deref()
            .is_some_and(|raw| MAX_TOKENS_STOP_REASONS.contains(&raw))
        {
            return Ok(StopReason::MaxTokens);
        }

        if self
            .refusal
            .is_refusal(assistant_text, assistant_text.chars().count())
        {
            info!(session_id = turn.session_id(), "assistant reply classified as refusal");
            return Ok(StopReason::Refusal);
        }

        Ok(StopReason::EndTurn)
    }

    /// Cancellation path for a round that reached the backend.
    async fn abandon_round(&self, turn: &Turn, backend: &mut BackendLink) -> StopReason {
        info!(
            session_id = turn.session_id(),
            turn_id = turn.id(),
            "turn cancelled"
        );
        self.stop_backend(turn, backend).await;
        StopReason::Cancelled
    }

    /// Ask the backend to stop, then discard its output until the
    /// interrupted round closes or the drain window elapses.
    async fn stop_backend(&self, turn: &Turn, backend: &mut BackendLink) {
        if let Err(err) = backend.request_stop() {
            warn!(
                session_id = turn.session_id(),
                error = %err,
                "could not signal backend to stop"
            );
        }

        let mut discarded = 0usize;
        let drained = tokio::time::timeout(self.config.cancel_drain_timeout(), async {
            while let Some(item) = backend.recv().await {
                match item {
                    BackendItem::Event(BackendEvent::TurnResult(_))
                    | BackendItem::Closed { .. } => break,
                    _ => discarded += 1,
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                session_id = turn.session_id(),
                discarded, "backend did not close the interrupted round in time"
            );
        } else {
            debug!(
                session_id = turn.session_id(),
                discarded, "interrupted round drained"
            );
        }
    }

    /// Deliver a non-terminal update unless cancellation wins first.
    async fn emit_progress(
        &self,
        turn: &Turn,
        update: ClientUpdate,
        cancel: &CancellationToken,
    ) -> Wait<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Wait::Cancelled,
            () = self.emit(turn, update) => Wait::Ready(()),
        }
    }

    async fn emit(&self, turn: &Turn, update: ClientUpdate) {
        if let Err(err) = self.emitter.emit(turn.session_id(), update).await {
            warn!(
                session_id = turn.session_id(),
                error = %err,
                "failed to deliver client update"
            );
        }
    }
}

/// Whether a failed turn left a backend round running.
///
/// True once the prompt was sent, unless the backend already closed the
/// round itself (an error result) or went away.
fn round_left_open(turn: &Turn, err: &AppError) -> bool {
    !matches!(turn.state(), TurnState::Idle)
        && !matches!(err, AppError::Backend(_) | AppError::BackendReported(_))
}

/// Queue `message` for the backend unless cancellation wins first.
async fn send(
    backend: &BackendLink,
    message: OutboundMessage,
    cancel: &CancellationToken,
) -> Result<Wait<()>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Ok(Wait::Cancelled),
        sent = backend.send(message) => sent.map(Wait::Ready),
    }
}
