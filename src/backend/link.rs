//! The channel pair a turn uses to talk to the backend.
//!
//! The reader task feeds [`BackendItem`]s into one end; the writer task
//! drains [`OutboundMessage`]s from the other. A turn borrows the
//! [`BackendLink`] mutably for its whole lifetime, which is what keeps the
//! backend's streams owned by a single turn at a time.

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::{BackendEvent, MalformedEvent, OutboundMessage};
use crate::{AppError, Result};

/// Default capacity of both link channels.
pub const DEFAULT_LINK_CAPACITY: usize = 256;

/// One item observed on the backend's output.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendItem {
    /// A parsed event.
    Event(BackendEvent),
    /// A line that could not be parsed.
    Malformed(MalformedEvent),
    /// The output stream ended; no further items follow.
    Closed {
        /// Why the stream ended.
        reason: String,
    },
}

/// Turn-side ends of the backend channels.
#[derive(Debug)]
pub struct BackendLink {
    events: mpsc::Receiver<BackendItem>,
    outbound: mpsc::Sender<OutboundMessage>,
    pid: Option<u32>,
}

/// Transport-side ends of the backend channels.
#[derive(Debug)]
pub struct BackendEnds {
    /// Where the reader task delivers parsed items.
    pub events_tx: mpsc::Sender<BackendItem>,
    /// Where the writer task picks up outbound messages.
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
}

impl BackendLink {
    /// A connected link and its transport ends, each channel bounded by `capacity`.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, BackendEnds) {
        let (events_tx, events) = mpsc::channel(capacity);
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        (
            Self {
                events,
                outbound,
                pid: None,
            },
            BackendEnds {
                events_tx,
                outbound_rx,
            },
        )
    }

    /// Attach the backend process id used as a last-resort stop signal.
    #[must_use]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Backend process id, when known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next backend item, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<BackendItem> {
        self.events.recv().await
    }

    /// Queue `message` for the backend's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] if the writer side has gone away.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        let kind = message.kind();
        self.outbound
            .send(message)
            .await
            .map_err(|_| AppError::Backend(format!("backend stdin closed; {kind} not delivered")))
    }

    /// Best-effort request for the backend to stop its in-flight round-trip.
    ///
    /// Queues an interrupt control request; if that is impossible and the
    /// process id is known, sends `SIGINT` instead (unix only).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] if neither signal could be delivered.
    /// Callers log and carry on.
    pub fn request_stop(&self) -> Result<()> {
        let message = OutboundMessage::Interrupt {
            request_id: Uuid::new_v4().to_string(),
        };
        match self.outbound.try_send(message) {
            Ok(()) => {
                debug!("backend link: interrupt queued");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "backend link: interrupt not queued, signalling process");
                self.signal_process()
            }
        }
    }

    #[cfg(unix)]
    fn signal_process(&self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Err(AppError::Backend("no backend process to signal".into()));
        };
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Backend(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(raw), Signal::SIGINT)
            .map_err(|err| AppError::Backend(format!("SIGINT to {pid} failed: {err}")))
    }

    #[cfg(not(unix))]
    fn signal_process(&self) -> Result<()> {
        Err(AppError::Backend(
            "interrupt channel closed and process signalling is unsupported".into(),
        ))
    }
}
