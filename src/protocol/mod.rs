//! Stream protocol translator for the model backend.
//!
//! The backend speaks line-delimited JSON over its standard streams. This
//! module is the only place that understands that vocabulary:
//!
//! - [`inbound`]: parses one raw output line into zero or more
//!   [`BackendEvent`]s, or a [`MalformedEvent`].
//! - [`outbound`]: serialises user messages, tool results, and interrupt
//!   requests into the line format the backend reads on stdin.
//!
//! Raw stop-reason strings and token accounting are reported verbatim;
//! mapping them onto client-facing stop reasons is the turn engine's job.

pub mod events;
pub mod inbound;
pub mod outbound;

pub use events::{BackendEvent, MalformedEvent, TokenUsage, ToolRequest, TurnResult};
pub use inbound::parse_line;
pub use outbound::{OutboundMessage, ToolResultMessage, UserContent};
