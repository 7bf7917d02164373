#![forbid(unsafe_code)]

//! ACP agent core: drives prompt turns against a line-delimited
//! streaming-JSON model backend.

pub mod backend;
pub mod budget;
pub mod client;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod refusal;
pub mod tools;
pub mod turn;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
