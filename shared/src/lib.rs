//! Shared types for the log-shipping agent
//!
//! Contains the node identity, the queue record codec, the error type and
//! the logging setup used by every component.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

pub use errors::*;
pub use types::*;

pub use messages::{decode_record, encode_record, LogEvent, BUSINESS_HEADER};
