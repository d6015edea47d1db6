//! Message types for the log-shipping agent
//!
//! - `record`: queue payload codec and the event forwarded to collectors

pub mod record;

pub use record::{decode_record, encode_record, LogEvent, BUSINESS_HEADER};
