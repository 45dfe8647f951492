//! Utility modules for the bridge.

mod time_parser;

pub use time_parser::{TimeParseError, parse_timestamp};
