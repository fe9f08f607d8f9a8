//! Observability for the rule engine
//!
//! One log line = one engine event, as structured JSON with
//! deterministic key ordering.

mod logger;

pub use logger::{log, log_to, Severity};
