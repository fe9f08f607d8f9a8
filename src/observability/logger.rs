//! Structured JSON event log
//!
//! - One line per event
//! - Keys in deterministic (lexicographic) order
//! - Synchronous, unbuffered
//! - INFO and below to stdout, WARN and above to stderr
//!
//! Built on `serde_json::Map` (BTree-backed), so ordering and escaping
//! come from the serializer rather than hand-rolled string assembly.

use std::fmt;
use std::io::{self, Write};

use serde_json::{Map, Value};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emits one event line to the appropriate stream.
pub fn log(severity: Severity, event: &str, fields: &[(&str, String)]) {
    if severity >= Severity::Warn {
        log_to(&mut io::stderr(), severity, event, fields);
    } else {
        log_to(&mut io::stdout(), severity, event, fields);
    }
}

/// Emits one event line to the given writer. Exposed so tests can
/// capture output.
pub fn log_to<W: Write>(writer: &mut W, severity: Severity, event: &str, fields: &[(&str, String)]) {
    let mut map = Map::new();
    map.insert("event".into(), Value::String(event.into()));
    map.insert("severity".into(), Value::String(severity.as_str().into()));
    for (key, value) in fields {
        map.insert((*key).into(), Value::String(value.clone()));
    }

    let line = Value::Object(map).to_string();
    let _ = writeln!(writer, "{line}");
    let _ = writer.flush();
}
