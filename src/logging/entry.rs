//! A single recorded log event

use std::sync::Arc;

use chrono::{DateTime, Local};

use super::fault::Fault;
use super::severity::Severity;

/// A single log entry
///
/// Built by the dispatcher when it accepts a call. At least one of `message`
/// and `fault` is set.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log message, absent for fault-only calls
    pub message: Option<String>,
    /// Timestamp when the call was accepted
    pub timestamp: DateTime<Local>,
    /// Severity the call was made at
    pub severity: Severity,
    /// Associated fault detail
    pub fault: Option<Arc<Fault>>,
}

impl LogEntry {
    /// Create a message-only entry
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            timestamp: Local::now(),
            severity,
            fault: None,
        }
    }

    /// Create a fault-only entry
    pub fn from_fault(severity: Severity, fault: Arc<Fault>) -> Self {
        Self {
            message: None,
            timestamp: Local::now(),
            severity,
            fault: Some(fault),
        }
    }

    /// Create an entry carrying both a message and a fault
    pub fn with_fault(severity: Severity, message: impl Into<String>, fault: Arc<Fault>) -> Self {
        Self {
            message: Some(message.into()),
            timestamp: Local::now(),
            severity,
            fault: Some(fault),
        }
    }

    /// Message text, or an empty string for fault-only entries
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}
