//! Severity levels shared by sinks and log entries

use serde::{Deserialize, Serialize};

/// Ordinal log severity
///
/// Higher ordinal means more verbose. The same enumeration is used to tag an
/// entry and as a sink's threshold: a sink accepts an entry when the entry's
/// severity is at or below its threshold.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Silent = 0,
    Error = 1,
    Warning = 2,
    #[default]
    Info = 3,
    Debug = 4,
}

impl Severity {
    /// Get the display name for this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Silent => "SILENT",
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Lowercase name, used as a CSS class by the HTML sink
    pub fn css_class(&self) -> &'static str {
        match self {
            Severity::Silent => "silent",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    /// Check whether a sink at this threshold accepts an entry of `severity`
    ///
    /// Silent on either side never matches.
    pub fn admits(&self, severity: Severity) -> bool {
        *self != Severity::Silent && severity != Severity::Silent && severity <= *self
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Debug,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}
