//! Capabilities the dispatcher fans entries out to

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::entry::LogEntry;
use super::fault::Fault;
use super::severity::Severity;

/// Failure raised by a sink while handling a call
///
/// Sinks disable themselves before returning one of these; the dispatcher
/// only reports it.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("console write failed: {0}")]
    Console(#[source] io::Error),
}

/// A destination for individual log calls
///
/// Implementations use interior mutability; the dispatcher only holds shared
/// references.
pub trait Sink: Send + Sync {
    /// Short name used when reporting failures
    fn name(&self) -> &str;

    fn threshold(&self) -> Severity;

    fn set_threshold(&self, threshold: Severity);

    /// Toggle duplicating written lines to stdout
    fn set_mirror_to_console(&self, mirror: bool);

    fn log_debug(&self, message: &str) -> Result<(), SinkError>;

    fn log_info(&self, message: &str) -> Result<(), SinkError>;

    fn log_warning(&self, message: &str) -> Result<(), SinkError>;

    fn log_warning_fault(&self, fault: &Fault) -> Result<(), SinkError>;

    fn log_error(&self, message: &str) -> Result<(), SinkError>;

    fn log_error_fault(&self, fault: &Fault) -> Result<(), SinkError>;
}

/// A destination for full crash dumps of the recent history
pub trait CrashDumpSink: Send + Sync {
    fn name(&self) -> &str;

    /// Write a dump of `history`, oldest entry first
    fn dump_crash(&self, sender: &str, version: &str, history: &[LogEntry])
        -> Result<(), SinkError>;
}
