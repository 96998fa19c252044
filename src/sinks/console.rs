//! Console sink

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;

use crate::logging::{Fault, Severity, Sink, SinkError};

use super::{format_line, ConsoleWriter, Controls};

/// Sink printing plain lines to stdout, or to any writer
pub struct ConsoleSink {
    controls: Mutex<Controls>,
    out: ConsoleWriter,
}

impl ConsoleSink {
    pub fn stdout(threshold: Severity) -> Self {
        Self::with_writer(io::stdout(), threshold)
    }

    pub fn with_writer(writer: impl Write + Send + 'static, threshold: Severity) -> Self {
        Self {
            controls: Mutex::new(Controls::new(threshold)),
            out: ConsoleWriter::new(writer),
        }
    }

    fn controls(&self) -> MutexGuard<'_, Controls> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, severity: Severity, message: &str) -> Result<(), SinkError> {
        if !self.threshold().admits(severity) {
            return Ok(());
        }
        let line = format_line(&Local::now(), severity.as_str(), message);
        self.out.write_line(&line).map_err(|err| {
            self.set_threshold(Severity::Silent);
            err
        })
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn threshold(&self) -> Severity {
        self.controls().threshold
    }

    fn set_threshold(&self, threshold: Severity) {
        self.controls().threshold = threshold;
    }

    /// Console output is already on the console
    fn set_mirror_to_console(&self, mirror: bool) {
        self.controls().mirror = mirror;
    }

    fn log_debug(&self, message: &str) -> Result<(), SinkError> {
        self.write(Severity::Debug, message)
    }

    fn log_info(&self, message: &str) -> Result<(), SinkError> {
        self.write(Severity::Info, message)
    }

    fn log_warning(&self, message: &str) -> Result<(), SinkError> {
        self.write(Severity::Warning, message)
    }

    fn log_warning_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.write(Severity::Warning, &fault.to_string())
    }

    fn log_error(&self, message: &str) -> Result<(), SinkError> {
        self.write(Severity::Error, message)
    }

    fn log_error_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.write(Severity::Error, &fault.to_string())
    }
}
