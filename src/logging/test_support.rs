//! Recording sinks shared by unit tests

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{CrashDumpSink, Fault, LogEntry, Severity, Sink, SinkError};

/// One call received by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Debug(String),
    Info(String),
    Warning(String),
    WarningFault(Fault),
    Error(String),
    ErrorFault(Fault),
}

/// Sink that remembers every call it receives
pub struct RecordingSink {
    name: String,
    threshold: Mutex<Severity>,
    mirror: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
    fail: bool,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingSink {
    pub fn new(name: &str, threshold: Severity) -> Self {
        Self {
            name: name.to_string(),
            threshold: Mutex::new(threshold),
            mirror: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
            fail: false,
            journal: None,
        }
    }

    /// A sink whose every call fails
    pub fn failing(name: &str, threshold: Severity) -> Self {
        Self {
            fail: true,
            ..Self::new(name, threshold)
        }
    }

    /// Also append `name:message` to a journal shared between sinks
    pub fn with_journal(mut self, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(Arc::clone(journal));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, text: &str) -> Result<(), SinkError> {
        if self.fail {
            *self.threshold.lock().unwrap() = Severity::Silent;
            return Err(SinkError::Console(io::Error::new(
                io::ErrorKind::Other,
                "boom",
            )));
        }
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, text));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn threshold(&self) -> Severity {
        *self.threshold.lock().unwrap()
    }

    fn set_threshold(&self, threshold: Severity) {
        *self.threshold.lock().unwrap() = threshold;
    }

    fn set_mirror_to_console(&self, mirror: bool) {
        *self.mirror.lock().unwrap() = mirror;
    }

    fn log_debug(&self, message: &str) -> Result<(), SinkError> {
        self.record(Call::Debug(message.to_string()), message)
    }

    fn log_info(&self, message: &str) -> Result<(), SinkError> {
        self.record(Call::Info(message.to_string()), message)
    }

    fn log_warning(&self, message: &str) -> Result<(), SinkError> {
        self.record(Call::Warning(message.to_string()), message)
    }

    fn log_warning_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.record(Call::WarningFault(fault.clone()), &fault.message)
    }

    fn log_error(&self, message: &str) -> Result<(), SinkError> {
        self.record(Call::Error(message.to_string()), message)
    }

    fn log_error_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.record(Call::ErrorFault(fault.clone()), &fault.message)
    }
}

type Dump = (String, String, Vec<LogEntry>);

/// Crash dump sink that remembers every dump it receives
pub struct RecordingCrashSink {
    name: String,
    dumps: Mutex<Vec<Dump>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingCrashSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dumps: Mutex::new(Vec::new()),
            fail: false,
            delay: None,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    /// A sink that takes a while to write its dump
    pub fn slow(name: &str) -> Self {
        Self {
            delay: Some(Duration::from_millis(20)),
            ..Self::new(name)
        }
    }

    pub fn dumps(&self) -> Vec<Dump> {
        self.dumps.lock().unwrap().clone()
    }
}

impl CrashDumpSink for RecordingCrashSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn dump_crash(
        &self,
        sender: &str,
        version: &str,
        history: &[LogEntry],
    ) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(SinkError::Console(io::Error::new(
                io::ErrorKind::Other,
                "dump failed",
            )));
        }
        self.dumps
            .lock()
            .unwrap()
            .push((sender.to_string(), version.to_string(), history.to_vec()));
        Ok(())
    }
}

/// Writer sharing its buffer with the test
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose reader has gone away
pub struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
