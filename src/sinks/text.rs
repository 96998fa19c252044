//! Rotating plain-text log files
//!
//! Each line is `timestamp LEVEL  message`. Once the current file grows past the
//! size limit a new numbered file is started, and only the newest few files per
//! prefix are kept. Crash dumps go to their own file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;

use crate::config::{Config, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_BYTES};
use crate::logging::{CrashDumpSink, Fault, LogEntry, Severity, Sink, SinkError};

use super::retention::cleanup_old_files;
use super::{append_to_file, create_log_file_path, format_line, ConsoleWriter, Controls};

pub const DEFAULT_LOG_PREFIX: &str = "Log_";
pub const DEFAULT_CRASH_PREFIX: &str = "Crash_";
const EXTENSION: &str = "txt";

struct TextState {
    controls: Controls,
    prefix: String,
    current: PathBuf,
    /// Number of rotations so far
    file_num: u32,
}

/// Sink writing plain-text log files and crash dumps
pub struct TextFileSink {
    dir: PathBuf,
    crash_prefix: String,
    max_file_bytes: u64,
    max_files: usize,
    state: Mutex<TextState>,
    /// Target of console mirroring
    console: ConsoleWriter,
}

impl TextFileSink {
    /// Create a sink writing into `dir`
    ///
    /// The log file itself is created on the first write.
    pub fn new(dir: impl Into<PathBuf>, threshold: Severity) -> Self {
        Self::with_retention(dir, threshold, DEFAULT_MAX_FILES)
    }

    /// Create a sink keeping at most `max_files` log and crash files per prefix
    ///
    /// Older files already in `dir` are removed right away.
    pub fn with_retention(dir: impl Into<PathBuf>, threshold: Severity, max_files: usize) -> Self {
        let dir = dir.into();
        let sink = Self {
            state: Mutex::new(TextState {
                controls: Controls::new(threshold),
                prefix: DEFAULT_LOG_PREFIX.to_string(),
                current: current_for(&dir, DEFAULT_LOG_PREFIX),
                file_num: 0,
            }),
            dir,
            crash_prefix: DEFAULT_CRASH_PREFIX.to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files,
            console: ConsoleWriter::stdout(),
        };
        sink.cleanup(DEFAULT_LOG_PREFIX);
        sink.cleanup(DEFAULT_CRASH_PREFIX);
        sink
    }

    pub fn from_config(config: &Config) -> Self {
        let sink = Self::with_retention(&config.log_dir, config.default_threshold, config.max_files)
            .with_max_file_bytes(config.max_file_bytes);
        sink.set_mirror_to_console(config.mirror_to_console);
        sink
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Mirror to `writer` instead of stdout
    pub fn with_mirror_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.console = ConsoleWriter::new(writer);
        self
    }

    pub fn with_crash_prefix(mut self, crash_prefix: impl Into<String>) -> Self {
        self.crash_prefix = crash_prefix.into();
        self
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.lock().current.clone()
    }

    /// Switch to a new log file prefix
    ///
    /// The current file is deleted and a fresh one started under the new prefix.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        let mut state = self.lock();
        match fs::remove_file(&state.current) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove {}: {}",
                state.current.display(),
                e
            ),
        }
        state.prefix = prefix.into();
        state.file_num = 0;
        let current = current_for(&self.dir, &state.prefix);
        state.current = current;
    }

    fn lock(&self) -> MutexGuard<'_, TextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cleanup(&self, prefix: &str) {
        if let Err(e) = cleanup_old_files(&self.dir, prefix, EXTENSION, self.max_files) {
            tracing::warn!("Failed to clean up {} files: {}", prefix, e);
        }
    }

    fn write(&self, severity: Severity, message: &str) -> Result<(), SinkError> {
        let (line, mirror, rotated) = {
            let mut state = self.lock();
            if !state.controls.threshold.admits(severity) {
                return Ok(());
            }

            let line = format_line(&Local::now(), severity.as_str(), message);
            if let Err(err) = append_to_file(&state.current, &line) {
                state.controls.threshold = Severity::Silent;
                return Err(err);
            }

            let size = fs::metadata(&state.current).map(|m| m.len()).unwrap_or(0);
            let mut rotated = None;
            if size > self.max_file_bytes {
                state.file_num += 1;
                let rotated_prefix = format!("{}{}_", state.prefix, state.file_num);
                state.current = current_for(&self.dir, &rotated_prefix);
                rotated = Some(state.prefix.clone());
            }
            (line, state.controls.mirror, rotated)
        };

        if let Some(prefix) = rotated {
            self.cleanup(&prefix);
        }
        if mirror {
            self.console.write_line(&line).map_err(|err| {
                self.set_threshold(Severity::Silent);
                err
            })?;
        }
        Ok(())
    }
}

fn current_for(dir: &Path, prefix: &str) -> PathBuf {
    create_log_file_path(dir, prefix, EXTENSION)
}

/// Render a crash dump as plain text
fn render_dump(sender: &str, version: &str, history: &[LogEntry]) -> String {
    let mut dump = String::new();
    dump.push_str(&format!("{} ver. {} CRASH DUMP\n", sender, version));
    dump.push_str("===========================================\n\n");

    for entry in history {
        let level = entry.severity.as_str();
        match entry.severity {
            Severity::Debug | Severity::Info => {
                dump.push_str(&format_line(&entry.timestamp, level, entry.message_text()));
            }
            Severity::Warning | Severity::Error => {
                if let Some(message) = entry.message.as_deref().filter(|m| !m.is_empty()) {
                    dump.push_str(&format_line(&entry.timestamp, level, message));
                }
                if let Some(fault) = &entry.fault {
                    dump.push_str(&format_line(&entry.timestamp, level, &fault.to_string()));
                }
            }
            Severity::Silent => {}
        }
    }
    dump
}

impl Sink for TextFileSink {
    fn name(&self) -> &str {
        "text"
    }

    fn threshold(&self) -> Severity {
        self.lock().controls.threshold
    }

    fn set_threshold(&self, threshold: Severity) {
        self.lock().controls.threshold = threshold;
    }

    fn set_mirror_to_console(&self, mirror: bool) {
        self.lock().controls.mirror = mirror;
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

impl CrashDumpSink for TextFileSink {
    fn name(&self) -> &str {
        "text"
    }

    fn dump_crash(
        &self,
        sender: &str,
        version: &str,
        history: &[LogEntry],
    ) -> Result<(), SinkError> {
        let path = create_log_file_path(&self.dir, &self.crash_prefix, EXTENSION);
        let dump = render_dump(sender, version, history);
        if let Err(err) = append_to_file(&path, &dump) {
            self.set_threshold(Severity::Silent);
            return Err(err);
        }
        self.cleanup(&self.crash_prefix);
        Ok(())
    }
}
