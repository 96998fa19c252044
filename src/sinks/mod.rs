//! Built-in sinks
//!
//! Console output, rotating plain-text files and HTML files. The file sinks
//! also write crash dumps.

mod console;
mod html;
mod palette;
mod retention;
mod text;

pub use console::ConsoleSink;
pub use html::HtmlFileSink;
pub use palette::Rgb;
pub use retention::cleanup_old_files;
pub use text::TextFileSink;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::config::Config;
use crate::logging::{Dispatcher, Severity, SinkError};

/// Timestamp format used at the start of every line
const LINE_TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Threshold and console mirroring shared by every sink
#[derive(Debug, Clone, Copy)]
struct Controls {
    threshold: Severity,
    mirror: bool,
}

impl Controls {
    fn new(threshold: Severity) -> Self {
        Self {
            threshold,
            mirror: false,
        }
    }
}

/// Line-oriented console output, stdout unless a test swaps the writer
struct ConsoleWriter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleWriter {
    fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }

    /// Write and flush one line, reporting failures instead of panicking
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())
            .and_then(|_| out.flush())
            .map_err(SinkError::Console)
    }
}

/// Generate a timestamped file path: `<prefix><dd.mm.yyyy> at <HH-MM-SS>.<extension>`
pub fn create_log_file_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let now = Local::now();
    dir.join(format!(
        "{}{} at {}.{}",
        prefix,
        now.format("%d.%m.%Y"),
        now.format("%H-%M-%S"),
        extension
    ))
}

fn format_timestamp(timestamp: &DateTime<Local>) -> String {
    timestamp.format(LINE_TIMESTAMP_FORMAT).to_string()
}

/// Plain line: timestamp padded to 20, level padded to 5, two spaces, message
fn format_line(timestamp: &DateTime<Local>, level: &str, message: &str) -> String {
    format!(
        "{:<20} {:<5}  {}\n",
        format_timestamp(timestamp),
        level,
        message
    )
}

/// Append `text` to the file at `path`, opening and closing it for this write
fn append_to_file(path: &Path, text: &str) -> Result<(), SinkError> {
    let write = || -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        file.flush()
    };
    write().map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create the file sinks enabled in `config` and register them with `dispatcher`
///
/// Each file sink is registered both as a sink and as a crash dump sink.
/// Returns the number of sinks registered.
pub fn register_from_config(dispatcher: &Dispatcher, config: &Config) -> Result<usize> {
    config.ensure_directories()?;
    let mut registered = 0;

    if config.text_sink {
        let sink = Arc::new(TextFileSink::from_config(config));
        dispatcher.register_sink(sink.clone());
        dispatcher.register_crash_dump_sink(sink);
        registered += 1;
    }

    if config.html_sink {
        let sink = Arc::new(HtmlFileSink::from_config(config));
        dispatcher.register_sink(sink.clone());
        dispatcher.register_crash_dump_sink(sink);
        registered += 1;
    }

    tracing::info!(
        "Registered {} file sinks in {}",
        registered,
        config.log_dir.display()
    );
    Ok(registered)
}
