//! HTML log files with colored levels and expandable backtraces

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use crate::config::{Config, DEFAULT_MAX_FILES};
use crate::logging::{CrashDumpSink, Fault, LogEntry, Severity, Sink, SinkError};

use super::palette::Rgb;
use super::retention::cleanup_old_files;
use super::{
    append_to_file, create_log_file_path, format_line, format_timestamp, ConsoleWriter, Controls,
};

pub const LOG_PREFIX: &str = "HTMLog_";
pub const CRASH_PREFIX: &str = "Oops_";
const EXTENSION: &str = "html";

struct HtmlState {
    controls: Controls,
    current: PathBuf,
    /// Whether the document head has been written to `current`
    started: bool,
    /// Next id for an expandable backtrace block
    next_block_id: u64,
}

/// Sink writing HTML log files and crash dumps
pub struct HtmlFileSink {
    dir: PathBuf,
    max_files: usize,
    state: Mutex<HtmlState>,
    /// Target of console mirroring
    console: ConsoleWriter,
}

impl HtmlFileSink {
    /// Create a sink writing into `dir`
    pub fn new(dir: impl Into<PathBuf>, threshold: Severity) -> Self {
        Self::with_retention(dir, threshold, DEFAULT_MAX_FILES)
    }

    /// Create a sink keeping at most `max_files` files per prefix
    pub fn with_retention(dir: impl Into<PathBuf>, threshold: Severity, max_files: usize) -> Self {
        let dir = dir.into();
        let sink = Self {
            state: Mutex::new(HtmlState {
                controls: Controls::new(threshold),
                current: create_log_file_path(&dir, LOG_PREFIX, EXTENSION),
                started: false,
                next_block_id: 0,
            }),
            dir,
            max_files,
            console: ConsoleWriter::stdout(),
        };
        sink.cleanup(LOG_PREFIX);
        sink.cleanup(CRASH_PREFIX);
        sink
    }

    pub fn from_config(config: &Config) -> Self {
        let sink = Self::with_retention(&config.log_dir, config.default_threshold, config.max_files);
        sink.set_mirror_to_console(config.mirror_to_console);
        sink
    }

    /// Mirror to `writer` instead of stdout
    pub fn with_mirror_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.console = ConsoleWriter::new(writer);
        self
    }

    pub fn current_path(&self) -> PathBuf {
        self.lock().current.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HtmlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cleanup(&self, prefix: &str) {
        if let Err(e) = cleanup_old_files(&self.dir, prefix, EXTENSION, self.max_files) {
            tracing::warn!("Failed to clean up {} files: {}", prefix, e);
        }
    }

    /// Write `html` to the current file, starting the document first if needed
    fn write(&self, state: &mut HtmlState, html: &str) -> Result<(), SinkError> {
        let result = if state.started {
            append_to_file(&state.current, html)
        } else {
            append_to_file(&state.current, &format!("{}{}", document_head(), html))
        };
        match result {
            Ok(()) => {
                state.started = true;
                Ok(())
            }
            Err(err) => {
                state.controls.threshold = Severity::Silent;
                Err(err)
            }
        }
    }

    fn log_message(&self, severity: Severity, message: &str) -> Result<(), SinkError> {
        let now = Local::now();
        let mirror = {
            let mut state = self.lock();
            if !state.controls.threshold.admits(severity) {
                return Ok(());
            }
            let html = line_html(&now, message, severity.css_class());
            self.write(&mut state, &html)?;
            state.controls.mirror
        };
        if mirror {
            self.mirror(&format_line(&now, severity.as_str(), message))?;
        }
        Ok(())
    }

    fn log_fault(&self, severity: Severity, fault: &Fault) -> Result<(), SinkError> {
        let now = Local::now();
        let mirror = {
            let mut state = self.lock();
            if !state.controls.threshold.admits(severity) {
                return Ok(());
            }
            let html = fault_html(&now, fault, severity.css_class(), &mut state.next_block_id);
            self.write(&mut state, &html)?;
            state.controls.mirror
        };
        if mirror {
            self.mirror(&format_line(&now, severity.as_str(), &fault.to_string()))?;
        }
        Ok(())
    }

    /// Echo a plain line to the console; called without the state lock held
    fn mirror(&self, line: &str) -> Result<(), SinkError> {
        self.console.write_line(line).map_err(|err| {
            self.set_threshold(Severity::Silent);
            err
        })
    }
}

/// Document head with level colors and the backtrace toggle script
fn document_head() -> String {
    format!(
        "<html>\n\
         <head><meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\">\n\
         <style type=\"text/css\">\n\
         .debug{{color:#{}}}\n\
         .info{{color:#{}}}\n\
         .warning{{color:#{}}}\n\
         .error{{color:#{}}}\n\
         .stacktrace{{color:#{}}}\n\
         </style>\n\
         <script type=\"text/javascript\">\n\
         function displ(id) {{\n\
         var block = document.getElementById(id);\n\
         block.style.display = (block.style.display == 'none') ? 'block' : 'none';\n\
         }}\n\
         </script>\n\
         </head>\n\
         <body>\n",
        Rgb::DEBUG.to_hex(),
        Rgb::INFO.to_hex(),
        Rgb::WARNING.to_hex(),
        Rgb::ERROR.to_hex(),
        Rgb::STACKTRACE.to_hex(),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '\n' => escaped.push_str("<br>"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn line_html(timestamp: &DateTime<Local>, message: &str, class: &str) -> String {
    format!(
        "<p> {:<30}<span class=\"{}\">{}</span><br>\n",
        format!("{}:", format_timestamp(timestamp)),
        class,
        escape_html(message)
    )
}

/// Fault line with an expandable backtrace block, followed by its causes
fn fault_html(
    timestamp: &DateTime<Local>,
    fault: &Fault,
    class: &str,
    next_block_id: &mut u64,
) -> String {
    let mut html = format!(
        "<p> {}:<span class=\"{}\">{}:{}</span>",
        format_timestamp(timestamp),
        class,
        escape_html(&fault.kind),
        escape_html(&fault.message)
    );

    if let Some(backtrace) = fault.backtrace.as_deref().filter(|b| !b.is_empty()) {
        let id = *next_block_id;
        *next_block_id += 1;
        html.push_str(&format!(
            "<a href=\"javascript: displ('{id}')\">Fault source...</a><br>\n\
             <div id=\"{id}\" style=\"display: none;\">\n\
             <span class=\"stacktrace\">{}</span>\
             <a href=\"javascript: displ('{id}')\">Close</a></div>\n",
            escape_html(backtrace),
        ));
    }

    if let Some(cause) = &fault.cause {
        html.push_str("<br>\n");
        html.push_str(&fault_html(timestamp, cause, class, next_block_id));
    }

    html.push_str("<br>\n");
    html
}

impl Sink for HtmlFileSink {
    fn name(&self) -> &str {
        "html"
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
        self.log_message(Severity::Debug, message)
    }

    fn log_info(&self, message: &str) -> Result<(), SinkError> {
        self.log_message(Severity::Info, message)
    }

    fn log_warning(&self, message: &str) -> Result<(), SinkError> {
        self.log_message(Severity::Warning, message)
    }

    fn log_warning_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.log_fault(Severity::Warning, fault)
    }

    fn log_error(&self, message: &str) -> Result<(), SinkError> {
        self.log_message(Severity::Error, message)
    }

    fn log_error_fault(&self, fault: &Fault) -> Result<(), SinkError> {
        self.log_fault(Severity::Error, fault)
    }
}

impl CrashDumpSink for HtmlFileSink {
    fn name(&self) -> &str {
        "html"
    }

    fn dump_crash(
        &self,
        sender: &str,
        version: &str,
        history: &[LogEntry],
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        let path = create_log_file_path(&self.dir, CRASH_PREFIX, EXTENSION);

        let mut dump = document_head();
        dump.push_str(&line_html(
            &Local::now(),
            &format!("{} ver. {} CRASH DUMP", sender, version),
            Severity::Info.css_class(),
        ));
        for entry in history {
            let class = entry.severity.css_class();
            match entry.severity {
                Severity::Debug | Severity::Info => {
                    dump.push_str(&line_html(&entry.timestamp, entry.message_text(), class));
                }
                Severity::Warning | Severity::Error => {
                    if let Some(message) = entry.message.as_deref().filter(|m| !m.is_empty()) {
                        dump.push_str(&line_html(&entry.timestamp, message, class));
                    }
                    if let Some(fault) = &entry.fault {
                        dump.push_str(&fault_html(
                            &entry.timestamp,
                            fault,
                            class,
                            &mut state.next_block_id,
                        ));
                    }
                }
                Severity::Silent => {}
            }
        }
        dump.push_str("</body>\n</html>\n");

        if let Err(err) = append_to_file(&path, &dump) {
            state.controls.threshold = Severity::Silent;
            return Err(err);
        }
        drop(state);
        self.cleanup(CRASH_PREFIX);
        Ok(())
    }
}
