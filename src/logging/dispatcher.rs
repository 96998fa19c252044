//! Central dispatcher: records entries and fans them out to registered sinks
//!
//! Every logging call is recorded into the bounded history (when crash-dump
//! recording is on) and then delivered, in registration order, to each sink
//! whose threshold admits it. Logging and registration calls are serialized by
//! one ordering lock, so sinks always see entries in acceptance order and
//! never see the registry change in the middle of a fan-out. The state lock
//! guarding the history and registries is only held for short copies, never
//! while a sink runs.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

use crate::config::Config;

use super::entry::LogEntry;
use super::fault::Fault;
use super::history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
use super::severity::Severity;
use super::sink::{CrashDumpSink, Sink, SinkError};

static NEXT_DISPATCHER_ID: AtomicUsize = AtomicUsize::new(1);

static GLOBAL: OnceLock<Arc<Dispatcher>> = OnceLock::new();

thread_local! {
    /// Dispatchers whose fan-out is running on this thread
    static ACTIVE_FAN_OUTS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a dispatcher as fanning out on the current thread until dropped
struct ActiveFanOut(usize);

impl ActiveFanOut {
    fn enter(id: usize) -> Self {
        ACTIVE_FAN_OUTS.with(|active| active.borrow_mut().push(id));
        Self(id)
    }
}

impl Drop for ActiveFanOut {
    fn drop(&mut self) {
        ACTIVE_FAN_OUTS.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|id| *id == self.0) {
                active.remove(pos);
            }
        });
    }
}

/// Registries guarded by the state lock
#[derive(Default)]
struct Registries {
    sinks: Vec<Arc<dyn Sink>>,
    crash_sinks: Vec<Arc<dyn CrashDumpSink>>,
    closed: bool,
}

/// Process-wide logging entry point
pub struct Dispatcher {
    id: usize,
    /// Recent entries kept for crash dumps
    history: BoundedHistory,
    /// Sink registries and lifecycle flag
    state: Mutex<Registries>,
    /// Held for the whole of every fan-out and registry mutation
    fan_out: Mutex<()>,
    /// Entries logged by sinks during a fan-out, delivered once it finishes
    pending: Mutex<VecDeque<LogEntry>>,
    crash_dump_enabled: AtomicBool,
    default_threshold: RwLock<Severity>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl Dispatcher {
    /// Create a dispatcher retaining at most `history_capacity` entries
    pub fn new(history_capacity: usize) -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            history: BoundedHistory::new(history_capacity),
            state: Mutex::new(Registries::default()),
            fan_out: Mutex::new(()),
            pending: Mutex::new(VecDeque::new()),
            crash_dump_enabled: AtomicBool::new(true),
            default_threshold: RwLock::new(Severity::default()),
        }
    }

    /// Create a dispatcher configured from the application config
    pub fn from_config(config: &Config) -> Self {
        let dispatcher = Self::new(config.history_capacity);
        dispatcher.set_crash_dump_enabled(config.crash_dump_enabled);
        dispatcher.set_default_threshold(config.default_threshold);
        dispatcher
    }

    // -- configuration --

    /// Whether new entries are recorded for crash dumps
    pub fn crash_dump_enabled(&self) -> bool {
        self.crash_dump_enabled.load(Ordering::SeqCst)
    }

    pub fn set_crash_dump_enabled(&self, enabled: bool) {
        self.crash_dump_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Threshold new sinks should start with
    pub fn default_threshold(&self) -> Severity {
        self.default_threshold
            .read()
            .map(|t| *t)
            .unwrap_or_default()
    }

    pub fn set_default_threshold(&self, threshold: Severity) {
        if let Ok(mut current) = self.default_threshold.write() {
            *current = threshold;
        }
    }

    // -- logging entry points --

    pub fn debug(&self, message: impl Into<String>) {
        self.dispatch(LogEntry::new(Severity::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.dispatch(LogEntry::new(Severity::Info, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.dispatch(LogEntry::new(Severity::Warning, message));
    }

    pub fn warning_fault(&self, fault: impl Into<Arc<Fault>>) {
        self.dispatch(LogEntry::from_fault(Severity::Warning, fault.into()));
    }

    pub fn warning_with(&self, message: impl Into<String>, fault: impl Into<Arc<Fault>>) {
        self.dispatch(LogEntry::with_fault(Severity::Warning, message, fault.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.dispatch(LogEntry::new(Severity::Error, message));
    }

    pub fn error_fault(&self, fault: impl Into<Arc<Fault>>) {
        self.dispatch(LogEntry::from_fault(Severity::Error, fault.into()));
    }

    pub fn error_with(&self, message: impl Into<String>, fault: impl Into<Arc<Fault>>) {
        self.dispatch(LogEntry::with_fault(Severity::Error, message, fault.into()));
    }

    // -- registration --

    pub fn register_sink(&self, sink: Arc<dyn Sink>) {
        tracing::debug!(sink = sink.name(), "Registering sink");
        self.mutate(|state| state.sinks.push(sink));
    }

    /// Remove the first registration of `sink`, returning whether one was found
    pub fn remove_sink(&self, sink: &Arc<dyn Sink>) -> bool {
        let removed = self.mutate(|state| {
            match state
                .sinks
                .iter()
                .position(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(sink)))
            {
                Some(pos) => {
                    state.sinks.remove(pos);
                    true
                }
                None => false,
            }
        });
        tracing::debug!(sink = sink.name(), removed, "Removing sink");
        removed
    }

    pub fn register_crash_dump_sink(&self, sink: Arc<dyn CrashDumpSink>) {
        tracing::debug!(sink = sink.name(), "Registering crash dump sink");
        self.mutate(|state| state.crash_sinks.push(sink));
    }

    /// Remove the first registration of `sink`, returning whether one was found
    pub fn remove_crash_dump_sink(&self, sink: &Arc<dyn CrashDumpSink>) -> bool {
        self.mutate(|state| {
            match state
                .crash_sinks
                .iter()
                .position(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(sink)))
            {
                Some(pos) => {
                    state.crash_sinks.remove(pos);
                    true
                }
                None => false,
            }
        })
    }

    pub fn sink_count(&self) -> usize {
        self.lock_state().sinks.len()
    }

    pub fn crash_dump_sink_count(&self) -> usize {
        self.lock_state().crash_sinks.len()
    }

    // -- crash dumps --

    /// Send a snapshot of the history to every crash dump sink
    ///
    /// Does nothing when recording is disabled. Every sink of one request sees
    /// the same snapshot; a failing sink does not stop the others. Returns the
    /// number of sinks that completed the dump.
    pub fn request_crash_dump(&self, sender: &str, version: &str) -> usize {
        let (history, sinks) = {
            let state = self.lock_state();
            if state.closed || !self.crash_dump_enabled() {
                return 0;
            }
            (self.history.snapshot(), state.crash_sinks.clone())
        };

        let mut delivered = 0;
        let mut failures = Vec::new();
        for sink in &sinks {
            match sink.dump_crash(sender, version, &history) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(sink = sink.name(), error = %err, "Crash dump failed");
                    failures.push(format!("Crash dump to '{}' failed: {}", sink.name(), err));
                }
            }
        }

        for failure in failures {
            self.error(failure);
        }
        delivered
    }

    /// Deliver every entry still queued behind a running fan-out
    ///
    /// Entries logged from inside a sink callback normally reach the sinks once
    /// the outer fan-out finishes. Call this when that fan-out will not get the
    /// chance, for example right before the process exits.
    pub fn flush_pending(&self) {
        if self.in_fan_out() {
            self.drain_pending();
            return;
        }
        let _order = self.fan_out.lock().unwrap_or_else(PoisonError::into_inner);
        let _active = ActiveFanOut::enter(self.id);
        self.drain_pending();
    }

    /// Copy of the retained history, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.history.snapshot()
    }

    // -- lifecycle --

    /// Drop every registered sink and stop accepting entries
    pub fn shutdown(&self) {
        self.mutate(|state| {
            state.closed = true;
            state.sinks.clear();
            state.crash_sinks.clear();
        });
        self.lock_pending().clear();
        tracing::debug!("Dispatcher shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().closed
    }

    // -- internals --

    fn lock_state(&self) -> MutexGuard<'_, Registries> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_fan_out(&self) -> bool {
        ACTIVE_FAN_OUTS.with(|active| active.borrow().contains(&self.id))
    }

    /// Apply a registry mutation in the same order as logging calls
    fn mutate<R>(&self, f: impl FnOnce(&mut Registries) -> R) -> R {
        // Called from a sink callback: the running fan-out works on its own
        // copy of the sink list, and waiting for the ordering lock would
        // deadlock.
        if self.in_fan_out() {
            return f(&mut self.lock_state());
        }
        let _order = self.fan_out.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.lock_state();
        f(&mut state)
    }

    /// Record an entry, returning the sinks to deliver it to
    ///
    /// `None` once the dispatcher is shut down.
    fn accept(&self, entry: &LogEntry) -> Option<Vec<Arc<dyn Sink>>> {
        let state = self.lock_state();
        if state.closed {
            return None;
        }
        if self.crash_dump_enabled() {
            self.history.insert(entry.clone());
        }
        Some(state.sinks.clone())
    }

    fn dispatch(&self, entry: LogEntry) {
        if self.in_fan_out() {
            if self.accept(&entry).is_some() {
                self.lock_pending().push_back(entry);
            }
            return;
        }

        let _order = self.fan_out.lock().unwrap_or_else(PoisonError::into_inner);
        let _active = ActiveFanOut::enter(self.id);

        let Some(sinks) = self.accept(&entry) else {
            return;
        };
        self.deliver(&sinks, &entry);
        self.drain_pending();
    }

    /// Deliver entries that sinks logged during a fan-out
    fn drain_pending(&self) {
        loop {
            let next = self.lock_pending().pop_front();
            let Some(entry) = next else {
                break;
            };
            let sinks = {
                let state = self.lock_state();
                if state.closed {
                    break;
                }
                state.sinks.clone()
            };
            self.deliver(&sinks, &entry);
        }
    }

    fn deliver(&self, sinks: &[Arc<dyn Sink>], entry: &LogEntry) {
        for sink in sinks {
            if !sink.threshold().admits(entry.severity) {
                continue;
            }
            if let Err(err) = send(sink.as_ref(), entry) {
                sink.set_threshold(Severity::Silent);
                tracing::warn!(sink = sink.name(), error = %err, "Sink disabled after failure");

                let report =
                    LogEntry::new(Severity::Error, format!("Sink '{}' disabled: {}", sink.name(), err));
                if self.accept(&report).is_some() {
                    self.lock_pending().push_back(report);
                }
            }
        }
    }
}

/// Invoke the leveled call matching the shape of the original call
fn send(sink: &dyn Sink, entry: &LogEntry) -> Result<(), SinkError> {
    let message = entry.message.as_deref();
    let fault = entry.fault.as_deref();
    match entry.severity {
        Severity::Debug => sink.log_debug(entry.message_text()),
        Severity::Info => sink.log_info(entry.message_text()),
        Severity::Warning => match (message, fault) {
            (Some(message), None) => sink.log_warning(message),
            (None, Some(fault)) => sink.log_warning_fault(fault),
            (Some(message), Some(fault)) => sink.log_warning(&combined(message, fault)),
            (None, None) => Ok(()),
        },
        Severity::Error => match (message, fault) {
            (Some(message), None) => sink.log_error(message),
            (None, Some(fault)) => sink.log_error_fault(fault),
            (Some(message), Some(fault)) => sink.log_error(&combined(message, fault)),
            (None, None) => Ok(()),
        },
        Severity::Silent => Ok(()),
    }
}

fn combined(message: &str, fault: &Fault) -> String {
    format!("{}\n{}", message, fault)
}

/// Install the process-wide dispatcher
///
/// Fails (returning the argument) if one is already installed.
pub fn set_global(dispatcher: Arc<Dispatcher>) -> Result<(), Arc<Dispatcher>> {
    GLOBAL.set(dispatcher)
}

/// The process-wide dispatcher, if one was installed
pub fn global() -> Option<&'static Arc<Dispatcher>> {
    GLOBAL.get()
}
