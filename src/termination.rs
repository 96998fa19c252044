//! Unhandled-termination handling
//!
//! When the process is about to die from a fault, the handler records the fault,
//! dumps the recent history to every crash dump sink, tells the operator and
//! exits with the fault's status code. It fires once; later faults are ignored.

use std::any::Any;
use std::panic::{self, Location};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::logging::{self, Dispatcher, Fault};

static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Shows the operator that the process is about to exit
pub trait FatalNotifier: Send + Sync {
    fn notify(&self, kind: &str, message: &str, dump_hint: &str);
}

/// Ends the process
pub trait Terminator: Send + Sync {
    fn terminate(&self, status_code: i32);
}

/// Prints the fatal notice to stderr
pub struct StderrNotifier;

impl FatalNotifier for StderrNotifier {
    fn notify(&self, kind: &str, message: &str, dump_hint: &str) {
        eprintln!("{}", fatal_notice(kind, message, dump_hint));
    }
}

/// Exits through `std::process::exit`
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, status_code: i32) {
        std::process::exit(status_code);
    }
}

/// Text of the fatal notice
pub fn fatal_notice(kind: &str, message: &str, dump_hint: &str) -> String {
    if dump_hint.is_empty() {
        format!("Fatal error: {}: {}\nDetails in the crash dump.", kind, message)
    } else {
        format!(
            "Fatal error: {}: {}\nDetails in the crash dump ({}).",
            kind, message, dump_hint
        )
    }
}

/// Lifecycle of the process as seen by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Running = 0,
    Terminating = 1,
    Exited = 2,
}

impl TerminationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TerminationState::Running,
            1 => TerminationState::Terminating,
            _ => TerminationState::Exited,
        }
    }
}

/// Records, dumps and exits on an unhandled fault
pub struct TerminationHandler {
    dispatcher: Arc<Dispatcher>,
    notifier: Box<dyn FatalNotifier>,
    terminator: Box<dyn Terminator>,
    state: AtomicU8,
    /// Version string passed to crash dump sinks
    version: String,
    /// Where the operator should look for the dump
    dump_hint: String,
}

impl TerminationHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            notifier: Box::new(StderrNotifier),
            terminator: Box::new(ProcessTerminator),
            state: AtomicU8::new(TerminationState::Running as u8),
            version: String::new(),
            dump_hint: String::new(),
        }
    }

    /// Handler for the process-wide dispatcher, if one was installed
    pub fn for_global() -> Option<Self> {
        logging::global().map(|dispatcher| Self::new(Arc::clone(dispatcher)))
    }

    pub fn with_notifier(mut self, notifier: impl FatalNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_dump_hint(mut self, dump_hint: impl Into<String>) -> Self {
        self.dump_hint = dump_hint.into();
        self
    }

    pub fn state(&self) -> TerminationState {
        TerminationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Handle a termination payload
    ///
    /// Returns `false` without doing anything if the payload is not a
    /// recognizable fault.
    pub fn handle_payload(&self, payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> bool {
        match Fault::from_panic_payload(payload, location) {
            Some(fault) => {
                self.handle_fault(&fault);
                true
            }
            None => false,
        }
    }

    /// Record, dump, notify and terminate
    ///
    /// Only the first call does anything; returns whether this call did.
    pub fn handle_fault(&self, fault: &Fault) -> bool {
        if self
            .state
            .compare_exchange(
                TerminationState::Running as u8,
                TerminationState::Terminating as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }

        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("");

        self.dispatcher.error_with(
            format!("Unhandled fault in {}", execution_context(thread_name)),
            fault.clone(),
        );
        // A fault raised inside a sink leaves the entry queued behind the
        // interrupted fan-out, which never resumes once we terminate.
        self.dispatcher.flush_pending();
        let dumped = self.dispatcher.request_crash_dump(thread_name, &self.version);
        tracing::debug!(dumped, "Crash dump written before exit");

        self.notifier
            .notify(&fault.kind, &fault.message, &self.dump_hint);

        self.state
            .store(TerminationState::Exited as u8, Ordering::SeqCst);
        self.terminator.terminate(fault.status_code);
        true
    }
}

/// `process 'name' (pid N), thread 'name'`
fn execution_context(thread_name: &str) -> String {
    let process = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    let thread = if thread_name.is_empty() {
        "<unnamed>"
    } else {
        thread_name
    };
    format!(
        "process '{}' (pid {}), thread '{}'",
        process,
        std::process::id(),
        thread
    )
}

/// Route panics through `handler`
///
/// Installs at most once per process. Panics whose payload the handler does not
/// recognize fall through to the previously installed hook.
pub fn install_panic_hook(handler: Arc<TerminationHandler>) {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if !handler.handle_payload(info.payload(), info.location()) {
            previous_hook(info);
        }
    }));
    tracing::debug!("Panic hook installed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::test_support::{Call, RecordingCrashSink, RecordingSink};
    use crate::logging::{Severity, Sink, SinkError};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingNotifier(Arc<Mutex<Vec<(String, String, String)>>>);

    impl FatalNotifier for RecordingNotifier {
        fn notify(&self, kind: &str, message: &str, dump_hint: &str) {
            self.0.lock().unwrap().push((
                kind.to_string(),
                message.to_string(),
                dump_hint.to_string(),
            ));
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTerminator(Arc<Mutex<Vec<i32>>>);

    impl Terminator for RecordingTerminator {
        fn terminate(&self, status_code: i32) {
            self.0.lock().unwrap().push(status_code);
        }
    }

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        crash: Arc<RecordingCrashSink>,
        notices: RecordingNotifier,
        exits: RecordingTerminator,
        handler: TerminationHandler,
    }

    fn harness() -> Harness {
        let dispatcher = Arc::new(Dispatcher::default());
        let crash = Arc::new(RecordingCrashSink::new("crash"));
        dispatcher.register_crash_dump_sink(crash.clone());
        let notices = RecordingNotifier::default();
        let exits = RecordingTerminator::default();
        let handler = TerminationHandler::new(Arc::clone(&dispatcher))
            .with_notifier(notices.clone())
            .with_terminator(exits.clone())
            .with_dump_hint("/var/log/app");
        Harness {
            dispatcher,
            crash,
            notices,
            exits,
            handler,
        }
    }

    #[test]
    fn test_handle_fault_records_dumps_notifies_and_exits() {
        let h = harness();
        h.dispatcher.info("working");
        assert_eq!(h.handler.state(), TerminationState::Running);

        let fault = Fault::new("IoError", "disk vanished").with_status_code(74);
        assert!(h.handler.handle_fault(&fault));
        assert_eq!(h.handler.state(), TerminationState::Exited);

        let dumps = h.crash.dumps();
        assert_eq!(dumps.len(), 1);
        let (_, version, entries) = &dumps[0];
        assert_eq!(version, "");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].severity, Severity::Error);
        assert!(entries[1].message_text().starts_with("Unhandled fault in process"));
        assert_eq!(entries[1].fault.as_deref(), Some(&fault));

        assert_eq!(
            *h.notices.0.lock().unwrap(),
            vec![(
                "IoError".to_string(),
                "disk vanished".to_string(),
                "/var/log/app".to_string()
            )]
        );
        assert_eq!(*h.exits.0.lock().unwrap(), vec![74]);
    }

    #[test]
    fn test_handler_fires_once() {
        let h = harness();
        assert!(h.handler.handle_fault(&Fault::new("First", "one")));
        assert!(!h.handler.handle_fault(&Fault::new("Second", "two")));

        assert_eq!(h.crash.dumps().len(), 1);
        assert_eq!(h.notices.0.lock().unwrap().len(), 1);
        assert_eq!(h.exits.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unrecognized_payload_is_ignored() {
        let h = harness();
        let payload: Box<dyn Any + Send> = Box::new(3.5f64);
        assert!(!h.handler.handle_payload(payload.as_ref(), None));

        assert_eq!(h.handler.state(), TerminationState::Running);
        assert!(h.crash.dumps().is_empty());
        assert!(h.dispatcher.snapshot().is_empty());
        assert!(h.exits.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panic_payload_uses_panic_status() {
        let h = harness();
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert!(h.handler.handle_payload(payload.as_ref(), None));
        assert_eq!(*h.exits.0.lock().unwrap(), vec![101]);
        assert_eq!(h.notices.0.lock().unwrap()[0].0, "panic");
    }

    #[test]
    fn test_sender_is_thread_name() {
        let h = harness();
        let handler = Arc::new(h.handler);
        let worker = Arc::clone(&handler);
        std::thread::Builder::new()
            .name("worker-7".to_string())
            .spawn(move || {
                worker.handle_fault(&Fault::new("Boom", "bad"));
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(h.crash.dumps()[0].0, "worker-7");
    }

    #[test]
    fn test_version_is_passed_through() {
        let h = harness();
        let handler = h.handler.with_version("2.4.1");
        handler.handle_fault(&Fault::new("Boom", "bad"));
        assert_eq!(h.crash.dumps()[0].1, "2.4.1");
    }

    /// Sink that raises a fault from inside its own callback
    struct FaultingSink {
        handler: OnceLock<Arc<TerminationHandler>>,
    }

    impl Sink for FaultingSink {
        fn name(&self) -> &str {
            "faulting"
        }
        fn threshold(&self) -> Severity {
            Severity::Debug
        }
        fn set_threshold(&self, _threshold: Severity) {}
        fn set_mirror_to_console(&self, _mirror: bool) {}
        fn log_debug(&self, _message: &str) -> Result<(), SinkError> {
            Ok(())
        }
        fn log_info(&self, _message: &str) -> Result<(), SinkError> {
            if let Some(handler) = self.handler.get() {
                handler.handle_fault(&Fault::new("Boom", "inside sink"));
            }
            Ok(())
        }
        fn log_warning(&self, _message: &str) -> Result<(), SinkError> {
            Ok(())
        }
        fn log_warning_fault(&self, _fault: &Fault) -> Result<(), SinkError> {
            Ok(())
        }
        fn log_error(&self, _message: &str) -> Result<(), SinkError> {
            Ok(())
        }
        fn log_error_fault(&self, _fault: &Fault) -> Result<(), SinkError> {
            Ok(())
        }
    }

    /// Captures what a sink had received at the moment of termination
    struct SnapshotTerminator {
        sink: Arc<RecordingSink>,
        seen: Arc<Mutex<Vec<Call>>>,
    }

    impl Terminator for SnapshotTerminator {
        fn terminate(&self, _status_code: i32) {
            *self.seen.lock().unwrap() = self.sink.calls();
        }
    }

    #[test]
    fn test_fault_inside_sink_reaches_sinks_before_exit() {
        let dispatcher = Arc::new(Dispatcher::default());
        let faulting = Arc::new(FaultingSink {
            handler: OnceLock::new(),
        });
        let recording = Arc::new(RecordingSink::new("recording", Severity::Debug));
        dispatcher.register_sink(faulting.clone());
        dispatcher.register_sink(recording.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(
            TerminationHandler::new(Arc::clone(&dispatcher))
                .with_notifier(RecordingNotifier::default())
                .with_terminator(SnapshotTerminator {
                    sink: Arc::clone(&recording),
                    seen: Arc::clone(&seen),
                }),
        );
        assert!(faulting.handler.set(Arc::clone(&handler)).is_ok());

        dispatcher.info("trigger");

        let seen = seen.lock().unwrap().clone();
        assert!(seen.iter().any(|call| matches!(
            call,
            Call::Error(message) if message.starts_with("Unhandled fault in")
        )));
        assert_eq!(handler.state(), TerminationState::Exited);
    }

    #[test]
    fn test_handler_for_global_dispatcher() {
        // The only test that installs the process-wide dispatcher.
        let dispatcher = Arc::new(Dispatcher::default());
        assert!(logging::set_global(Arc::clone(&dispatcher)).is_ok());
        assert!(logging::set_global(Arc::new(Dispatcher::default())).is_err());
        assert!(Arc::ptr_eq(logging::global().unwrap(), &dispatcher));

        let exits = RecordingTerminator::default();
        let handler = TerminationHandler::for_global()
            .unwrap()
            .with_notifier(RecordingNotifier::default())
            .with_terminator(exits.clone());
        handler.handle_fault(&Fault::new("Boom", "global"));

        assert_eq!(dispatcher.snapshot().len(), 1);
        assert_eq!(*exits.0.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_fatal_notice_text() {
        assert_eq!(
            fatal_notice("panic", "boom", ""),
            "Fatal error: panic: boom\nDetails in the crash dump."
        );
        assert_eq!(
            fatal_notice("panic", "boom", "/tmp/logs"),
            "Fatal error: panic: boom\nDetails in the crash dump (/tmp/logs)."
        );
    }
}
