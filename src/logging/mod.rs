//! Logging core for crashlog
//!
//! Provides the dispatcher that fans log calls out to registered sinks, the bounded
//! history used for crash dumps, and a bridge for `tracing` events.

mod dispatcher;
mod entry;
mod fault;
mod history;
mod layer;
mod severity;
mod sink;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::{global, set_global, Dispatcher};
pub use entry::LogEntry;
pub use fault::{Fault, DEFAULT_STATUS_CODE, PANIC_STATUS_CODE};
pub use history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
pub use layer::{init_tracing, DispatchLayer};
pub use severity::Severity;
pub use sink::{CrashDumpSink, Sink, SinkError};
