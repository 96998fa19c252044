//! Bridge from `tracing` events into the dispatcher
//!
//! Lets code that already uses the `tracing` macros feed the crash-dump history
//! and the registered sinks without calling the dispatcher directly.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use super::dispatcher::Dispatcher;
use super::severity::Severity;

/// Events from these targets are the crate's own diagnostics and are not forwarded
const OWN_TARGET: &str = "crashlog";

/// `tracing_subscriber` layer forwarding events to a [`Dispatcher`]
pub struct DispatchLayer {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchLayer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Collects the `message` field plus any other fields as `key=value` text
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={:?}", field.name(), value);
    }
}

impl<S> Layer<S> for DispatchLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.finish();

        match Severity::from(*metadata.level()) {
            Severity::Error => self.dispatcher.error(message),
            Severity::Warning => self.dispatcher.warning(message),
            Severity::Info => self.dispatcher.info(message),
            Severity::Debug => self.dispatcher.debug(message),
            Severity::Silent => {}
        }
    }
}

/// Install a global `tracing` subscriber that forwards events to `dispatcher`
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_tracing(dispatcher: Arc<Dispatcher>, default_filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(DispatchLayer::new(dispatcher))
        .try_init()
        .context("Failed to install tracing subscriber")
}
