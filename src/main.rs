use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crashlog::config::Config;
use crashlog::logging::{self, Dispatcher};
use crashlog::sinks::{self, ConsoleSink};
use crashlog::termination::{self, TerminationHandler};

fn main() -> Result<()> {
    let config = Config::load()?;

    // Create the dispatcher and make it the process-wide one
    let dispatcher = Arc::new(Dispatcher::from_config(&config));
    logging::set_global(Arc::clone(&dispatcher))
        .map_err(|_| anyhow!("A process-wide dispatcher is already installed"))?;

    // File sinks from config, plus the console
    sinks::register_from_config(&dispatcher, &config)?;
    dispatcher.register_sink(Arc::new(ConsoleSink::stdout(dispatcher.default_threshold())));

    // Forward tracing events from the rest of the program
    logging::init_tracing(Arc::clone(&dispatcher), "info")?;

    let handler = TerminationHandler::for_global()
        .context("Process-wide dispatcher missing")?
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_dump_hint(config.log_dir.display().to_string());
    termination::install_panic_hook(Arc::new(handler));

    dispatcher.info(format!("Logging to: {}", config.log_dir.display()));
    tracing::info!(target: "demo", "Tracing events reach the dispatcher too");

    if std::env::args().any(|arg| arg == "--crash") {
        dispatcher.warning("Crash requested from the command line");
        panic!("requested crash");
    }

    dispatcher.shutdown();
    Ok(())
}
