//! Logging and finding-output setup
//!
//! Initializes the `log`/`env_logger` stack from the layer configuration
//! and builds the failure sink findings are routed through. The
//! environment (`RUST_LOG`) always wins over the configured filter, so a
//! misbehaving run can be re-traced without touching config files.

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use crate::config::LoggingConfig;
use crate::report::{FailureSink, JsonFileSink, LogSink};

/// Initialize the process-wide logger from the layer configuration.
///
/// Safe to call more than once; only the first initialization takes
/// effect (later validator instances in the same process share it).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(&config.filter);
    if env_logger::Builder::from_env(env).try_init().is_ok() {
        info!("🛡️ vigil {} logging initialized", crate::VERSION);
    }
    Ok(())
}

/// Build the failure sink the configuration asks for: a JSON-lines file
/// sink when a finding log is configured, the plain log-forwarding sink
/// otherwise.
pub fn build_sink(config: &LoggingConfig) -> Result<Arc<dyn FailureSink>> {
    match &config.finding_log {
        Some(path) => {
            let sink = JsonFileSink::create(path)
                .with_context(|| format!("Failed to open finding log: {}", path.display()))?;
            info!("findings will be appended to {}", path.display());
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(LogSink)),
    }
}
