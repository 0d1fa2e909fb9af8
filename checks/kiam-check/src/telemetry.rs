use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::config::RunConfig;

const DEFAULT_FILTER: &str = "info";
const DEBUG_FILTER: &str = "debug";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Handle on the process log filter, handed to whoever decides verbosity.
#[derive(Clone)]
pub struct LogControl {
    handle: Option<FilterHandle>,
}

/// Installs the JSON subscriber. `RUST_LOG` overrides the `info` default.
pub fn init() -> LogControl {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();

    LogControl {
        handle: Some(handle),
    }
}

impl LogControl {
    /// A control that changes nothing, for callers without a subscriber.
    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn apply_debug_settings(&self, config: &RunConfig) {
        if !config.debug {
            return;
        }

        info!("Debug logging enabled.");
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(DEBUG_FILTER)) {
                warn!("Failed to switch to debug logging: {}", e);
            }
        }
        debug!("{:?}", std::env::args().collect::<Vec<_>>());
    }
}
