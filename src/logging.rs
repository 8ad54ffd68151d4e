// 📜 Logging - tracing subscriber setup
//
// RUST_LOG wins over the configured filter. Safe to call more than once:
// later calls are no-ops.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(filter: &str, json: bool) {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("lead_sync=info"));

    let registry = tracing_subscriber::registry().with(filter_layer);
    let result = if json {
        registry
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    if result.is_ok() {
        tracing::debug!(filter, json, "logging initialized");
    }
}
