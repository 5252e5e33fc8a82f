//! Opt-in tracing setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber reading the `ERRATA_LOG` filter directive
/// (falling back to `RUST_LOG`, then `warn`). Safe to call more than once;
/// embedders that wire their own subscriber should simply skip this.
pub fn init() {
    let filter = EnvFilter::try_from_env("ERRATA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
