// helpdesk-intelligence/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset: our crate at info, chatty HTTP internals at warn.
const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,reqwest=warn,h2=warn";

/// Install the global subscriber. A second call leaves the first one in place.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_DIRECTIVES.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
