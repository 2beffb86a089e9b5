//! Log subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise `info`, with the transport crates
//! held at `warn`.

use crate::result::{PageflowError, PageflowResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVES: &str =
    "info,fantoccini=warn,hyper=warn,hyper_util=warn,chromiumoxide=warn,tungstenite=warn,imap=warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install a human readable subscriber
pub fn try_init() -> PageflowResult<()> {
    let subscriber = Registry::default()
        .with(filter())
        .with(fmt::layer().with_target(true));
    tracing::subscriber::set_global_default(subscriber).map_err(|e| PageflowError::Config {
        message: format!("logging already initialised: {e}"),
    })
}

/// Install a human readable subscriber, ignoring an existing one
pub fn init() {
    let _ = try_init();
}

/// Install a JSON subscriber for CI logs, ignoring an existing one
pub fn init_json() {
    let subscriber = Registry::default()
        .with(filter())
        .with(fmt::layer().json().with_current_span(false));
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let filter = EnvFilter::new(DEFAULT_DIRECTIVES);
        assert!(filter.to_string().contains("fantoccini=warn"));
    }

    #[test]
    fn test_second_init_is_harmless() {
        init();
        init();
        assert!(try_init().is_err());
        tracing::info!("logging initialised");
    }
}
