//! Diagnostic logging setup.
//!
//! User-facing messages go through [`crate::execution::host::Host`]; this
//! module only configures `tracing` for internal diagnostics.

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing with an `EnvFilter`.
///
/// Safe to call multiple times. `RUST_LOG` wins when set, otherwise
/// `default_directive` (e.g. `"info"` or `"ark_core=debug"`) is used.
pub fn init_tracing(default_directive: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_tracing("warn");
        init_tracing("debug");
        tracing::debug!("still alive after double init");
    }
}
