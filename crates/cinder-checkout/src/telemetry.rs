//! Tracing setup for binaries and integration harnesses embedding the crate.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,cinder=debug,sqlx=warn";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `info,cinder=debug,sqlx=warn`. Calling it again after a
/// subscriber is installed does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::debug!("Tracing initialised");
    }
}
