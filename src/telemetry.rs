use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. Filter comes from `RUST_LOG`, falling back
/// to debug output for this crate. Logs go to stderr, stdout belongs to the shell.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragchat=debug"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
