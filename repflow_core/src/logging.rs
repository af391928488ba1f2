//! Tracing setup shared by the Repflow binaries.
//!
//! Logs go to stderr so they never mix with command output. `RUST_LOG`
//! overrides the default filter entirely.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events the default filter lets through at the chosen level
const OWN_CRATES: &[&str] = &["repflow_core", "repflow"];

/// Install the subscriber at INFO
pub fn init() {
    init_with_level("info")
}

/// Install the subscriber with `default_level` for Repflow's own crates
///
/// Dependencies stay at WARN unless `RUST_LOG` says otherwise.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_CRATES.iter().map(|c| format!("{}={}", c, level)));
    directives.join(",")
}

/// Capture engine logs in test output; safe to call from every test
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(default_directives("debug")))
        .try_init();
}
