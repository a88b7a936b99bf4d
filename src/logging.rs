//! Tracing subscriber setup for the `mnemo` binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! The filter is taken from `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "mnemo=info,mnemo_core=info";

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mnemo=debug,mnemo_core=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    // A second init (e.g. in tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
