//! Logging setup for the `fieldops` binary.
//!
//! Log lines always go to stderr. Stdout is reserved for command results,
//! including the `--json` output that scripts parse.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
///
/// `sqlx` is held at `warn` so statement logging never carries code or
/// token hashes.
pub fn default_directives(level: &str) -> String {
    format!("fieldops_server={level},fieldops_core={level},sqlx=warn")
}

/// Initialise the global tracing subscriber at `level` for the `FieldOps`
/// crates. JSON lines include the fields of the active span, so every
/// event logged inside an operation carries its `op` and phone suffix.
pub fn init_tracing(level: &str, log_json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
