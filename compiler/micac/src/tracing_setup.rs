//! Tracing initialization for the Mica driver and daemon.
//!
//! Controlled by environment variables:
//! - `MICA_LOG`: filter string (`RUST_LOG` syntax). Falls back to `RUST_LOG`.
//!
//! When neither is set, defaults to `warn`. With `--log-file`, output
//! goes to that file instead of stderr.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing_subscriber::{prelude::*, EnvFilter, Registry};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the tracing subscriber.
///
/// Safe to call multiple times — only the first call takes effect.
pub fn init(log_file: Option<&Path>) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("MICA_LOG")
            .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok();
                match file {
                    Some(file) => Registry::default()
                        .with(
                            tracing_subscriber::fmt::layer()
                                .with_target(true)
                                .with_ansi(false)
                                .with_writer(Arc::new(file))
                                .compact(),
                        )
                        .with(filter)
                        .init(),
                    None => init_stderr(filter),
                }
            }
            None => init_stderr(filter),
        }
    });
}

fn init_stderr(filter: EnvFilter) {
    Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}
