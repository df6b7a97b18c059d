//! Diagnostic logging setup.
//!
//! Interactive runs only print errors to stderr so log lines never interleave
//! with answers. `--log-file` switches to verbose output in that file.
//! `RUST_LOG` overrides either default.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONSOLE_FILTER: &str = "error";
const FILE_FILTER: &str = "info,repolens=debug";

pub fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if log_file.is_some() {
        FILE_FILTER
    } else {
        CONSOLE_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
