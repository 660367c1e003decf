//! Tracing subscriber setup
//!
//! Bridge mode logs to stderr. The simulator owns the terminal, so it logs to
//! a file instead.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` if set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter())
        .init();
}

pub fn init_file(log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = File::create(log_file_path)?;
    build_file_subscriber(log_file).init();
    Ok(())
}

pub fn build_file_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer().with_writer(Arc::new(log_file)).with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_subscriber_writes_events() {
        let log_file = tempfile::NamedTempFile::new().unwrap();
        let subscriber = build_file_subscriber(log_file.reopen().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(channel = "inbound", "chunk not drained");
        });

        let contents = std::fs::read_to_string(log_file.path()).unwrap();
        assert!(contents.contains("WARN"));
        assert!(contents.contains("chunk not drained"));
        assert!(contents.contains("channel=\"inbound\""));
    }
}
