//! Process-wide `tracing` subscriber setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "OLLAMACODE_LOG";

fn default_directive(debug_mode: bool) -> &'static str {
    if debug_mode {
        "ollamacode=debug,warn"
    } else {
        "warn"
    }
}

pub fn build_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_directive(debug_mode)))
}

/// Install the global subscriber. Diagnostics go to stderr unless a file is
/// given, so they never interleave with streamed tokens on stdout. Calling
/// this twice is harmless; the second call is ignored.
pub fn init(debug_mode: bool, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = build_filter(debug_mode);
    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_mode_raises_crate_verbosity() {
        assert_eq!(default_directive(false), "warn");
        assert!(default_directive(true).starts_with("ollamacode=debug"));
    }
}
