use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "PURSE_LOG";

/// Install the global subscriber. Filter comes from `PURSE_LOG` (same syntax as
/// `RUST_LOG`), `--verbose` raises the default to `info`. Logs go to stderr so
/// command output stays clean.
///
/// Returns false when a subscriber was already installed; that one stays.
pub fn init(verbose: bool) -> bool {
    let default = if verbose { "purse=info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_keeps_existing_subscriber() {
        init(false);
        assert!(!init(true));
    }
}
