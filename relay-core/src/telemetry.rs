use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise the global `tracing` subscriber with a standard `fmt` layer.
///
/// Respects the `RUST_LOG` environment variable. Falls back to `info` when
/// `RUST_LOG` is not set.
///
/// Call this once, at the very start of `main`, before any tracing macro.
/// Panics if a global subscriber is already installed; use
/// [`try_init_tracing`] where that can happen (tests, embedding).
pub fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Like [`init_tracing`], but returns `false` instead of panicking when a
/// global subscriber already exists.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}
