//! Constants and default values for LogDeck

use std::path::PathBuf;

/// Default LogDeck home directory name
pub const LOGDECK_DIR: &str = ".logdeck";

/// Default log directory name
pub const LOGS_DIR: &str = "logs";

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "logdeck.toml",
    "logdeck.yaml",
    "logdeck.yml",
    "logdeck.json",
];

/// Default bind host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_PORT: u16 = 3000;

/// Default static asset directory
pub const DEFAULT_STATIC_DIR: &str = "static";

/// URL prefix the static directory is mounted at
pub const DEFAULT_STATIC_PREFIX: &str = "/static";

/// Glob used to discover sources inside the log directory
pub const DEFAULT_SOURCE_PATTERN: &str = "*.log";

/// Default page size when a query does not give one
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Upper bound on requested page sizes
pub const MAX_PAGE_SIZE: usize = 1000;

/// Smallest read chunk (in records) used while scanning for a page
pub const MIN_SCAN_CHUNK: usize = 64;

/// Largest read chunk (in records) used while scanning for a page
pub const MAX_SCAN_CHUNK: usize = 8192;

/// Default live-tail reordering window in milliseconds
pub const DEFAULT_STREAM_WINDOW_MS: u64 = 250;

/// Default live-tail poll interval in milliseconds
pub const DEFAULT_STREAM_POLL_MS: u64 = 200;

/// Default capacity of a subscription's event channel
pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 256;

/// Get the LogDeck home directory
pub fn logdeck_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(LOGDECK_DIR))
        .unwrap_or_else(|| PathBuf::from(LOGDECK_DIR))
}

/// Get the default logs directory
pub fn logs_dir() -> PathBuf {
    logdeck_home().join(LOGS_DIR)
}
