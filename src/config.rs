//! Configuration types for deviant-sync

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`GallerySync`](crate::GallerySync)
///
/// Every field has a sensible default, so `SyncConfig::default()` works out
/// of the box: downloads land under `./downloads`, state in `./state.json`.
/// The list of sources to sync is not part of this struct; it is supplied by
/// the embedding application at run time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory for downloaded files; each source gets a subdirectory
    /// named after its author (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Base URL of the remote site (default: "https://www.deviantart.com")
    ///
    /// Overridable so tests can point the whole engine at a local fake.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the persisted source-to-cursor mapping (default: "./state.json")
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Size of the download worker pool (default: 8)
    ///
    /// Bounds how many assets are fetched concurrently per source. Page
    /// enumeration is always sequential; only downloads parallelize.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Upper bound on the listing offset walked when a source has no stored
    /// cursor (default: 12000 items)
    ///
    /// A first-ever sync of a very large gallery stops here rather than
    /// walking pages indefinitely. Incremental runs stop at the cursor
    /// boundary long before this limit matters.
    #[serde(default = "default_offset_limit")]
    pub offset_limit: usize,

    /// Retry behavior for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            base_url: default_base_url(),
            state_file: default_state_file(),
            max_concurrent_downloads: default_max_concurrent(),
            offset_limit: default_offset_limit(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry, in milliseconds (default: 100 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries, in milliseconds (default: 10 s)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_base_url() -> String {
    "https://www.deviantart.com".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./state.json")
}

fn default_max_concurrent() -> usize {
    8
}

fn default_offset_limit() -> usize {
    12_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
