//! # deviant-sync
//!
//! Incremental DeviantArt gallery mirroring library.
//!
//! deviant-sync discovers what a tracked gallery has published since the
//! last successful run, resolves each new item to its highest-fidelity
//! downloadable asset, fetches the assets with a bounded worker pool, and
//! records a resumable cursor so every run after the first is strictly
//! incremental.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Strictly incremental** - A cursor per source; re-running after a
//!   completed sync downloads nothing
//! - **Partial failures stay partial** - One broken item never aborts a
//!   batch, and the cursor never silently skips past a failure
//! - **Deterministic on disk** - Output files are named from response
//!   metadata and timestamped in gallery order, so a time-sorted directory
//!   listing reads like the gallery itself
//!
//! ## Quick Start
//!
//! ```no_run
//! use deviant_sync::{GallerySync, Source, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig {
//!         download_dir: "./downloads".into(),
//!         ..Default::default()
//!     };
//!
//!     let mut sync = GallerySync::new(config).await?;
//!     let report = sync
//!         .sync_all(&[
//!             Source::gallery("some-artist"),
//!             Source::favourites("a-collector"),
//!         ])
//!         .await?;
//!
//!     for (source, reason) in report.failed_sources() {
//!         eprintln!("{source}: {reason}");
//!     }
//!     println!(
//!         "{} files, {:.1} MiB",
//!         report.total_files(),
//!         report.total_bytes() as f64 / 1048576.0
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP transport with the site's cookie and status conventions
pub mod client;
/// Configuration types
pub mod config;
/// Persisted source-to-cursor state
pub mod cursor;
/// Paginated listing enumeration and cursor-boundary detection
pub mod enumerate;
/// Error types
pub mod error;
/// Bounded-concurrency download execution
pub mod execute;
/// Asset URL resolution ladder
pub mod resolve;
/// Retry logic with exponential backoff
pub mod retry;
/// Sync orchestration
pub mod sync;
/// Core domain types
pub mod types;

// Re-export commonly used types
pub use client::GalleryClient;
pub use config::{RetryConfig, SyncConfig};
pub use cursor::CursorStore;
pub use error::{Error, PersistenceError, ResolutionError, Result};
pub use sync::GallerySync;
pub use types::{
    DownloadRecord, ItemReference, ResolvedAsset, RunReport, Source, SourceKind, SourceOutcome,
    SourceReport, SourceResult, UrlStrategy,
};
