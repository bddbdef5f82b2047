//! Sync orchestration
//!
//! Drives each tracked source end-to-end: load cursor → capture landing
//! metadata → enumerate new items → download them → advance the cursor →
//! aggregate a report. Sources run one at a time; concurrency lives inside
//! a source's download batch. The cursor store is read once at run start
//! and written once at run end, so an interrupt mid-run never corrupts it —
//! at worst the run repeats work next time.

use crate::client::GalleryClient;
use crate::config::SyncConfig;
use crate::cursor::CursorStore;
use crate::enumerate::PageEnumerator;
use crate::error::Result;
use crate::execute::{execute_all, sanitize_file_name};
use crate::types::{
    DownloadRecord, RunReport, Source, SourceOutcome, SourceReport, SourceResult,
};
use std::time::Instant;

/// Incremental gallery mirror
///
/// One instance owns the HTTP session (with its age-gate cookie jar) and
/// the in-memory cursor state for a run.
///
/// # Example
///
/// ```no_run
/// use deviant_sync::{GallerySync, Source, SyncConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut sync = GallerySync::new(SyncConfig::default()).await?;
///     let report = sync
///         .sync_all(&[Source::gallery("some-artist"), Source::favourites("a-collector")])
///         .await?;
///     println!("{} files, {} bytes", report.total_files(), report.total_bytes());
///     Ok(())
/// }
/// ```
pub struct GallerySync {
    client: GalleryClient,
    config: SyncConfig,
    cursors: CursorStore,
}

impl GallerySync {
    /// Build a sync engine: construct the HTTP session and load the cursor
    /// store
    ///
    /// An unreadable or corrupt state file is fatal here; silently starting
    /// over would re-download every tracked gallery.
    pub async fn new(config: SyncConfig) -> Result<Self> {
        let client = GalleryClient::new(&config.base_url, config.retry.clone())?;
        let cursors = CursorStore::load(&config.state_file).await?;
        Ok(Self {
            client,
            config,
            cursors,
        })
    }

    /// Current cursor state (loaded at construction, updated per source)
    pub fn cursor_store(&self) -> &CursorStore {
        &self.cursors
    }

    /// Sync every source in order and persist the updated cursors
    ///
    /// Source-level failures (unknown source, exhausted transport budget,
    /// listing-contract violations) are recorded in the report and do not
    /// stop the remaining sources. Only a cursor-store write failure aborts
    /// the run.
    pub async fn sync_all(&mut self, sources: &[Source]) -> Result<RunReport> {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        tracing::info!(sources = sources.len(), "sync run starting");

        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let outcome = match self.sync_source(source).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "source failed");
                    SourceOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            results.push(SourceResult {
                source: source.clone(),
                outcome,
            });
        }

        self.cursors.save(&self.config.state_file).await?;

        let report = RunReport {
            started_at,
            elapsed: start.elapsed(),
            results,
        };
        tracing::info!(
            files = report.total_files(),
            bytes = report.total_bytes(),
            elapsed_secs = report.elapsed.as_secs_f64(),
            throughput_mib_s = report.throughput_mib_per_sec(),
            failed_sources = report.failed_sources().count(),
            "sync run complete"
        );
        Ok(report)
    }

    /// Sync one source end-to-end
    ///
    /// Returns the outcome for a completed attempt; propagates source-level
    /// errors for [`sync_all`](Self::sync_all) to record. The source's
    /// cursor is advanced only after its batch joins, and only as far as
    /// the conservative policy allows.
    pub async fn sync_source(&mut self, source: &Source) -> Result<SourceOutcome> {
        let start = Instant::now();
        let client = self.client.clone();
        let enumerator = PageEnumerator::new(&client, source, &self.config.base_url)?;

        let info = enumerator.fetch_gallery_info().await?;
        let stop_cursor = self.cursors.get(source).map(str::to_string);
        let items = enumerator
            .enumerate(&info, stop_cursor.as_deref(), self.config.offset_limit)
            .await?;

        if items.is_empty() {
            tracing::info!(source = %source, author = %info.author_name, "up to date");
            return Ok(SourceOutcome::UpToDate);
        }

        tracing::info!(
            source = %source,
            author = %info.author_name,
            new_items = items.len(),
            "download begins"
        );

        let dest_dir = self
            .config
            .download_dir
            .join(sanitize_file_name(&info.author_name));
        tokio::fs::create_dir_all(&dest_dir).await?;

        let records = execute_all(
            &client,
            &dest_dir,
            items,
            self.config.max_concurrent_downloads,
        )
        .await;

        if let Some(cursor) = advance_cursor(&records, info.newest_item.as_deref()) {
            self.cursors.set(source, cursor);
        }

        let files = records.iter().filter(|r| r.succeeded()).count() as u64;
        let bytes = records.iter().map(|r| r.bytes).sum();
        let failed_items = records.len() as u64 - files;
        let report = SourceReport {
            author_name: info.author_name.clone(),
            files,
            bytes,
            failed_items,
            elapsed: start.elapsed(),
            records,
        };

        tracing::info!(
            source = %source,
            author = %info.author_name,
            files,
            bytes,
            failed_items,
            "download complete"
        );
        Ok(SourceOutcome::Synced(report))
    }
}

/// Conservative cursor advance over a batch's records (newest-first)
///
/// The cursor moves to the newest item that is older than every failure,
/// so the next run re-enumerates each failed item rather than skipping a
/// gap silently:
/// - no failures → the landing page's newest-item URL;
/// - some failures → the item immediately after the oldest failed one;
/// - oldest item failed → no advance at all.
fn advance_cursor(records: &[DownloadRecord], newest_item: Option<&str>) -> Option<String> {
    match records.iter().rposition(|r| !r.succeeded()) {
        None => newest_item.map(str::to_string),
        Some(oldest_failure) => records
            .get(oldest_failure + 1)
            .map(|r| r.item.page_url.clone()),
    }
}
