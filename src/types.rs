//! Core domain types: sources, items, resolved assets, records, reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A trackable remote gallery unit to sync
///
/// Immutable once created. The embedding application supplies the list of
/// sources; this crate never edits it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    /// Author handle as it appears in gallery URLs (e.g. "some-artist")
    pub name: String,

    /// Which of the author's listings to mirror
    #[serde(default)]
    pub kind: SourceKind,
}

/// The listing an author source points at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The author's own gallery (all folders)
    #[default]
    Gallery,
    /// The author's favourites collection
    Favourites,
}

impl Source {
    /// A source for an author's own gallery
    pub fn gallery(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Gallery,
        }
    }

    /// A source for an author's favourites collection
    pub fn favourites(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Favourites,
        }
    }

    /// Stable key used in the persisted cursor mapping
    pub fn key(&self) -> String {
        match self.kind {
            SourceKind::Gallery => self.name.clone(),
            SourceKind::Favourites => format!("{}/favourites", self.name),
        }
    }

    /// Landing URL of the listing this source mirrors, under the given site base
    pub fn landing_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self.kind {
            SourceKind::Gallery => format!("{base}/{}/gallery/?catpath=/", self.name),
            SourceKind::Favourites => format!("{base}/{}/favourites/?catpath=/", self.name),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// A discovered gallery entry pending resolution
///
/// Carries the item's canonical page URL and its position in listing order.
/// Position 0 is the newest item; the ordering is global within one sync run
/// and drives both cursor-boundary detection and the file-timestamp pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReference {
    /// Canonical page URL of the item
    pub page_url: String,

    /// Index in the newest-first listing order for this run
    pub position: usize,
}

impl ItemReference {
    /// Numeric item identifier parsed from the canonical URL's trailing
    /// `-<digits>` segment, used to disambiguate output file names.
    pub fn item_id(&self) -> Option<&str> {
        let tail = self.page_url.rsplit('-').next()?;
        let tail = tail.trim_end_matches('/');
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            Some(tail)
        } else {
            None
        }
    }
}

/// Which URL-shape strategy produced a resolved asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlStrategy {
    /// Pre-signed download-button URL exposed in the item page
    DownloadButton,
    /// CDN URL with a rewritable `/v1/fill/` parameter segment
    CdnFill,
    /// Plain direct asset URL used verbatim
    Direct,
}

/// The concrete fetch target derived from an [`ItemReference`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAsset {
    /// URL to fetch
    pub url: String,

    /// Item title from the page, used for logging and records
    pub title: String,

    /// Which ladder rung produced this URL
    pub strategy: UrlStrategy,

    /// The item this asset was resolved from
    pub item: ItemReference,
}

/// The result of one executed download
///
/// Exactly one record is produced per enumerated item, including items that
/// failed resolution or download. A fallback retry appends an extra
/// title/url entry rather than replacing the first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// The item this record describes
    pub item: ItemReference,

    /// Titles involved across attempts (usually one)
    pub titles: Vec<String>,

    /// Resolved URLs actually fetched, in attempt order
    pub urls: Vec<String>,

    /// Final output file name, when a file was written
    pub file_name: Option<String>,

    /// Bytes written to disk
    pub bytes: u64,

    /// Failure description when the item could not be downloaded
    pub error: Option<String>,
}

impl DownloadRecord {
    /// True when a file was written for this item
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.file_name.is_some()
    }
}

/// Aggregate statistics for one synced source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceReport {
    /// Author display name from the landing page
    pub author_name: String,

    /// Number of files written
    pub files: u64,

    /// Total bytes written
    pub bytes: u64,

    /// Number of items that failed resolution or download
    pub failed_items: u64,

    /// Wall-clock time spent on this source
    pub elapsed: Duration,

    /// Per-item download records in newest-first listing order
    pub records: Vec<DownloadRecord>,
}

/// Outcome of syncing one source
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SourceOutcome {
    /// New items were enumerated and the batch ran (possibly with per-item failures)
    Synced(SourceReport),
    /// The stored cursor already matched the newest item; nothing to do
    UpToDate,
    /// A source-level failure aborted this source; its cursor was not advanced
    Failed {
        /// Human-readable failure reason
        reason: String,
    },
}

/// Result of one source within a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceResult {
    /// The source that was processed
    pub source: Source,

    /// What happened to it
    pub outcome: SourceOutcome,
}

/// Aggregate report for a whole sync run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    pub elapsed: Duration,

    /// Per-source results in processing order
    pub results: Vec<SourceResult>,
}

impl RunReport {
    /// Total files written across all sources
    pub fn total_files(&self) -> u64 {
        self.synced_reports().map(|r| r.files).sum()
    }

    /// Total bytes written across all sources
    pub fn total_bytes(&self) -> u64 {
        self.synced_reports().map(|r| r.bytes).sum()
    }

    /// Sources that failed at the source level, with reasons
    pub fn failed_sources(&self) -> impl Iterator<Item = (&Source, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            SourceOutcome::Failed { reason } => Some((&r.source, reason.as_str())),
            _ => None,
        })
    }

    /// True when no source failed at the source level
    pub fn all_sources_succeeded(&self) -> bool {
        self.failed_sources().next().is_none()
    }

    /// Mean download throughput in MiB/s over the whole run
    pub fn throughput_mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / (1024.0 * 1024.0) / secs
    }

    fn synced_reports(&self) -> impl Iterator<Item = &SourceReport> {
        self.results.iter().filter_map(|r| match &r.outcome {
            SourceOutcome::Synced(report) => Some(report),
            _ => None,
        })
    }
}
