//! Bounded-concurrency download execution
//!
//! Each enumerated item runs through resolve → fetch → stream-to-disk on a
//! worker gated by a semaphore permit, so at most the configured number of
//! downloads are in flight at once. Results are collected in submission
//! order, keyed to the newest-first listing order rather than completion
//! order; that ordering drives the post-join timestamp pass.
//!
//! A single item's failure is recorded, never thrown: the batch always
//! produces exactly one [`DownloadRecord`] per item.

use crate::client::GalleryClient;
use crate::error::{Error, Result};
use crate::resolve::{fetch_item_page, resolve};
use crate::retry::request_with_retry;
use crate::types::{DownloadRecord, ItemReference, ResolvedAsset};
use futures::StreamExt;
use regex::Regex;
use std::fs::FileTimes;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

// Fixed patterns for response-derived file naming, compiled once. The
// literals are known-good, so failure here is a programming error.
#[allow(clippy::expect_used)]
fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn disposition_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"''(.*)")
}

fn fill_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"/v1/fill/[^/]*/([^/?]+)")
}

fn cdn_file_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"wixmp\.com/f/.*/([^/?]+)\?token=")
}

/// Download every item in `items` into `dest_dir` with at most
/// `max_concurrent` fetches in flight
///
/// Returns one record per item, in the items' newest-first listing order.
/// After all workers complete, output file modification times are
/// reassigned in that order (newest = now, one second apart, strictly
/// decreasing), so time-sorted directory listings reproduce gallery order
/// regardless of completion order.
pub async fn execute_all(
    client: &GalleryClient,
    dest_dir: &Path,
    items: Vec<ItemReference>,
    max_concurrent: usize,
) -> Vec<DownloadRecord> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let dest = dest_dir.to_path_buf();
        let task_item = item.clone();
        let handle = tokio::spawn(async move {
            // Closed-semaphore errors cannot happen here; the semaphore
            // outlives every worker.
            let _permit = semaphore.acquire_owned().await.ok();
            download_item(&client, &dest, task_item).await
        });
        handles.push((item, handle));
    }

    let mut records = Vec::with_capacity(handles.len());
    for (item, handle) in handles {
        match handle.await {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::error!(item = %item.page_url, error = %e, "download task panicked");
                records.push(DownloadRecord {
                    item,
                    titles: Vec::new(),
                    urls: Vec::new(),
                    file_name: None,
                    bytes: 0,
                    error: Some(format!("download task panicked: {e}")),
                });
            }
        }
    }

    apply_listing_order_mtimes(dest_dir, &records).await;

    records
}

/// Resolve and fetch one item, producing its record
///
/// A 4xx on the primary asset URL triggers exactly one re-resolution in
/// degraded mode and one more fetch; every attempt's title and URL is
/// appended to the record.
async fn download_item(
    client: &GalleryClient,
    dest_dir: &Path,
    item: ItemReference,
) -> DownloadRecord {
    let mut record = DownloadRecord {
        item: item.clone(),
        titles: Vec::new(),
        urls: Vec::new(),
        file_name: None,
        bytes: 0,
        error: None,
    };

    let page = match fetch_item_page(client, &item).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(item = %item.page_url, error = %e, "item page fetch failed");
            record.error = Some(e.to_string());
            return record;
        }
    };

    let asset = match resolve(&page, false) {
        Ok(asset) => asset,
        Err(e) => {
            tracing::warn!(item = %item.page_url, error = %e, "item did not resolve");
            record.error = Some(e.to_string());
            return record;
        }
    };
    record.titles.push(asset.title.clone());
    record.urls.push(asset.url.clone());

    match fetch_to_file(client, dest_dir, &asset).await {
        Ok(written) => written.into_record(record),
        Err(Error::AssetRejected { url, status }) => {
            tracing::info!(
                item = %item.page_url,
                rejected_url = %url,
                status,
                "primary asset rejected, retrying with degraded resolution"
            );
            let fallback = match resolve(&page, true) {
                Ok(asset) => asset,
                Err(e) => {
                    record.error = Some(e.to_string());
                    return record;
                }
            };
            record.titles.push(fallback.title.clone());
            record.urls.push(fallback.url.clone());

            match fetch_to_file(client, dest_dir, &fallback).await {
                Ok(written) => written.into_record(record),
                Err(e) => {
                    tracing::warn!(item = %item.page_url, error = %e, "degraded fetch failed");
                    record.error = Some(e.to_string());
                    record
                }
            }
        }
        Err(e) => {
            tracing::warn!(item = %item.page_url, error = %e, "asset fetch failed");
            record.error = Some(e.to_string());
            record
        }
    }
}

/// A completed file write
struct Written {
    file_name: String,
    bytes: u64,
}

impl Written {
    fn into_record(self, mut record: DownloadRecord) -> DownloadRecord {
        if let Some(title) = record.titles.last() {
            tracing::info!(title = %title, file = %self.file_name, bytes = self.bytes, "downloaded");
        }
        record.file_name = Some(self.file_name);
        record.bytes = self.bytes;
        record
    }
}

/// Fetch an asset URL and stream it to disk, with transport retry around
/// the whole attempt
///
/// Each attempt streams to `<name>.part` and renames into place only on
/// success; a failed attempt removes its partial file, so no truncated
/// artifact is ever left under the final name or otherwise.
async fn fetch_to_file(
    client: &GalleryClient,
    dest_dir: &Path,
    asset: &ResolvedAsset,
) -> Result<Written> {
    request_with_retry(client.retry_config(), || async {
        attempt_download(client, dest_dir, asset).await
    })
    .await
}

async fn attempt_download(
    client: &GalleryClient,
    dest_dir: &Path,
    asset: &ResolvedAsset,
) -> Result<Written> {
    let response = client.get_once(&asset.url).await?;
    let status = response.status();
    if status.is_client_error() {
        return Err(Error::AssetRejected {
            url: asset.url.clone(),
            status: status.as_u16(),
        });
    }

    let file_name = output_file_name(&response, asset);
    let final_path = dest_dir.join(&file_name);
    let part_path = dest_dir.join(format!("{file_name}.part"));

    let mut file = tokio::fs::File::create(&part_path).await?;
    let result = stream_body(response, &mut file).await;
    drop(file);

    match result {
        Ok(bytes) => {
            tokio::fs::rename(&part_path, &final_path).await?;
            Ok(Written { file_name, bytes })
        }
        Err(e) => {
            // Discard the partial file; a truncated artifact must not
            // survive under any name.
            if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                tracing::warn!(
                    path = %part_path.display(),
                    error = %cleanup,
                    "failed to remove partial download"
                );
            }
            Err(e)
        }
    }
}

async fn stream_body(response: reqwest::Response, file: &mut tokio::fs::File) -> Result<u64> {
    let mut bytes: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(bytes)
}

/// Derive the output file name from the response, then disambiguate with
/// the item's numeric id
fn output_file_name(response: &reqwest::Response, asset: &ResolvedAsset) -> String {
    let from_header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(name_from_content_disposition);

    let name = match from_header {
        Some(name) => name,
        None => name_from_url(response.url().as_str()),
    };

    apply_item_suffix(&sanitize_file_name(&name), asset.item.item_id())
}

/// Name from an RFC 5987 `filename*=UTF-8''…` disposition value
fn name_from_content_disposition(value: &str) -> Option<String> {
    let raw = disposition_name_re()
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())?;
    let decoded = urlencoding::decode(raw)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    if decoded.is_empty() { None } else { Some(decoded) }
}

/// Name derived from the final (post-redirect) asset URL
fn name_from_url(url: &str) -> String {
    // CDN URLs carry the display name right after the fill parameters
    if url.contains("/v1/fill/") {
        if let Some(name) = fill_name_re()
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        {
            return name.to_string();
        }
    }
    // Pre-signed storage URLs: the segment before the token query
    if let Some(name) = cdn_file_name_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        return name.to_string();
    }
    // Anything else: last path segment, query stripped
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query.rsplit('/').next().unwrap_or("");
    if segment.is_empty() {
        "download".to_string()
    } else {
        segment.to_string()
    }
}

/// Insert `-<id>` before the first extension dot, so distinct items can
/// never collide on a shared display name; names already ending in the id
/// are left alone
fn apply_item_suffix(name: &str, item_id: Option<&str>) -> String {
    let Some(id) = item_id else {
        return name.to_string();
    };
    let suffix = format!("-{id}");
    match name.split_once('.') {
        Some((stem, _)) if stem.ends_with(&suffix) => name.to_string(),
        Some((stem, rest)) => format!("{stem}{suffix}.{rest}"),
        None if name.ends_with(&suffix) => name.to_string(),
        None => format!("{name}{suffix}"),
    }
}

/// Replace path-hostile characters; also used for author directory names
pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Reassign output mtimes in newest-first listing order
///
/// Completion order is nondeterministic under the worker pool; this pass
/// runs after the join and stamps position 0 with "now" and each older
/// item one second earlier, so sorting by modification time reproduces
/// gallery chronology.
async fn apply_listing_order_mtimes(dest_dir: &Path, records: &[DownloadRecord]) {
    let targets: Vec<(PathBuf, u64)> = records
        .iter()
        .filter(|r| r.succeeded())
        .filter_map(|r| {
            r.file_name
                .as_ref()
                .map(|name| (dest_dir.join(name), r.item.position as u64))
        })
        .collect();
    if targets.is_empty() {
        return;
    }

    let result = tokio::task::spawn_blocking(move || {
        let now = SystemTime::now();
        for (path, position) in targets {
            let time = now - Duration::from_secs(position);
            if let Err(e) = set_file_times(&path, time) {
                tracing::warn!(path = %path.display(), error = %e, "failed to set mtime");
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "mtime assignment task failed");
    }
}

fn set_file_times(path: &Path, time: SystemTime) -> std::io::Result<()> {
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)
}
