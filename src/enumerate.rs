//! Paginated listing enumeration with cursor-boundary detection
//!
//! The remote listing API has no native "items since X" filter, so the
//! enumerator re-walks fixed-size pages from the newest item and stops at
//! the stored cursor. Pages are requested the way the site's own gallery
//! page requests them on scroll: a form POST carrying `offset`, `limit`,
//! an anti-forgery token, and a request identifier, both captured fresh
//! from the landing page each run (stale tokens fail the page request).

use crate::client::GalleryClient;
use crate::error::{Error, Result};
use crate::types::{ItemReference, Source, SourceKind};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Items per listing page; the offset advances by this much per request
pub const PAGE_SIZE: usize = 24;

// Fixed patterns of the listing contract, compiled once. The literals are
// known-good, so failure here is a programming error, not a runtime one.
#[allow(clippy::expect_used)]
fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn csrf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#""csrf":"(.*?)""#)
}

fn request_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#""requestid":"(.*?)""#)
}

fn author_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"<title>(.*)'s .*</title>")
}

/// Per-run listing metadata captured from a source's landing page
#[derive(Clone, Debug)]
pub struct GalleryInfo {
    /// Author display name (directory name for downloads)
    pub author_name: String,

    /// Canonical URL of the newest item, `None` for an empty gallery
    ///
    /// Becomes the source's cursor after a fully successful batch.
    pub newest_item: Option<String>,

    /// Short-lived anti-forgery token required by page requests
    csrf: String,

    /// Request identifier paired with the token
    request_id: String,
}

/// Walks one source's listing pages newest-first
pub struct PageEnumerator<'a> {
    client: &'a GalleryClient,
    source: &'a Source,
    landing_url: String,
    item_pattern: Regex,
}

impl<'a> PageEnumerator<'a> {
    /// Build an enumerator for `source` under `base_url`
    pub fn new(client: &'a GalleryClient, source: &'a Source, base_url: &str) -> Result<Self> {
        let base = regex::escape(base_url.trim_end_matches('/'));
        // Gallery listings link only the author's own items; favourites
        // link items by arbitrary authors.
        let pattern = match source.kind {
            SourceKind::Gallery => {
                format!(r#""({base}/{}/art/.*?)""#, regex::escape(&source.name))
            }
            SourceKind::Favourites => format!(r#""({base}/[^/"]+/art/.*?)""#),
        };
        let item_pattern = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("invalid item pattern for {source}: {e}")))?;

        Ok(Self {
            client,
            source,
            landing_url: source.landing_url(base_url),
            item_pattern,
        })
    }

    /// Fetch the landing page and capture the per-run listing metadata
    ///
    /// A 4xx landing response means the source does not exist; a landing
    /// page without the expected token fields violates the listing
    /// contract. Both are fatal to this source only.
    pub async fn fetch_gallery_info(&self) -> Result<GalleryInfo> {
        let response = self.client.get(&self.landing_url).await?;
        let status = response.status();
        if status.is_client_error() {
            return Err(Error::SourceNotFound {
                source: self.source.key(),
                status: status.as_u16(),
            });
        }

        let html = self.client.html_text(response).await?;

        let author_name = author_title_re()
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                Error::Listing(format!("landing page for {} has no author title", self.source))
            })?;

        let newest_item = self
            .item_pattern
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let csrf = capture_required(csrf_re(), &html, "csrf token", self.source)?;
        let request_id = capture_required(request_id_re(), &html, "request id", self.source)?;

        tracing::debug!(
            source = %self.source,
            author = %author_name,
            newest = newest_item.as_deref().unwrap_or("<empty gallery>"),
            "captured gallery info"
        );

        Ok(GalleryInfo {
            author_name,
            newest_item,
            csrf,
            request_id,
        })
    }

    /// Enumerate items newer than `stop_cursor`, newest first
    ///
    /// Returns immediately without issuing any page request when the cursor
    /// already matches the newest item. Otherwise walks pages until the
    /// cursor boundary, an empty page, or `offset_limit` items, whichever
    /// comes first. The result is a newest-first prefix of the gallery as
    /// of this run's start.
    pub async fn enumerate(
        &self,
        info: &GalleryInfo,
        stop_cursor: Option<&str>,
        offset_limit: usize,
    ) -> Result<Vec<ItemReference>> {
        let Some(newest) = info.newest_item.as_deref() else {
            return Ok(Vec::new());
        };
        if stop_cursor == Some(newest) {
            return Ok(Vec::new());
        }

        let mut urls: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0usize;

        loop {
            if offset >= offset_limit {
                tracing::warn!(
                    source = %self.source,
                    offset,
                    "stopping enumeration at the offset limit"
                );
                break;
            }

            let page_urls = self.fetch_page(info, offset).await?;
            if page_urls.is_empty() {
                break;
            }

            let fresh = dedup_fresh(&mut seen, page_urls);
            let (kept, found_boundary) = truncate_at_boundary(fresh, stop_cursor);
            urls.extend(kept);
            if found_boundary {
                break;
            }

            offset += PAGE_SIZE;
        }

        tracing::debug!(source = %self.source, new_items = urls.len(), "enumeration complete");

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(position, page_url)| ItemReference { page_url, position })
            .collect())
    }

    /// Fetch one listing page (mimics the gallery page's scroll request)
    async fn fetch_page(&self, info: &GalleryInfo, offset: usize) -> Result<Vec<String>> {
        let offset_value = offset.to_string();
        let limit_value = PAGE_SIZE.to_string();
        let form = [
            ("offset", offset_value.as_str()),
            ("limit", limit_value.as_str()),
            ("_csrf", info.csrf.as_str()),
            ("dapilid", info.request_id.as_str()),
        ];

        let response = self.client.post_form(&self.landing_url, &form).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Listing(format!(
                "page request for {} at offset {offset} rejected ({status})",
                self.source
            )));
        }

        let html = self.client.html_text(response).await?;
        Ok(self
            .item_pattern
            .captures_iter(&html)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect())
    }
}

fn capture_required(
    re: &Regex,
    html: &str,
    what: &str,
    source: &Source,
) -> Result<String> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::Listing(format!("landing page for {source} has no {what}")))
}

/// Keep the first occurrence of each URL across all pages seen so far,
/// preserving page order (pages can overlap at their edges when the
/// remote listing grows between requests)
fn dedup_fresh(seen: &mut HashSet<String>, page: Vec<String>) -> Vec<String> {
    page.into_iter().filter(|url| seen.insert(url.clone())).collect()
}

/// Truncate a page's fresh URLs at (excluding) the stop cursor
///
/// Returns the kept prefix and whether the boundary was found.
fn truncate_at_boundary(fresh: Vec<String>, stop_cursor: Option<&str>) -> (Vec<String>, bool) {
    let Some(stop) = stop_cursor else {
        return (fresh, false);
    };
    match fresh.iter().position(|url| url == stop) {
        Some(index) => {
            let mut kept = fresh;
            kept.truncate(index);
            (kept, true)
        }
        None => (fresh, false),
    }
}
