//! Asset URL resolution
//!
//! The same underlying binary can be exposed by the site through several
//! competing URL shapes. Resolution tries them in a fixed priority order,
//! each shape a pure function of the item's page markup:
//!
//! 1. A pre-signed download-button URL (highest fidelity).
//! 2. A CDN URL with a rewritable `/v1/fill/` parameter segment, upgraded
//!    to maximum size and quality. In retry mode, only the quality
//!    parameter is adjusted and the served size/crop parameters are kept,
//!    because the upgraded form is exactly what the server rejected.
//! 3. A plain direct asset URL, used verbatim.
//!
//! Resolution never mutates the [`ItemReference`]; fetching the item page
//! once yields everything both modes need, so the rejection fallback
//! re-resolves without another page request.

use crate::client::GalleryClient;
use crate::error::{Error, ResolutionError, Result};
use crate::types::{ItemReference, ResolvedAsset, UrlStrategy};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum-fidelity parameter segment for upgraded CDN URLs
const MAX_FILL_SETTINGS: &str = "w_5100,h_5100,bl,q_100";

// Fixed patterns of the item-page contract, compiled once. The literals are
// known-good, so failure here is a programming error, not a runtime one.
#[allow(clippy::expect_used)]
fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"<title>(.*) by .*</title>")
}

fn download_button_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#"data-download_url="(.*?)""#)
}

fn collect_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r#"<img collect_rid="1:\d+" src="(.*?)""#)
}

fn fill_segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"/v1/fill/.*/")
}

fn quality_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"q_\d+,strp")
}

/// An item's page markup plus the metadata extracted from it
///
/// Fetched once per item; both resolution modes work from the same page.
#[derive(Clone, Debug)]
pub struct ItemPage {
    /// The item this page belongs to
    pub item: ItemReference,

    /// Item title from the page's `<title>` element
    pub title: String,

    html: String,
}

impl ItemPage {
    /// Build a page from already-unescaped markup (used by tests and by
    /// [`fetch_item_page`])
    pub fn from_html(item: ItemReference, html: String) -> Result<Self> {
        let title = title_re()
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ResolutionError::MissingTitle {
                item: item.page_url.clone(),
            })?;
        Ok(Self { item, title, html })
    }
}

/// Fetch an item's canonical page and extract its title
pub async fn fetch_item_page(client: &GalleryClient, item: &ItemReference) -> Result<ItemPage> {
    let response = client.get(&item.page_url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Resolution(ResolutionError::PageUnavailable {
            item: item.page_url.clone(),
            status: status.as_u16(),
        }));
    }
    let html = client.html_text(response).await?;
    ItemPage::from_html(item.clone(), html)
}

/// Resolve an item page to its downloadable asset URL
///
/// `retry_mode` selects the degraded CDN form after the primary URL was
/// rejected at fetch time. Pure: same page and mode always yield the same
/// asset.
pub fn resolve(page: &ItemPage, retry_mode: bool) -> Result<ResolvedAsset> {
    let (url, strategy) = match pick_url(&page.html, retry_mode) {
        Some(picked) => picked,
        None => {
            return Err(Error::Resolution(ResolutionError::NoStrategyMatched {
                item: page.item.page_url.clone(),
            }));
        }
    };

    Ok(ResolvedAsset {
        url,
        title: page.title.clone(),
        strategy,
        item: page.item.clone(),
    })
}

fn pick_url(html: &str, retry_mode: bool) -> Option<(String, UrlStrategy)> {
    // Rung 1: the explicit download button always wins when present
    if let Some(url) = download_button_url(html) {
        return Some((url, UrlStrategy::DownloadButton));
    }

    // Rungs 2 and 3 share the same candidate: the second collect_rid image
    // (the first is the site's collection widget thumbnail, not the art)
    let candidate = embedded_image_url(html)?;
    if candidate.contains("/v1/fill/") {
        let url = if retry_mode {
            degrade_fill_url(&candidate)
        } else {
            upgrade_fill_url(&candidate)
        };
        Some((url, UrlStrategy::CdnFill))
    } else {
        Some((candidate, UrlStrategy::Direct))
    }
}

fn download_button_url(html: &str) -> Option<String> {
    download_button_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn embedded_image_url(html: &str) -> Option<String> {
    collect_image_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .nth(1)
        .map(|m| m.as_str().to_string())
}

/// Rewrite a served `/v1/fill/` URL to its maximum-fidelity form: drop the
/// access token, route through the `/intermediary/` prefix, and replace the
/// whole parameter segment
fn upgrade_fill_url(url: &str) -> String {
    let without_token = url.split_once("?token=").map_or(url, |(head, _)| head);
    let intermediary = without_token.replace("/f/", "/intermediary/f/");
    let settings = format!("/v1/fill/{MAX_FILL_SETTINGS}/");
    fill_segment_re()
        .replace(&intermediary, settings.as_str())
        .into_owned()
}

/// Conservative fallback form: the URL exactly as served (token, size and
/// crop parameters intact), with only the quality parameter raised
fn degrade_fill_url(url: &str) -> String {
    quality_re().replace(url, "q_100").into_owned()
}
