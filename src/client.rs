//! HTTP transport for the gallery site
//!
//! One shared [`reqwest::Client`] with a persistent cookie jar carries all
//! requests for a run. The jar is pre-seeded with the `agegate_state=1`
//! cookie that bypasses the site's age-verification interstitial; without
//! it, mature-flagged item pages serve a consent page instead of content.
//!
//! Server errors (5xx) are retried with the configured backoff budget and
//! then surface as transport errors. Client errors (4xx) are returned to
//! the caller, because their meaning depends on what was being fetched:
//! a 4xx landing page means an unknown source, a 4xx asset means the
//! resolved URL was rejected.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::request_with_retry;
use std::sync::Arc;
use url::Url;

/// Cookie that bypasses the age-verification gate
const AGE_GATE_COOKIE: &str = "agegate_state=1";

/// Browser user agent sent with every request
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Shared HTTP client for listing pages, item pages, and assets
#[derive(Clone)]
pub struct GalleryClient {
    http: reqwest::Client,
    retry: RetryConfig,
}

impl GalleryClient {
    /// Build a client with the age-gate cookie pre-seeded for `base_url`
    pub fn new(base_url: &str, retry: RetryConfig) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{base_url}': {e}")))?;

        let jar = Arc::new(reqwest::cookie::Jar::default());
        jar.add_cookie_str(AGE_GATE_COOKIE, &base);

        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { http, retry })
    }

    /// Retry configuration shared with callers that run their own retry
    /// loop around streaming downloads
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// GET with transport retry; returns the response for success and 4xx
    /// statuses, classifying 5xx as retryable transport failures
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        request_with_retry(&self.retry, || self.get_once(url)).await
    }

    /// Single-attempt GET, for callers that wrap their own retry loop
    /// around the whole fetch-and-stream operation
    pub async fn get_once(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        reject_server_error(response)
    }

    /// Form-encoded POST with transport retry; same status classification
    /// as [`get`](Self::get)
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        request_with_retry(&self.retry, || async {
            let response = self.http.post(url).form(form).send().await?;
            reject_server_error(response)
        })
        .await
    }

    /// Read a response body as entity-unescaped HTML text
    pub async fn html_text(&self, response: reqwest::Response) -> Result<String> {
        let text = response.text().await?;
        Ok(unescape_html(&text))
    }
}

/// Convert 5xx responses into retryable transport errors; pass everything
/// else (success and 4xx) through for caller classification
fn reject_server_error(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_server_error() {
        if let Err(e) = response.error_for_status_ref() {
            return Err(Error::Transport(e));
        }
    }
    Ok(response)
}

/// Decode the HTML entities the site emits in page markup
///
/// Attribute values in the listing and item pages arrive entity-escaped;
/// the URL patterns only match the decoded form. Handles the five named
/// entities plus decimal and hexadecimal numeric references; anything
/// unrecognized is preserved literally.
pub fn unescape_html(input: &str) -> String {
    // Longest reference the site emits is a 7-char numeric one; anything
    // without a ';' in that window is a bare ampersand.
    const MAX_ENTITY_LEN: usize = 10;

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        let end = rest
            .bytes()
            .take(MAX_ENTITY_LEN)
            .position(|b| b == b';');
        let Some(end) = end else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity.strip_prefix('#').and_then(decode_numeric_entity),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric_entity(digits: &str) -> Option<char> {
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}
