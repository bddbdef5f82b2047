//! Shared fixtures: a wiremock fake of the remote gallery contract
//!
//! `FakeGallery` stands up the whole surface the engine talks to — the
//! landing page with its anti-forgery token and request id, the scroll
//! POST pages, per-item pages, and the assets themselves — so integration
//! tests can drive `GallerySync` end-to-end without touching the network.

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Items per scroll page, mirroring the engine's fixed page size
pub const PAGE_SIZE: usize = 24;

/// A fake gallery site for one author
pub struct FakeGallery {
    pub server: MockServer,
    pub author: String,
}

impl FakeGallery {
    pub async fn start(author: &str) -> Self {
        Self {
            server: MockServer::start().await,
            author: author.to_string(),
        }
    }

    pub fn base(&self) -> String {
        self.server.uri()
    }

    /// Canonical page URL of item `n`
    pub fn art_url(&self, n: usize) -> String {
        format!("{}/{}/art/piece-{n}", self.base(), self.author)
    }

    fn asset_path(n: usize) -> String {
        format!("/assets/piece-{n}.png")
    }

    /// Asset body for item `n` (`n` bytes, so sizes are assertable)
    pub fn asset_body(n: usize) -> Vec<u8> {
        vec![b'x'; n]
    }

    /// Expected output file name for item `n`
    ///
    /// The asset's own name already ends in the item id, so no extra
    /// disambiguation suffix is added.
    pub fn file_name(n: usize) -> String {
        format!("piece-{n}.png")
    }

    /// Install mocks for a gallery holding `items` (newest first)
    ///
    /// `broken` items get a page that resolves to no asset. Call
    /// [`reset`](Self::reset) first when re-installing a changed gallery.
    pub async fn install(&self, items: &[usize], broken: &[usize]) {
        self.install_landing(items).await;
        self.install_pages(items).await;
        for &n in items {
            if broken.contains(&n) {
                self.install_broken_item(n).await;
            } else {
                self.install_item(n).await;
            }
        }
    }

    /// Drop all installed mocks (used between incremental phases)
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    async fn install_landing(&self, items: &[usize]) {
        let newest_link = items
            .first()
            .map(|&n| format!(r#"<a href="{}"></a>"#, self.art_url(n)))
            .unwrap_or_default();
        let html = format!(
            r#"<html><head><title>{}'s gallery</title></head>
            <body>{newest_link}
            <script>{{"csrf":"tok-e2e","requestid":"req-e2e"}}</script>
            </body></html>"#,
            self.author
        );
        Mock::given(method("GET"))
            .and(path(format!("/{}/gallery/", self.author)))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&self.server)
            .await;
    }

    async fn install_pages(&self, items: &[usize]) {
        let mut offset = 0;
        for chunk in items.chunks(PAGE_SIZE) {
            self.install_page(offset, chunk).await;
            offset += PAGE_SIZE;
        }
        // Terminal empty page
        self.install_page(offset, &[]).await;
    }

    async fn install_page(&self, offset: usize, items: &[usize]) {
        let links: String = items
            .iter()
            .map(|&n| format!(r#"<a href="{}"></a>"#, self.art_url(n)))
            .collect();
        Mock::given(method("POST"))
            .and(path(format!("/{}/gallery/", self.author)))
            .and(body_string_contains(format!("offset={offset}&")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("<html><body>{links}</body></html>")),
            )
            .mount(&self.server)
            .await;
    }

    async fn install_item(&self, n: usize) {
        let asset_url = format!("{}{}", self.base(), Self::asset_path(n));
        let html = format!(
            r#"<html><head><title>Piece {n} by {} on DeviantArt</title></head><body>
            <img collect_rid="1:0" src="https://thumb.example/t.png">
            <img collect_rid="1:1" src="{asset_url}">
            </body></html>"#,
            self.author
        );
        Mock::given(method("GET"))
            .and(path(format!("/{}/art/piece-{n}", self.author)))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(Self::asset_path(n)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Self::asset_body(n)))
            .mount(&self.server)
            .await;
    }

    async fn install_broken_item(&self, n: usize) {
        let html = format!(
            r#"<html><head><title>Piece {n} by {} on DeviantArt</title></head>
            <body>no asset markup at all</body></html>"#,
            self.author
        );
        Mock::given(method("GET"))
            .and(path(format!("/{}/art/piece-{n}", self.author)))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&self.server)
            .await;
    }
}
