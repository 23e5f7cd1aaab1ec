use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use tiny_skia::Pixmap;
use tracing::debug;

use crate::codec;
use crate::errors::PadError;
use crate::locator::{BaseOrigin, Locator};

/// Resolves a signature reference to pixels. Loads are one-shot; callers
/// await each before compositing.
#[allow(async_fn_in_trait)]
pub trait ImageLoader {
    async fn load(&self, locator: &Locator) -> Result<Pixmap, PadError>;
}

/// Decodes inline references locally and fetches everything else from its
/// display URL.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    http: Client,
    origin: BaseOrigin,
}

impl HttpImageLoader {
    pub fn new(http: Client, origin: BaseOrigin) -> Self {
        Self { http, origin }
    }

    pub fn with_timeout(origin: BaseOrigin, timeout: Duration) -> Result<Self, PadError> {
        let http = Client::builder().timeout(timeout).build().map_err(|error| {
            PadError::network_unavailable(format!("failed to build HTTP client: {error}"))
        })?;
        Ok(Self::new(http, origin))
    }
}

impl ImageLoader for HttpImageLoader {
    async fn load(&self, locator: &Locator) -> Result<Pixmap, PadError> {
        if let Locator::Inline(image) = locator {
            return codec::decode_raster(image.bytes())
                .map_err(|error| PadError::overlay_unavailable(error.message));
        }

        let url = locator.display_url(&self.origin);
        debug!(url = url.as_str(), "fetching signature image");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| PadError::overlay_unavailable(format!("failed to fetch {url}: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PadError::overlay_unavailable(format!(
                "request for {url} failed: HTTP {status}"
            )));
        }
        let bytes = response.bytes().await.map_err(|error| {
            PadError::overlay_unavailable(format!("failed to read image body from {url}: {error}"))
        })?;
        codec::decode_raster(&bytes)
            .map_err(|error| PadError::overlay_unavailable(format!("{url}: {}", error.message)))
    }
}

/// Serves pre-decoded rasters keyed by display URL. Inline references decode
/// directly. Used for offline stamping and tests.
#[derive(Debug, Clone)]
pub struct MemoryImageLoader {
    origin: BaseOrigin,
    images: HashMap<String, Pixmap>,
}

impl MemoryImageLoader {
    pub fn new(origin: BaseOrigin) -> Self {
        Self {
            origin,
            images: HashMap::new(),
        }
    }

    pub fn insert(&mut self, display_url: impl Into<String>, raster: Pixmap) {
        self.images.insert(display_url.into(), raster);
    }
}

impl ImageLoader for MemoryImageLoader {
    async fn load(&self, locator: &Locator) -> Result<Pixmap, PadError> {
        if let Locator::Inline(image) = locator {
            return codec::decode_raster(image.bytes())
                .map_err(|error| PadError::overlay_unavailable(error.message));
        }
        let url = locator.display_url(&self.origin);
        self.images
            .get(&url)
            .cloned()
            .ok_or_else(|| PadError::overlay_unavailable(format!("no image available at {url}")))
    }
}
