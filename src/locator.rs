use std::fmt;

use anyhow::{bail, Context, Result};
use tracing::warn;
use url::Url;

use crate::codec::{self, EncodedImage};
use crate::errors::PadError;

pub const DEFAULT_UPLOAD_PREFIX: &str = "uploads/";

/// Origin every relative locator is joined onto. Stored without a trailing
/// slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseOrigin(String);

impl BaseOrigin {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("base origin cannot be empty");
        }
        let parsed =
            Url::parse(trimmed).with_context(|| format!("invalid base origin '{trimmed}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "base origin '{}' must use http or https, got '{}'",
                trimmed,
                parsed.scheme()
            );
        }
        if parsed.host_str().is_none() {
            bail!("base origin '{trimmed}' has no host");
        }
        Ok(Self(trimmed.trim_end_matches('/').to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins with exactly one `/` between origin and path.
    pub fn join(&self, relative: &str) -> String {
        format!("{}/{}", self.0, relative.trim_start_matches('/'))
    }
}

impl fmt::Display for BaseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signature reference in one of the forms the backend and the browser
/// hand around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Inline(EncodedImage),
    AbsoluteUrl(Url),
    /// Server-relative path starting at the upload prefix.
    RelativePath(String),
    /// Matched none of the known forms; displayed as a best-effort relative
    /// path.
    Unrecognized(String),
}

impl Locator {
    /// Classifies a raw reference. Only inline data can fail, and only when
    /// its encoding is broken.
    pub fn classify(raw: &str, upload_prefix: &str) -> Result<Self, PadError> {
        let trimmed = raw.trim();

        if trimmed.starts_with("data:") {
            return codec::parse_data_url(trimmed).map(Self::Inline);
        }

        if let Ok(url) = Url::parse(trimmed) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(Self::AbsoluteUrl(url));
            }
        }

        if let Some(relative) = strip_to_upload_prefix(trimmed, upload_prefix) {
            return Ok(Self::RelativePath(relative.to_owned()));
        }

        Ok(Self::Unrecognized(trimmed.to_owned()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "inline",
            Self::AbsoluteUrl(_) => "absolute_url",
            Self::RelativePath(_) => "relative_path",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// The single URL an image element should load for this reference.
    pub fn display_url(&self, origin: &BaseOrigin) -> String {
        match self {
            Self::Inline(image) => image.to_data_url(),
            Self::AbsoluteUrl(url) => url.to_string(),
            Self::RelativePath(path) => origin.join(path),
            Self::Unrecognized(raw) => {
                warn!(
                    locator = raw.as_str(),
                    "unrecognized signature reference; treating it as a relative path"
                );
                origin.join(raw)
            }
        }
    }
}

/// Returns the suffix of `raw` beginning at the first occurrence of the
/// upload prefix, ignoring leading slashes.
fn strip_to_upload_prefix<'a>(raw: &'a str, upload_prefix: &str) -> Option<&'a str> {
    let prefix = upload_prefix.trim_start_matches('/');
    if prefix.is_empty() {
        return None;
    }

    let path = raw.trim_start_matches('/');
    path.find(prefix).map(|index| &path[index..])
}
