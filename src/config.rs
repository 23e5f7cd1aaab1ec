use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{de::Error as DeError, Deserialize, Deserializer};
use tiny_skia::Color;
use url::Url;

use crate::locator::{BaseOrigin, DEFAULT_UPLOAD_PREFIX};
use crate::stroke::Pen;
use crate::text::{TextPainter, TextStyle};

/// Read by the binary only; the library takes the origin from [`PadConfig`].
pub const BASE_ORIGIN_ENV: &str = "SIGPAD_BASE_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PadConfig {
    /// May be left out of the file when the caller supplies it.
    #[serde(default)]
    pub base_origin: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_upload_field")]
    pub upload_field: String,
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub pen: PenConfig,
    #[serde(default)]
    pub text: TextConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PenConfig {
    #[serde(default = "default_pen_width")]
    pub width: f32,
    #[serde(default)]
    pub color: HexColor,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            width: default_pen_width(),
            color: HexColor::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextConfig {
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_text_size")]
    pub size: f32,
    #[serde(default = "default_line_height")]
    pub line_height: f32,
    #[serde(default)]
    pub color: HexColor,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            size: default_text_size(),
            line_height: default_line_height(),
            color: HexColor::default(),
        }
    }
}

/// `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexColor(pub Color);

impl Default for HexColor {
    fn default() -> Self {
        Self(Color::BLACK)
    }
}

impl HexColor {
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("color '{raw}' must start with '#'"))?;
        if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("color '{raw}' must be #RRGGBB or #RRGGBBAA");
        }
        let channel = |index: usize| u8::from_str_radix(&digits[index..index + 2], 16);
        let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
        Ok(Self(Color::from_rgba8(
            channel(0)?,
            channel(2)?,
            channel(4)?,
            alpha,
        )))
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|error| D::Error::custom(error.to_string()))
    }
}

fn default_upload_path() -> String {
    "/upload/signature".to_owned()
}

fn default_upload_field() -> String {
    "signature".to_owned()
}

fn default_upload_prefix() -> String {
    DEFAULT_UPLOAD_PREFIX.to_owned()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_pen_width() -> f32 {
    2.5
}

fn default_text_size() -> f32 {
    16.0
}

fn default_line_height() -> f32 {
    20.0
}

pub fn load_config(path: &Path) -> Result<PadConfig> {
    let config = parse_config(path)?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Reads and parses without validating, for callers that override fields
/// first. Relative font paths resolve against the config file's directory.
pub fn parse_config(path: &Path) -> Result<PadConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config: PadConfig = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    if let Some(font_path) = config.text.font_path.take() {
        let resolved = if font_path.is_absolute() {
            font_path
        } else {
            path.parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
                .join(font_path)
        };
        config.text.font_path = Some(resolved);
    }
    Ok(config)
}

impl PadConfig {
    /// Defaults for everything except the origin.
    pub fn new(base_origin: impl Into<String>) -> Self {
        Self {
            base_origin: base_origin.into(),
            upload_path: default_upload_path(),
            upload_field: default_upload_field(),
            upload_prefix: default_upload_prefix(),
            request_timeout_secs: default_request_timeout_secs(),
            pen: PenConfig::default(),
            text: TextConfig::default(),
        }
    }

    pub fn with_base_origin(mut self, base_origin: impl Into<String>) -> Self {
        self.base_origin = base_origin.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        BaseOrigin::parse(&self.base_origin)?;
        self.upload_endpoint()?;

        if self.upload_field.trim().is_empty() {
            bail!("upload_field cannot be empty");
        }
        if self.upload_prefix.trim_matches('/').is_empty() {
            bail!("upload_prefix cannot be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be > 0");
        }
        validate_positive("pen.width", self.pen.width)?;
        validate_positive("text.size", self.text.size)?;
        validate_positive("text.line_height", self.text.line_height)?;
        if let Some(font_path) = &self.text.font_path {
            if !font_path.exists() {
                bail!("text.font_path does not exist: {}", font_path.display());
            }
        }
        Ok(())
    }

    pub fn origin(&self) -> Result<BaseOrigin> {
        BaseOrigin::parse(&self.base_origin)
    }

    /// Origin joined with `upload_path`.
    pub fn upload_endpoint(&self) -> Result<Url> {
        let origin = self.origin()?;
        let joined = origin.join(&self.upload_path);
        Url::parse(&joined).with_context(|| format!("invalid upload endpoint '{joined}'"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pen(&self) -> Pen {
        Pen {
            width: self.pen.width,
            color: self.pen.color.0,
        }
    }

    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            size: self.text.size,
            line_height: self.text.line_height,
            color: self.text.color.0,
        }
    }

    pub fn text_painter(&self) -> Result<TextPainter> {
        match &self.text.font_path {
            Some(path) => TextPainter::from_font_file(path),
            None => Ok(TextPainter::builtin()),
        }
    }
}

fn validate_positive(label: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{label} must be a positive number, got {value}");
    }
    Ok(())
}
