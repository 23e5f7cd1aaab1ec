use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};
use tiny_skia::{ColorU8, Pixmap};

use crate::errors::PadError;

/// Media type of every captured signature.
pub const SIGNATURE_MEDIA_TYPE: &str = "image/png";

const DATA_URL_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// Binary image plus its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    media_type: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Self-describing wire form: `data:<media-type>;base64,<payload>`.
    pub fn to_data_url(&self) -> String {
        format!(
            "{DATA_URL_SCHEME}{}{BASE64_MARKER},{}",
            self.media_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// A named file ready to go into a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

pub fn encode(surface: &Pixmap) -> Result<EncodedImage, PadError> {
    let image = DynamicImage::ImageRgba8(pixmap_to_rgba(surface));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|error| PadError::malformed_encoding(format!("failed to encode PNG: {error}")))?;
    Ok(EncodedImage {
        media_type: SIGNATURE_MEDIA_TYPE.to_owned(),
        bytes,
    })
}

pub fn decode_to_file(encoded: &str, file_name: &str) -> Result<ImageFile, PadError> {
    let image = parse_data_url(encoded)?;
    Ok(ImageFile {
        file_name: file_name.to_owned(),
        media_type: image.media_type,
        bytes: image.bytes,
    })
}

/// Parses a base64 data URL and checks the payload really is the declared
/// codec.
pub fn parse_data_url(encoded: &str) -> Result<EncodedImage, PadError> {
    let trimmed = encoded.trim();
    let rest = trimmed.strip_prefix(DATA_URL_SCHEME).ok_or_else(|| {
        PadError::malformed_encoding("encoded image is missing the 'data:' media-type prefix")
    })?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| {
        PadError::malformed_encoding("encoded image has no ',' between media type and payload")
    })?;
    let media_type = header.strip_suffix(BASE64_MARKER).ok_or_else(|| {
        PadError::malformed_encoding(format!(
            "encoded image header '{header}' is not base64 encoded"
        ))
    })?;
    let media_type = media_type.to_ascii_lowercase();
    let expected = format_for_media_type(&media_type).ok_or_else(|| {
        PadError::malformed_encoding(format!("unsupported image media type '{media_type}'"))
    })?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|error| {
            PadError::malformed_encoding(format!("encoded image payload is not base64: {error}"))
        })?;

    match image::guess_format(&bytes) {
        Ok(actual) if actual == expected => Ok(EncodedImage { media_type, bytes }),
        Ok(actual) => Err(PadError::malformed_encoding(format!(
            "payload declared as {media_type} but contains {:?} data",
            actual
        ))),
        Err(_) => Err(PadError::malformed_encoding(format!(
            "payload is not a valid {media_type} image"
        ))),
    }
}

fn format_for_media_type(media_type: &str) -> Option<ImageFormat> {
    match media_type {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Decodes PNG/JPEG/WebP bytes into a premultiplied raster.
pub fn decode_raster(bytes: &[u8]) -> Result<Pixmap, PadError> {
    let image = image::load_from_memory(bytes)
        .map_err(|error| PadError::malformed_encoding(format!("failed to decode image: {error}")))?;
    rgba_to_pixmap(&image.to_rgba8()).ok_or_else(|| {
        PadError::malformed_encoding(format!(
            "decoded image has no pixels ({}x{})",
            image.width(),
            image.height()
        ))
    })
}

pub fn pixmap_to_rgba(surface: &Pixmap) -> RgbaImage {
    let mut out = Vec::with_capacity(surface.data().len());
    for pixel in surface.pixels() {
        let color = pixel.demultiply();
        out.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    RgbaImage::from_raw(surface.width(), surface.height(), out)
        .unwrap_or_else(|| RgbaImage::new(surface.width(), surface.height()))
}

/// Returns `None` for zero-sized images, which tiny-skia cannot hold.
pub fn rgba_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}
