//! Decoded frame handles and the image-decode capability.
//!
//! **Why**: the sequence pipeline needs an owned, thread-transferable pixel
//! buffer it can move from the loader thread, through the frame buffer, to
//! the consumer. Ownership transfers fully at each hop; nothing here is
//! shared mutably.
//!
//! **Used by**: Sequence loader (decode + push), frame buffer (queued
//! entries), engine (frame delivery to the host).
//!
//! # Pixel Format
//!
//! Everything is decoded to straight RGBA8. The engine does no color
//! management and no scaling; those belong to the display side.

use log::debug;
use std::path::Path;
use std::sync::Arc;

/// Owned RGBA8 pixel buffer with dimensions.
#[derive(Clone, PartialEq)]
pub struct PreviewImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PreviewImage {
    /// Wrap a raw RGBA8 buffer. `pixels.len()` must be `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize) * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Solid-color image, used by tests and placeholder rendering.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
        for px in pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory footprint in bytes.
    pub fn mem(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// What a buffer slot actually holds: a decoded image, or a sentinel
/// standing in for a frame that failed to decode. The sentinel preserves
/// index alignment so one bad frame never shifts the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Image(Arc<PreviewImage>),
    Sentinel { reason: String },
}

impl FramePayload {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, FramePayload::Sentinel { .. })
    }

    pub fn image(&self) -> Option<&Arc<PreviewImage>> {
        match self {
            FramePayload::Image(img) => Some(img),
            FramePayload::Sentinel { .. } => None,
        }
    }
}

/// One produced frame: index, payload, and the source-relative timestamp
/// the index maps to. Produced by the loader, consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBufferEntry {
    pub frame_index: i64,
    pub payload: FramePayload,
    pub source_timestamp: f64,
}

/// Image decode failures. Per-frame and recoverable: the loader converts
/// these into sentinel entries, it never stops on them.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Open(String),
    Decode(String),
    UnsupportedFormat(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Open(e) => write!(f, "open failed: {}", e),
            DecodeError::Decode(e) => write!(f, "decode failed: {}", e),
            DecodeError::UnsupportedFormat(e) => write!(f, "unsupported format: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Image-decode capability consumed by the sequence loader.
///
/// Implementations must be callable from the loader's worker thread.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<PreviewImage, DecodeError>;
}

/// Default decoder backed by the `image` crate (PNG/JPEG/TIFF/TGA).
#[derive(Debug, Default)]
pub struct ImageRsDecoder;

impl ImageDecoder for ImageRsDecoder {
    fn decode(&self, path: &Path) -> Result<PreviewImage, DecodeError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "tif" | "tiff" | "tga" | "bmp" | "webp" => {}
            _ => return Err(DecodeError::UnsupportedFormat(format!(".{}", ext))),
        }

        debug!("Decoding image: {}", path.display());
        let img = image::open(path).map_err(|e| DecodeError::Open(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(PreviewImage::from_rgba8(width, height, rgba.into_raw()))
    }
}
