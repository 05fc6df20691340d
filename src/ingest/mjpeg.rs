//! JPEG payload extraction from an MJPEG byte stream.
//!
//! Multipart boundaries and part headers are ignored. Frames are located only
//! by the JPEG start-of-image (`FF D8`) and end-of-image (`FF D9`) markers.

use image::{ImageFormat, RgbImage};

use super::StreamError;

/// Upper bound for a single JPEG payload.
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Accumulates stream chunks and yields complete JPEG payloads.
#[derive(Debug, Default)]
pub struct JpegExtractor {
    buffer: Vec<u8>,
}

impl JpegExtractor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Append a received chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() > MAX_JPEG_BYTES * 2 {
            log::warn!(
                "mjpeg buffer exceeded {} bytes without a complete frame; trimming",
                MAX_JPEG_BYTES * 2
            );
            let drain_len = self.buffer.len() - 1;
            self.buffer.drain(..drain_len);
        }
    }

    /// Remove and return the next complete payload, `SOI` through `EOI`
    /// inclusive. Bytes before the payload are discarded with it.
    ///
    /// Returns `None` when no complete pair is buffered; an incomplete
    /// trailing payload stays buffered for the next chunk.
    pub fn next_jpeg(&mut self) -> Option<Vec<u8>> {
        let Some((start, end)) = find_jpeg_bounds(&self.buffer) else {
            self.discard_garbage();
            return None;
        };
        let payload = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        Some(payload)
    }

    /// Drain every complete payload currently buffered.
    pub fn drain_jpegs(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.next_jpeg()).collect()
    }

    /// Bytes currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Drop bytes that can never become part of a payload: everything before
    /// the first start marker, or everything but a trailing `0xFF` when no
    /// start marker is buffered.
    fn discard_garbage(&mut self) {
        match find_marker(&self.buffer, SOI, 0) {
            Some(start) => {
                self.buffer.drain(..start);
            }
            None => {
                let keep = usize::from(self.buffer.last() == Some(&0xFF));
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first `SOI`..`EOI` pair. Returns `(start, end)` with `end`
/// one past the end marker.
pub fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buffer, SOI, 0)?;
    let end = find_marker(buffer, EOI, start + 2)?;
    Some((start, end + 2))
}

fn find_marker(buffer: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}

/// Decode a JPEG payload into RGB pixels.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage, StreamError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
    Ok(image.into_rgb8())
}
