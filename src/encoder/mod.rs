pub mod queue;
pub mod worker;

pub use queue::IntakeQueue;
pub use worker::{EncodingWorker, FrameSink, WorkerStats};

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::errors::EncodeError;
use crate::types::{RawImageBuffer, RowOrder, BYTES_PER_PIXEL};

/// Turns a raw RGBA8 buffer into one independently decodable still image.
///
/// Implementations are shared with the encoding worker thread.
pub trait Compressor: Send + Sync {
    /// Row order the compressor expects its input in.
    fn row_order(&self) -> RowOrder {
        RowOrder::TopFirst
    }

    fn compress(&self, image: &RawImageBuffer, quality: u8) -> Result<Vec<u8>, EncodeError>;
}

/// Baseline JPEG compressor backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCompressor;

impl Compressor for JpegCompressor {
    fn compress(&self, image: &RawImageBuffer, quality: u8) -> Result<Vec<u8>, EncodeError> {
        let expected = image.size().byte_len();
        if image.pixels.len() != expected {
            return Err(EncodeError::InvalidBuffer {
                width: image.width,
                height: image.height,
                expected,
                actual: image.pixels.len(),
            });
        }

        // JPEG has no alpha channel.
        let mut rgb = Vec::with_capacity(expected / BYTES_PER_PIXEL * 3);
        for pixel in image.pixels.chunks_exact(BYTES_PER_PIXEL) {
            rgb.extend_from_slice(&pixel[..3]);
        }

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode(&rgb, image.width, image.height, ExtendedColorType::Rgb8)?;
        Ok(out)
    }
}
