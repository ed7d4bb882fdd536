use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Bytes per pixel of every raw buffer moving through the pipeline (RGBA8).
pub const BYTES_PER_PIXEL: usize = 4;

/// Vertical order of rows in a raw pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RowOrder {
    /// First row in memory is the top of the image.
    #[default]
    TopFirst,
    /// First row in memory is the bottom of the image.
    BottomFirst,
}

/// Dimensions of captured and encoded frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Aspect-preserving downscale target: the longer side becomes
    /// `max_dimension`, the shorter one is scaled by the same ratio.
    pub fn fit_within(source_width: u32, source_height: u32, max_dimension: u32) -> Self {
        let (width, height) = if source_width > source_height {
            let ratio = max_dimension as f32 / source_width as f32;
            (max_dimension, (source_height as f32 * ratio) as u32)
        } else {
            let ratio = max_dimension as f32 / source_height.max(1) as f32;
            ((source_width as f32 * ratio) as u32, max_dimension)
        };
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Length in bytes of an RGBA8 buffer with these dimensions.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// Raw pixels produced by a completed readback.
///
/// Ownership moves exactly once from the capture pipeline to the encoding
/// worker through the intake queue.
#[derive(Debug)]
pub struct RawImageBuffer {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_order: RowOrder,
}

impl RawImageBuffer {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// One compressed still image.
///
/// The payload is shared so the ring buffer can hand out snapshots without
/// copying frame bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressedFrame {
    data: Arc<[u8]>,
}

impl CompressedFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for CompressedFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Reverse the order of rows in place. Applying it twice is the identity.
pub fn flip_rows(pixels: &mut [u8], width: u32, height: u32) {
    let stride = width as usize * BYTES_PER_PIXEL;
    let rows = height as usize;
    if stride == 0 || pixels.len() < stride * rows {
        return;
    }

    for top in 0..rows / 2 {
        let bottom = rows - top - 1;
        let (upper, lower) = pixels.split_at_mut(bottom * stride);
        upper[top * stride..(top + 1) * stride].swap_with_slice(&mut lower[..stride]);
    }
}
