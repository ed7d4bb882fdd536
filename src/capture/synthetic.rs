//! Software capture source that renders a moving gradient.
//!
//! Useful wherever no real renderer is available: the demo binary and tests.
//! A readback finishes once a configurable number of further frames have been
//! rendered, mimicking the latency of a GPU copy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::{CaptureSource, OffscreenTarget, ReadbackPoll, ReadbackRequest};
use crate::types::{FrameSize, RowOrder, BYTES_PER_PIXEL};

pub struct TestPatternSource {
    size: FrameSize,
    frames_rendered: Arc<AtomicU32>,
    latency_frames: u32,
    row_order: RowOrder,
    async_readback: bool,
}

impl TestPatternSource {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            frames_rendered: Arc::new(AtomicU32::new(0)),
            latency_frames: 1,
            row_order: RowOrder::TopFirst,
            async_readback: true,
        }
    }

    /// Frames that must be rendered after a readback before it completes.
    pub fn with_latency(mut self, frames: u32) -> Self {
        self.latency_frames = frames;
        self
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    /// Simulate a host without asynchronous readback.
    pub fn without_async_readback(mut self) -> Self {
        self.async_readback = false;
        self
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Frames rendered so far.
    pub fn frames_rendered(&self) -> u32 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    fn render(&self, frame_index: u32, pixels: &mut [u8]) {
        let width = self.size.width.max(1);
        let height = self.size.height.max(1);
        let shift = frame_index.wrapping_mul(4);

        for (i, pixel) in pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let x = i as u32 % width;
            let mut y = i as u32 / width;
            if self.row_order == RowOrder::BottomFirst {
                y = height - 1 - y.min(height - 1);
            }
            pixel[0] = ((x * 255 / width).wrapping_add(shift)) as u8;
            pixel[1] = (y * 255 / height) as u8;
            pixel[2] = (shift / 2) as u8;
            pixel[3] = 255;
        }
    }
}

/// Readback that turns ready once the source has rendered `ready_at` frames.
pub struct PatternReadback {
    pixels: Option<Vec<u8>>,
    ready_at: u32,
    frames_rendered: Arc<AtomicU32>,
}

impl ReadbackRequest for PatternReadback {
    fn poll(&mut self) -> ReadbackPoll {
        if self.frames_rendered.load(Ordering::Acquire) < self.ready_at {
            return ReadbackPoll::Pending;
        }
        match self.pixels.take() {
            Some(pixels) => ReadbackPoll::Ready(pixels),
            None => ReadbackPoll::Failed("readback already consumed".to_string()),
        }
    }
}

impl CaptureSource for TestPatternSource {
    type Request = PatternReadback;

    fn supports_async_readback(&self) -> bool {
        self.async_readback
    }

    fn row_order(&self) -> RowOrder {
        self.row_order
    }

    fn request_readback(&mut self, target: &mut OffscreenTarget) -> PatternReadback {
        let frame_index = self.frames_rendered();
        self.render(frame_index, target.pixels_mut());
        let rendered = frame_index.saturating_add(1);
        self.frames_rendered.store(rendered, Ordering::Release);

        PatternReadback {
            pixels: Some(target.pixels().to_vec()),
            ready_at: rendered.saturating_add(self.latency_frames),
            frames_rendered: Arc::clone(&self.frames_rendered),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_waits_for_latency() {
        let mut source = TestPatternSource::new(FrameSize::new(4, 4)).with_latency(2);
        let mut target = OffscreenTarget::new(source.size());
        let mut request = source.request_readback(&mut target);

        // Polling alone does not complete the copy; rendering more frames does.
        assert_eq!(request.poll(), ReadbackPoll::Pending);
        assert_eq!(request.poll(), ReadbackPoll::Pending);
        let _next = source.request_readback(&mut target);
        assert_eq!(request.poll(), ReadbackPoll::Pending);
        let _after = source.request_readback(&mut target);
        match request.poll() {
            ReadbackPoll::Ready(pixels) => assert_eq!(pixels.len(), 64),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[test]
    fn test_consecutive_frames_differ() {
        let mut source = TestPatternSource::new(FrameSize::new(8, 2)).with_latency(0);
        let mut target = OffscreenTarget::new(source.size());

        let first = match source.request_readback(&mut target).poll() {
            ReadbackPoll::Ready(pixels) => pixels,
            other => panic!("expected ready, got {:?}", other),
        };
        let second = match source.request_readback(&mut target).poll() {
            ReadbackPoll::Ready(pixels) => pixels,
            other => panic!("expected ready, got {:?}", other),
        };

        assert_ne!(first, second);
        assert_eq!(source.frames_rendered(), 2);
    }

    #[test]
    fn test_bottom_first_pattern_is_vertically_mirrored() {
        let size = FrameSize::new(2, 3);
        let mut top = TestPatternSource::new(size).with_latency(0);
        let mut bottom = TestPatternSource::new(size)
            .with_latency(0)
            .with_row_order(RowOrder::BottomFirst);
        let mut target = OffscreenTarget::new(size);

        let ReadbackPoll::Ready(top_pixels) = top.request_readback(&mut target).poll() else {
            panic!("expected ready");
        };
        let ReadbackPoll::Ready(mut bottom_pixels) = bottom.request_readback(&mut target).poll() else {
            panic!("expected ready");
        };
        crate::types::flip_rows(&mut bottom_pixels, size.width, size.height);

        assert_eq!(top_pixels, bottom_pixels);
    }
}
