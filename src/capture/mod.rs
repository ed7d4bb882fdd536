pub mod pipeline;
pub mod pool;
pub mod synthetic;

pub use pipeline::{CapturePipeline, CaptureStats, FrameRequest, PollReport};
pub use pool::{BufferPool, OffscreenTarget};
pub use synthetic::TestPatternSource;

use crate::types::RowOrder;

/// Outcome of polling an asynchronous readback.
#[derive(Debug, PartialEq)]
pub enum ReadbackPoll {
    /// The copy has not finished yet.
    Pending,
    /// The copy finished; RGBA8 pixels, `width * height * 4` bytes.
    Ready(Vec<u8>),
    /// The copy failed. The frame is lost but the target can be reused.
    Failed(String),
}

/// An in-flight asynchronous copy of one rendered frame.
pub trait ReadbackRequest {
    fn poll(&mut self) -> ReadbackPoll;
}

/// Supplies rendered frames through asynchronous readback.
///
/// Requests issued on one source must complete in submission order.
pub trait CaptureSource {
    type Request: ReadbackRequest;

    /// Whether the host can read frames back without blocking.
    fn supports_async_readback(&self) -> bool;

    /// Row order of the pixels returned by readbacks.
    fn row_order(&self) -> RowOrder;

    /// Render the current frame into `target` and start copying it back.
    fn request_readback(&mut self, target: &mut OffscreenTarget) -> Self::Request;
}
