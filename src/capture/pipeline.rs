use std::collections::VecDeque;

use super::{BufferPool, CaptureSource, OffscreenTarget, ReadbackPoll, ReadbackRequest};
use crate::encoder::IntakeQueue;
use crate::errors::CaptureError;
use crate::logging::RECORDER_TARGET;
use crate::types::{flip_rows, FrameSize, RawImageBuffer, RowOrder};

/// A pooled target plus the readback copying it.
pub struct FrameRequest<R> {
    target: OffscreenTarget,
    readback: R,
}

/// Frames moved by a single [`CapturePipeline::poll_completed`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Totals over the lifetime of a pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub submitted: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Issues one readback per tick and forwards completed frames in submission order.
pub struct CapturePipeline<R> {
    size: FrameSize,
    source_order: RowOrder,
    output_order: RowOrder,
    pool: BufferPool,
    in_flight: VecDeque<FrameRequest<R>>,
    stats: CaptureStats,
}

impl<R: ReadbackRequest> CapturePipeline<R> {
    /// `source_order` is what readbacks return, `output_order` what the encoder expects.
    pub fn new(size: FrameSize, source_order: RowOrder, output_order: RowOrder) -> Self {
        Self {
            size,
            source_order,
            output_order,
            pool: BufferPool::new(size),
            in_flight: VecDeque::new(),
            stats: CaptureStats::default(),
        }
    }

    /// Render the current frame into a pooled target and queue its readback.
    pub fn submit<S>(&mut self, source: &mut S)
    where
        S: CaptureSource<Request = R>,
    {
        let mut target = self.pool.acquire();
        let readback = source.request_readback(&mut target);
        self.in_flight.push_back(FrameRequest { target, readback });
        self.stats.submitted += 1;
    }

    /// Move finished readbacks, oldest first, into `intake`.
    ///
    /// Stops at the first request that is still pending; later requests are
    /// never taken ahead of it. Failed readbacks drop their frame and recycle
    /// the target.
    pub fn poll_completed(&mut self, intake: &IntakeQueue<RawImageBuffer>) -> PollReport {
        let mut report = PollReport::default();

        loop {
            let outcome = match self.in_flight.front_mut() {
                Some(head) => head.readback.poll(),
                None => break,
            };
            if outcome == ReadbackPoll::Pending {
                break;
            }
            let Some(request) = self.in_flight.pop_front() else {
                break;
            };
            self.pool.recycle(request.target);

            match self.accept(outcome) {
                Ok(image) => {
                    intake.push(image);
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(target: RECORDER_TARGET, "[CAPTURE] Dropping frame: {}", e);
                    report.dropped += 1;
                }
            }
        }

        self.stats.delivered += report.delivered as u64;
        self.stats.dropped += report.dropped as u64;
        report
    }

    fn accept(&self, outcome: ReadbackPoll) -> Result<RawImageBuffer, CaptureError> {
        let mut pixels = match outcome {
            ReadbackPoll::Ready(pixels) => pixels,
            ReadbackPoll::Failed(reason) => return Err(CaptureError::Readback(reason)),
            ReadbackPoll::Pending => return Err(CaptureError::Readback("still pending".to_string())),
        };

        let expected = self.size.byte_len();
        if pixels.len() != expected {
            return Err(CaptureError::InvalidFrame {
                expected,
                actual: pixels.len(),
            });
        }

        if self.source_order != self.output_order {
            flip_rows(&mut pixels, self.size.width, self.size.height);
        }

        Ok(RawImageBuffer {
            pixels,
            width: self.size.width,
            height: self.size.height,
            row_order: self.output_order,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Abandon in-flight readbacks and free every pooled target.
    pub fn release(&mut self) -> usize {
        let abandoned = self.in_flight.len();
        for request in self.in_flight.drain(..) {
            self.pool.recycle(request.target);
        }
        self.pool.release();
        abandoned
    }
}
