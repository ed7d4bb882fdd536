use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::avi::muxer::{ContainerMuxer, MuxOutput, MuxSummary};
use crate::errors::MuxError;
use crate::logging::RECORDER_TARGET;
use crate::types::CompressedFrame;

/// Bounded FIFO of the most recent compressed frames for rolling capture.
///
/// `len() <= capacity()` holds at all times: a push into a full store evicts
/// and drops the oldest frame.
pub struct RingBufferStore {
    frames: Mutex<VecDeque<CompressedFrame>>,
    capacity: usize,
}

impl RingBufferStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append a frame, returning the evicted oldest frame if the store was full.
    pub fn push(&self, frame: CompressedFrame) -> Option<CompressedFrame> {
        let mut frames = self.lock();
        frames.push_back(frame);
        if frames.len() > self.capacity {
            frames.pop_front()
        } else {
            None
        }
    }

    /// Copy of the buffered frames, oldest first. Payloads are shared, not copied.
    pub fn snapshot(&self) -> Vec<CompressedFrame> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Write every frame buffered right now into a standalone file at `path`.
    ///
    /// The ring is left untouched, so rolling capture carries on. Frames
    /// pushed while the file is being written are not included.
    pub fn drain_to(
        &self,
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<MuxSummary, MuxError> {
        self.drain_into(ContainerMuxer::begin(path, width, height, frame_rate)?)
    }

    /// Write the buffered frames through an already opened muxer and close it.
    ///
    /// A failed write stops the snapshot; the frames written so far are still
    /// finalized before the error is returned.
    pub fn drain_into<W: MuxOutput>(&self, mut muxer: ContainerMuxer<W>) -> Result<MuxSummary, MuxError> {
        let frames = self.snapshot();
        tracing::info!(target: RECORDER_TARGET,
            "[RING] Saving {} buffered frames to {:?}", frames.len(), muxer.path());

        for frame in &frames {
            if let Err(e) = muxer.record_frame(frame.as_bytes()) {
                tracing::error!(target: RECORDER_TARGET,
                    "[RING] Snapshot write failed after {} of {} frames: {}",
                    muxer.frame_count(), frames.len(), e);
                return Err(muxer.end_after_failure(e));
            }
        }
        muxer.end()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CompressedFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
