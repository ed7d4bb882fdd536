//! Background compression loop.
//!
//! One worker thread per session drains the intake queue, compresses each raw
//! buffer and routes the result either into the rolling ring buffer or back to
//! the thread that owns the muxer. Cancellation is cooperative: the stop flag
//! is checked at the top of the loop and again before a dequeued buffer is
//! compressed, so a compression in progress always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::{Compressor, IntakeQueue};
use crate::errors::RecorderError;
use crate::logging::RECORDER_TARGET;
use crate::ring::RingBufferStore;
use crate::types::{CompressedFrame, RawImageBuffer};

/// Sleep between polls of an empty intake queue.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Where compressed frames go.
#[derive(Clone)]
pub enum FrameSink {
    /// Rolling mode: keep the newest frames in memory.
    Ring(Arc<RingBufferStore>),
    /// Continuous mode: hand frames to the muxer-owning thread.
    Handoff(Sender<CompressedFrame>),
}

/// Counters reported by the worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_encoded: u32,
    pub encode_failures: u32,
    /// Buffers dequeued after the stop flag was raised and dropped uncompressed.
    pub discarded: u32,
}

/// Handle to a running encoding worker thread.
pub struct EncodingWorker {
    stop_signal: Arc<AtomicBool>,
    handle: JoinHandle<WorkerStats>,
}

impl EncodingWorker {
    pub fn spawn(
        intake: Arc<IntakeQueue<RawImageBuffer>>,
        compressor: Arc<dyn Compressor>,
        quality: u8,
        sink: FrameSink,
    ) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_worker = Arc::clone(&stop_signal);

        let handle = std::thread::spawn(move || {
            run_encode_loop(&intake, compressor.as_ref(), quality, &sink, &stop_signal_worker)
        });

        Self {
            stop_signal,
            handle,
        }
    }

    /// Returns true once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Raise the stop flag and wait for the current unit of work to finish.
    pub fn stop(self) -> Result<WorkerStats, RecorderError> {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.handle.join().map_err(|_| {
            tracing::error!(target: RECORDER_TARGET, "[ENCODER] Worker thread panicked");
            RecorderError::WorkerPanicked
        })
    }
}

fn run_encode_loop(
    intake: &IntakeQueue<RawImageBuffer>,
    compressor: &dyn Compressor,
    quality: u8,
    sink: &FrameSink,
    stop_signal: &AtomicBool,
) -> WorkerStats {
    tracing::debug!(target: RECORDER_TARGET, "[ENCODER] Worker started (quality={})", quality);
    let mut stats = WorkerStats::default();

    loop {
        if stop_signal.load(Ordering::SeqCst) {
            break;
        }

        let Some(raw) = intake.pop() else {
            std::thread::sleep(IDLE_BACKOFF);
            continue;
        };

        if stop_signal.load(Ordering::SeqCst) {
            stats.discarded += 1;
            break;
        }

        let data = match compressor.compress(&raw, quality) {
            Ok(data) => data,
            Err(e) => {
                stats.encode_failures += 1;
                tracing::warn!(target: RECORDER_TARGET, "[ENCODER] Dropping frame, compression failed: {}", e);
                continue;
            }
        };
        drop(raw);

        let frame = CompressedFrame::new(data);
        match sink {
            FrameSink::Ring(ring) => {
                ring.push(frame);
            }
            FrameSink::Handoff(sender) => {
                if sender.send(frame).is_err() {
                    tracing::warn!(target: RECORDER_TARGET, "[ENCODER] Muxer hand-off closed, stopping worker");
                    break;
                }
            }
        }

        stats.frames_encoded += 1;
        if stats.frames_encoded % 60 == 0 {
            tracing::debug!(target: RECORDER_TARGET, "[ENCODER] Encoded {} frames", stats.frames_encoded);
        }
    }

    tracing::debug!(target: RECORDER_TARGET,
        "[ENCODER] Worker exiting: encoded={}, failures={}, discarded={}",
        stats.frames_encoded, stats.encode_failures, stats.discarded);
    stats
}
