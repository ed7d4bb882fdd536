//! Session lifecycle: `start_session`, `start_rolling_session`, `tick`,
//! `snapshot_rolling` and `stop_session`.
//!
//! The recorder owns the capture source, the capture pipeline and, in
//! continuous mode, the muxer. It runs on the host's thread and is driven by
//! the host calling [`ScreenRecorder::tick`] once per rendered frame. The only
//! other thread is the encoding worker, which talks to the recorder through
//! the intake queue and either the ring buffer or the hand-off channel.

pub mod state;

pub use state::{RecorderEvent, RecorderState, SessionMode, SideEffect};

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::avi::muxer::MuxSummary;
use crate::avi::{ContainerMuxer, MuxOutput};
use crate::capture::{CapturePipeline, CaptureSource, PollReport};
use crate::encoder::{Compressor, EncodingWorker, FrameSink, IntakeQueue, JpegCompressor};
use crate::errors::{MuxError, RecorderError};
use crate::logging::RECORDER_TARGET;
use crate::ring::RingBufferStore;
use crate::settings::RecorderSettings;
use crate::types::{CompressedFrame, FrameSize, RawImageBuffer};
use state::transition;

/// Parameters fixed for the lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub size: FrameSize,
    pub frame_rate: u32,
    pub quality: u8,
    /// Frames kept in rolling mode. Ignored by continuous sessions.
    pub ring_capacity: usize,
}

impl SessionOptions {
    /// Options for capturing a `source_width` x `source_height` viewport under `settings`.
    pub fn from_settings(settings: &RecorderSettings, source_width: u32, source_height: u32) -> Self {
        Self {
            size: FrameSize::fit_within(source_width, source_height, settings.max_dimension),
            frame_rate: settings.frame_rate,
            quality: settings.quality,
            ring_capacity: settings.ring_capacity,
        }
    }

    fn validate(&self, mode: SessionMode) -> Result<(), RecorderError> {
        if self.size.width == 0 || self.size.height == 0 {
            return Err(RecorderError::InvalidConfig(format!(
                "frame size {}x{} is empty",
                self.size.width, self.size.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(RecorderError::InvalidConfig("frame rate must be at least 1".to_string()));
        }
        if self.quality > 100 {
            return Err(RecorderError::InvalidConfig(format!(
                "quality must be 0-100, got {}",
                self.quality
            )));
        }
        if mode == SessionMode::Rolling && self.ring_capacity == 0 {
            return Err(RecorderError::InvalidConfig("ring capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub mode: SessionMode,
    /// Output file of a continuous session.
    pub output: Option<PathBuf>,
    /// Frames written to the output file, or buffered in the ring when a
    /// rolling session stopped.
    pub frames_recorded: u32,
    /// Frames lost to failed or malformed readbacks.
    pub frames_dropped: u64,
    /// Frames captured but never compressed because the session stopped first.
    pub frames_abandoned: u64,
    pub frames_encoded: u32,
    pub encode_failures: u32,
}

impl SessionSummary {
    fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            output: None,
            frames_recorded: 0,
            frames_dropped: 0,
            frames_abandoned: 0,
            frames_encoded: 0,
            encode_failures: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: &'static str,
    pub mode: Option<SessionMode>,
    pub elapsed_seconds: f64,
    pub frames_recorded: u32,
    pub ring_len: usize,
    /// Raw frames waiting for the encoding worker.
    pub pending_encode: usize,
    /// Encoded frames waiting to be written by the muxer.
    pub pending_handoff: usize,
    /// A write to the output file failed; later frames are being dropped.
    pub write_failed: bool,
}

/// Output a continuous session writes its container into.
type SessionFile = Box<dyn MuxOutput + Send>;

fn create_session_file(path: &Path) -> io::Result<SessionFile> {
    Ok(Box::new(File::create(path)?))
}

struct PendingStart {
    output: Option<PathBuf>,
    options: SessionOptions,
}

/// Continuous-mode output: the muxer plus the channel the worker feeds it through.
///
/// The hand-off channel is unbounded. A disk slower than the encoder makes it
/// grow; `status().pending_handoff` exposes the backlog.
struct FileOutput {
    muxer: ContainerMuxer<SessionFile>,
    handoff: Receiver<CompressedFrame>,
    failure: Option<MuxError>,
    lost_after_failure: u32,
    backlog_threshold: usize,
    backlog_warned: bool,
}

impl FileOutput {
    fn new(muxer: ContainerMuxer<SessionFile>, handoff: Receiver<CompressedFrame>, frame_rate: u32) -> Self {
        Self {
            muxer,
            handoff,
            failure: None,
            lost_after_failure: 0,
            backlog_threshold: frame_rate as usize * 2,
            backlog_warned: false,
        }
    }

    fn watch_backlog(&mut self) {
        let pending = self.handoff.len();
        if pending > self.backlog_threshold {
            if !self.backlog_warned {
                tracing::warn!(target: RECORDER_TARGET,
                    "[RECORDER] {} encoded frames waiting for the muxer", pending);
                self.backlog_warned = true;
            }
        } else {
            self.backlog_warned = false;
        }
    }

    fn drain(&mut self) {
        while let Ok(frame) = self.handoff.try_recv() {
            self.write(&frame);
        }
    }

    fn write(&mut self, frame: &CompressedFrame) {
        if self.failure.is_some() {
            self.lost_after_failure += 1;
            return;
        }
        if let Err(e) = self.muxer.record_frame(frame.as_bytes()) {
            tracing::error!(target: RECORDER_TARGET,
                "[RECORDER] Write to {:?} failed, dropping further frames: {}", self.muxer.path(), e);
            self.failure = Some(e);
        }
    }

    /// Write what the worker already encoded, then close the file.
    ///
    /// The file is closed even after a write failure so that whatever was
    /// written gets its sizes and index; the first failure is still reported.
    fn finish(mut self, summary: &mut SessionSummary) -> Result<MuxSummary, MuxError> {
        self.drain();
        summary.output = Some(self.muxer.path().to_path_buf());
        summary.frames_recorded = self.muxer.frame_count();

        match self.failure.take() {
            None => self.muxer.end(),
            Some(e) => {
                tracing::warn!(target: RECORDER_TARGET,
                    "[RECORDER] Closing output after a failed write, {} frames lost", self.lost_after_failure);
                Err(self.muxer.end_after_failure(e))
            }
        }
    }
}

enum SessionOutput {
    File(FileOutput),
    Ring(Arc<RingBufferStore>),
    Closed,
}

struct Session<R> {
    options: SessionOptions,
    pipeline: CapturePipeline<R>,
    intake: Arc<IntakeQueue<RawImageBuffer>>,
    worker: Option<EncodingWorker>,
    output: SessionOutput,
    summary: SessionSummary,
}

/// Drives one capture session at a time over a capture source.
pub struct ScreenRecorder<S: CaptureSource> {
    source: S,
    compressor: Arc<dyn Compressor>,
    state: RecorderState,
    session: Option<Session<S::Request>>,
    pending_start: Option<PendingStart>,
    last_summary: Option<SessionSummary>,
    open_output: fn(&Path) -> io::Result<SessionFile>,
}

impl<S: CaptureSource> ScreenRecorder<S> {
    pub fn new(source: S, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            source,
            compressor,
            state: RecorderState::Idle,
            session: None,
            pending_start: None,
            last_summary: None,
            open_output: create_session_file,
        }
    }

    pub fn with_jpeg(source: S) -> Self {
        Self::new(source, Arc::new(JpegCompressor))
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn session_options(&self) -> Option<SessionOptions> {
        self.session.as_ref().map(|s| s.options)
    }

    /// Summary of the most recently stopped session, whether or not stopping succeeded.
    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Start recording every frame into a new file at `path`.
    pub fn start_session(
        &mut self,
        path: impl AsRef<Path>,
        options: SessionOptions,
    ) -> Result<(), RecorderError> {
        self.start(SessionMode::Continuous, Some(path.as_ref().to_path_buf()), options)
    }

    /// Start keeping the newest `options.ring_capacity` frames in memory.
    pub fn start_rolling_session(&mut self, options: SessionOptions) -> Result<(), RecorderError> {
        self.start(SessionMode::Rolling, None, options)
    }

    fn start(
        &mut self,
        mode: SessionMode,
        output: Option<PathBuf>,
        options: SessionOptions,
    ) -> Result<(), RecorderError> {
        if self.state.is_active() {
            tracing::warn!(target: RECORDER_TARGET, "[RECORDER] Start rejected, a session is already {}", self.state.name());
            return Err(RecorderError::AlreadyActive);
        }
        if !self.source.supports_async_readback() {
            tracing::error!(target: RECORDER_TARGET, "[RECORDER] Capture source has no asynchronous readback");
            return Err(RecorderError::UnsupportedBackend);
        }
        options.validate(mode)?;

        self.pending_start = Some(PendingStart { output, options });
        if let Err(e) = self.apply(RecorderEvent::StartRequested { mode }) {
            tracing::error!(target: RECORDER_TARGET, "[RECORDER] Failed to start {:?} session: {}", mode, e);
            self.pending_start = None;
            let _ = self.apply(RecorderEvent::StartFailed);
            return Err(e);
        }

        tracing::info!(target: RECORDER_TARGET,
            "[RECORDER] {:?} session started: {}x{} @ {}fps, quality {}",
            mode, options.size.width, options.size.height, options.frame_rate, options.quality);
        Ok(())
    }

    /// Issue this frame's readback, forward finished readbacks to the encoder
    /// and, in continuous mode, write out frames the encoder has finished.
    ///
    /// Never blocks on the capture source. Per-frame failures are logged and
    /// counted, not returned.
    pub fn tick(&mut self) -> Result<PollReport, RecorderError> {
        if !matches!(self.state, RecorderState::Active { .. }) {
            return Err(RecorderError::NotActive);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(RecorderError::NotActive);
        };

        session.pipeline.submit(&mut self.source);
        let report = session.pipeline.poll_completed(&session.intake);

        if let SessionOutput::File(file) = &mut session.output {
            file.watch_backlog();
            file.drain();
        }

        Ok(report)
    }

    /// Save the frames currently held by a rolling session to `path`.
    ///
    /// Capture keeps running and the ring is left untouched.
    pub fn snapshot_rolling(&self, path: impl AsRef<Path>) -> Result<MuxSummary, RecorderError> {
        let session = match (&self.state, self.session.as_ref()) {
            (RecorderState::Active { .. }, Some(session)) => session,
            _ => return Err(RecorderError::NotActive),
        };
        let SessionOutput::Ring(ring) = &session.output else {
            return Err(RecorderError::NotRolling);
        };

        let size = session.options.size;
        let summary = ring.drain_to(path, size.width, size.height, session.options.frame_rate)?;
        tracing::info!(target: RECORDER_TARGET,
            "[RECORDER] Snapshot saved to {:?} ({} frames)", summary.path, summary.frame_count);
        Ok(summary)
    }

    /// Stop the worker, close the output and release every buffer.
    ///
    /// In continuous mode the file is closed even when a write failed earlier;
    /// the failure is then returned and the file may not be playable. The
    /// session's summary stays available from [`ScreenRecorder::last_summary`].
    pub fn stop_session(&mut self) -> Result<SessionSummary, RecorderError> {
        if !matches!(self.state, RecorderState::Active { .. }) {
            return Err(RecorderError::NotActive);
        }

        let stopped = self.apply(RecorderEvent::StopRequested);
        let released = self.apply(RecorderEvent::Finalized);
        stopped.and(released)?;

        let summary = self.last_summary.clone().ok_or(RecorderError::NotActive)?;
        tracing::info!(target: RECORDER_TARGET,
            "[RECORDER] {:?} session stopped: recorded={}, encoded={}, dropped={}, abandoned={}",
            summary.mode, summary.frames_recorded, summary.frames_encoded,
            summary.frames_dropped, summary.frames_abandoned);
        Ok(summary)
    }

    pub fn status(&self) -> RecorderStatus {
        let mut status = RecorderStatus {
            state: self.state.name(),
            mode: self.state.mode(),
            elapsed_seconds: self.state.elapsed().map_or(0.0, |d| d.as_secs_f64()),
            frames_recorded: 0,
            ring_len: 0,
            pending_encode: 0,
            pending_handoff: 0,
            write_failed: false,
        };

        if let Some(session) = self.session.as_ref() {
            status.pending_encode = session.intake.len();
            match &session.output {
                SessionOutput::File(file) => {
                    status.frames_recorded = file.muxer.frame_count();
                    status.pending_handoff = file.handoff.len();
                    status.write_failed = file.failure.is_some();
                }
                SessionOutput::Ring(ring) => status.ring_len = ring.len(),
                SessionOutput::Closed => {}
            }
        }

        status
    }

    /// Run a transition and its effects. Every effect runs even if an earlier
    /// one failed; the first error is returned.
    fn apply(&mut self, event: RecorderEvent) -> Result<(), RecorderError> {
        let (new_state, effects) = transition(self.state.clone(), event);
        self.state = new_state;

        let mut first_error = None;
        for effect in effects {
            if let Err(e) = self.execute_effect(effect) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn execute_effect(&mut self, effect: SideEffect) -> Result<(), RecorderError> {
        match effect {
            SideEffect::OpenSession { mode } => self.open_session(mode),
            SideEffect::SignalStop => self.signal_stop(),
            SideEffect::FinalizeOutput => self.finalize_output(),
            SideEffect::ReleaseResources => {
                self.release_resources();
                Ok(())
            }
        }
    }

    fn open_session(&mut self, mode: SessionMode) -> Result<(), RecorderError> {
        let PendingStart { output, options } = self
            .pending_start
            .take()
            .ok_or_else(|| RecorderError::InvalidConfig("no session options".to_string()))?;

        let (output, sink) = match (mode, output) {
            (SessionMode::Continuous, Some(path)) => {
                let muxer = ContainerMuxer::begin_with(
                    &path,
                    options.size.width,
                    options.size.height,
                    options.frame_rate,
                    self.open_output,
                )?;
                let (tx, rx) = crossbeam_channel::unbounded();
                (
                    SessionOutput::File(FileOutput::new(muxer, rx, options.frame_rate)),
                    FrameSink::Handoff(tx),
                )
            }
            (SessionMode::Continuous, None) => {
                return Err(RecorderError::InvalidConfig(
                    "continuous session needs an output path".to_string(),
                ));
            }
            (SessionMode::Rolling, _) => {
                let ring = Arc::new(RingBufferStore::new(options.ring_capacity));
                (SessionOutput::Ring(Arc::clone(&ring)), FrameSink::Ring(ring))
            }
        };

        let pipeline = CapturePipeline::new(
            options.size,
            self.source.row_order(),
            self.compressor.row_order(),
        );
        let intake = Arc::new(IntakeQueue::new());
        let worker = EncodingWorker::spawn(
            Arc::clone(&intake),
            Arc::clone(&self.compressor),
            options.quality,
            sink,
        );

        self.session = Some(Session {
            options,
            pipeline,
            intake,
            worker: Some(worker),
            output,
            summary: SessionSummary::new(mode),
        });
        Ok(())
    }

    fn signal_stop(&mut self) -> Result<(), RecorderError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(worker) = session.worker.take() else {
            return Ok(());
        };

        tracing::debug!(target: RECORDER_TARGET, "[RECORDER] Waiting for encoding worker...");
        let stats = worker.stop()?;
        session.summary.frames_encoded = stats.frames_encoded;
        session.summary.encode_failures = stats.encode_failures;
        session.summary.frames_abandoned += u64::from(stats.discarded);
        Ok(())
    }

    fn finalize_output(&mut self) -> Result<(), RecorderError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        match std::mem::replace(&mut session.output, SessionOutput::Closed) {
            SessionOutput::File(file) => {
                file.finish(&mut session.summary)?;
            }
            SessionOutput::Ring(ring) => {
                session.summary.frames_recorded = ring.len() as u32;
                ring.clear();
            }
            SessionOutput::Closed => {}
        }
        Ok(())
    }

    fn release_resources(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Some(worker) = session.worker.take() {
            if let Err(e) = worker.stop() {
                tracing::error!(target: RECORDER_TARGET, "[RECORDER] Worker failed during cleanup: {}", e);
            }
        }

        let abandoned = session.pipeline.release() + session.intake.clear();
        session.summary.frames_abandoned += abandoned as u64;
        session.summary.frames_dropped = session.pipeline.stats().dropped;

        tracing::debug!(target: RECORDER_TARGET, "[RECORDER] Session resources released");
        self.last_summary = Some(session.summary);
    }
}

impl<S: CaptureSource> Drop for ScreenRecorder<S> {
    fn drop(&mut self) {
        if matches!(self.state, RecorderState::Active { .. }) {
            tracing::warn!(target: RECORDER_TARGET, "[RECORDER] Dropped with an active session, stopping it");
            if let Err(e) = self.stop_session() {
                tracing::error!(target: RECORDER_TARGET, "[RECORDER] Failed to stop session on drop: {}", e);
            }
        }
    }
}
