pub mod avi;
pub mod capture;
pub mod encoder;
pub mod errors;
pub mod logging;
pub mod recorder;
pub mod ring;
pub mod settings;
pub mod shared;
pub mod types;

pub use avi::{ContainerMuxer, MuxOutput, SizeScope};
pub use capture::{BufferPool, CapturePipeline, CaptureSource, ReadbackPoll, ReadbackRequest};
pub use encoder::{Compressor, EncodingWorker, IntakeQueue, JpegCompressor};
pub use errors::{CaptureError, EncodeError, MuxError, RecorderError};
pub use recorder::{
    RecorderState, RecorderStatus, ScreenRecorder, SessionMode, SessionOptions, SessionSummary,
};
pub use ring::RingBufferStore;
pub use settings::RecorderSettings;
pub use types::{CompressedFrame, FrameSize, RawImageBuffer, RowOrder};
