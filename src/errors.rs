use thiserror::Error;

/// Errors from the capture side of the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Readback failed: {0}")]
    Readback(String),
    #[error("Readback returned {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
}

/// Errors from the still-image compressor.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Raw buffer has {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Errors from writing the AVI container.
///
/// None of these are retried. A muxer that returned one of them may have
/// produced an unplayable file.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Container I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Container would exceed the 4 GiB limit of 32-bit offsets")]
    FileTooLarge,
    #[error("Frame of {0} bytes does not fit a 32-bit chunk length")]
    FrameTooLarge(usize),
}

/// Top-level error type for recorder operations.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("A capture session is already active")]
    AlreadyActive,
    #[error("No capture session is active")]
    NotActive,
    #[error("The active session is not a rolling session")]
    NotRolling,
    #[error("Capture source does not support asynchronous readback")]
    UnsupportedBackend,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error("Encoding worker panicked")]
    WorkerPanicked,
}

impl RecorderError {
    /// Returns true if the error left a possibly incomplete file on disk.
    pub fn is_output_suspect(&self) -> bool {
        matches!(self, RecorderError::Mux(_))
    }
}
