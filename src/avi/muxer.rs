use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{
    index_record, SizeScope, WriteLe, AVI, AVIH, CHUNK_HEADER_LEN, FRAME_CHUNK, HDRL, IDX1,
    JUNK, LIST, MJPEG_COMPRESSION, MJPEG_HANDLER, MOVI, RIFF, STRF, STRH, STRL, VIDS,
};
use crate::errors::MuxError;
use crate::logging::RECORDER_TARGET;
use crate::shared::paths::temp_index_path;

/// Rough upper bound of JPEG bytes per pixel, used to pre-size the scratch buffer.
const JPEG_BYTES_PER_PIXEL: f64 = 8.25;
const JPEG_HEADER_RESERVE: usize = 1024;

/// Stream offsets of fields that are only known once the session ends.
struct DeferredFields {
    riff_size: u64,
    total_frames: u64,
    stream_length: u64,
    movi_size: u64,
}

/// Seekable destination of a container.
pub trait MuxOutput: Write + Seek {
    /// Push everything written so far to stable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MuxOutput for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl<T: MuxOutput + ?Sized> MuxOutput for Box<T> {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Summary of a finalized container.
#[derive(Debug, Clone)]
pub struct MuxSummary {
    pub path: PathBuf,
    pub frame_count: u32,
    pub file_len: u64,
}

/// Writes one Motion-JPEG AVI file.
///
/// The output and temporary index handles must only be touched by the
/// thread that owns the muxer. Index records are buffered in a side file
/// (`<path>.idx.tmp`) and appended by [`ContainerMuxer::end`], which
/// consumes the muxer: a failed finalize cannot be retried.
///
/// The container goes to a [`File`] at `path` unless another [`MuxOutput`]
/// is supplied through [`ContainerMuxer::begin_with`]; `path` still names
/// the temporary index in that case.
pub struct ContainerMuxer<W: MuxOutput = File> {
    path: PathBuf,
    index_path: PathBuf,
    file: BufWriter<W>,
    index: Option<BufWriter<File>>,
    deferred: DeferredFields,
    write_pos: u64,
    frame_count: u32,
    scratch: Vec<u8>,
    finalized: bool,
}

impl ContainerMuxer<File> {
    /// Create `path` and write everything up to the opening of the `movi` list.
    ///
    /// On failure neither the output file nor the temporary index is left behind.
    pub fn begin(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<Self, MuxError> {
        Self::begin_with(path, width, height, frame_rate, |path: &Path| File::create(path))
    }
}

impl<W: MuxOutput> ContainerMuxer<W> {
    /// Like [`ContainerMuxer::begin`], writing into the output `open_output`
    /// returns for `path`.
    pub fn begin_with<F>(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        frame_rate: u32,
        open_output: F,
    ) -> Result<Self, MuxError>
    where
        F: FnOnce(&Path) -> io::Result<W>,
    {
        let path = path.as_ref().to_path_buf();
        let index_path = temp_index_path(&path);

        let opened = open_output(&path)
            .and_then(|output| Self::open(output, &path, &index_path, width, height, frame_rate));
        match opened {
            Ok(muxer) => {
                tracing::info!(target: RECORDER_TARGET,
                    "[MUXER] Opened {:?}: {}x{} @ {}fps", path, width, height, frame_rate);
                Ok(muxer)
            }
            Err(e) => {
                tracing::error!(target: RECORDER_TARGET, "[MUXER] Failed to open {:?}: {}", path, e);
                remove_if_exists(&path);
                remove_if_exists(&index_path);
                Err(e.into())
            }
        }
    }

    fn open(
        output: W,
        path: &Path,
        index_path: &Path,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> io::Result<Self> {
        let mut file = BufWriter::new(output);
        let deferred = write_headers(&mut file, width, height, frame_rate)?;
        let write_pos = file.stream_position()?;
        let index = BufWriter::new(
            File::options()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(index_path)?,
        );

        let estimate = (width as f64 * height as f64 * JPEG_BYTES_PER_PIXEL) as usize;

        Ok(Self {
            path: path.to_path_buf(),
            index_path: index_path.to_path_buf(),
            file,
            index: Some(index),
            deferred,
            write_pos,
            frame_count: 0,
            scratch: Vec::with_capacity(estimate + JPEG_HEADER_RESERVE),
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Append one compressed frame as a `00dc` chunk and record it in the index.
    pub fn record_frame(&mut self, bytes: &[u8]) -> Result<(), MuxError> {
        let length = u32::try_from(bytes.len()).map_err(|_| MuxError::FrameTooLarge(bytes.len()))?;
        let padded = bytes.len() + bytes.len() % 2;
        let chunk_len = (CHUNK_HEADER_LEN + padded) as u64;

        let offset = u32::try_from(self.write_pos).map_err(|_| MuxError::FileTooLarge)?;
        if self.write_pos + chunk_len > u32::MAX as u64 {
            return Err(MuxError::FileTooLarge);
        }

        // Vec::clear keeps capacity, so the scratch buffer only ever grows.
        self.scratch.clear();
        self.scratch.reserve(CHUNK_HEADER_LEN + padded);
        self.scratch.extend_from_slice(&FRAME_CHUNK);
        self.scratch.extend_from_slice(&length.to_le_bytes());
        self.scratch.extend_from_slice(bytes);
        if bytes.len() % 2 == 1 {
            self.scratch.push(0);
        }

        self.file.write_all(&self.scratch)?;
        self.write_pos += chunk_len;

        let index = self.index_mut()?;
        index.write_all(&index_record(offset, length))?;

        self.frame_count += 1;
        if self.frame_count % 60 == 0 {
            tracing::debug!(target: RECORDER_TARGET, "[MUXER] Written {} frames", self.frame_count);
        }
        Ok(())
    }

    /// Patch every deferred field, append the index and close the file.
    pub fn end(mut self) -> Result<MuxSummary, MuxError> {
        let result = self.finalize();
        match &result {
            Ok(summary) => {
                self.finalized = true;
                tracing::info!(target: RECORDER_TARGET,
                    "[MUXER] AVI file saved: {:?} ({} frames, {} bytes)",
                    summary.path, summary.frame_count, summary.file_len);
            }
            Err(e) => {
                tracing::error!(target: RECORDER_TARGET,
                    "[MUXER] Finalize failed for {:?}, file may be unplayable: {}", self.path, e);
            }
        }
        result
    }

    /// Close the file after `record_frame` returned `failure`.
    ///
    /// Everything up to the last complete frame is finalized as far as the
    /// output still allows; `failure` is returned either way.
    pub fn end_after_failure(self, failure: MuxError) -> MuxError {
        let path = self.path.clone();
        let frames = self.frame_count;
        match self.end() {
            Ok(_) => tracing::warn!(target: RECORDER_TARGET,
                "[MUXER] Closed {:?} after a failed write, {} frames kept", path, frames),
            Err(e) => tracing::error!(target: RECORDER_TARGET,
                "[MUXER] Closing {:?} after a failed write also failed: {}", path, e),
        }
        failure
    }

    fn finalize(&mut self) -> Result<MuxSummary, MuxError> {
        // A failed write may have left part of a chunk behind; the index
        // starts right after the last complete one.
        let movi_end = self.write_pos;
        let movi_size = to_u32(movi_end - self.deferred.movi_size - 4)?;
        self.file.seek(SeekFrom::Start(self.deferred.movi_size))?;
        self.file.write_u32_le(movi_size)?;
        self.file.seek(SeekFrom::Start(self.deferred.stream_length))?;
        self.file.write_u32_le(self.frame_count)?;
        self.file.seek(SeekFrom::Start(movi_end))?;

        let mut index = self
            .index
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "index file already closed"))?;
        index.flush()?;
        {
            let index_file = index.get_mut();
            index_file.seek(SeekFrom::Start(0))?;

            let mut idx1 = SizeScope::chunk(&mut self.file, IDX1)?;
            io::copy(index_file, &mut idx1)?;
            idx1.finish()?;
        }
        drop(index);
        fs::remove_file(&self.index_path)?;

        let eof = self.file.stream_position()?;
        let riff_size = to_u32(eof - self.deferred.riff_size - 4)?;
        self.file.seek(SeekFrom::Start(self.deferred.riff_size))?;
        self.file.write_u32_le(riff_size)?;
        self.file.seek(SeekFrom::Start(self.deferred.total_frames))?;
        self.file.write_u32_le(self.frame_count)?;
        self.file.seek(SeekFrom::Start(eof))?;
        self.file.flush()?;
        self.file.get_mut().sync()?;

        Ok(MuxSummary {
            path: self.path.clone(),
            frame_count: self.frame_count,
            file_len: eof,
        })
    }

    fn index_mut(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.index
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "index file already closed"))
    }
}

impl<W: MuxOutput> Drop for ContainerMuxer<W> {
    fn drop(&mut self) {
        if !self.finalized {
            tracing::warn!(target: RECORDER_TARGET,
                "[MUXER] Dropped without finalize, {:?} is incomplete", self.path);
        }
        drop(self.index.take());
        remove_if_exists(&self.index_path);
    }
}

/// Write RIFF header, `hdrl` list and `JUNK`, then open the `movi` list.
fn write_headers<W: Write + Seek>(
    file: &mut W,
    width: u32,
    height: u32,
    frame_rate: u32,
) -> io::Result<DeferredFields> {
    file.write_fourcc(RIFF)?;
    let riff_size = file.stream_position()?;
    file.write_u32_le(0)?;
    file.write_fourcc(AVI)?;

    let total_frames;
    let stream_length;
    {
        let mut hdrl = SizeScope::list(&mut *file, HDRL)?;
        {
            let mut avih = SizeScope::chunk(&mut hdrl, AVIH)?;
            avih.write_u32_le(1_000_000 / frame_rate.max(1))?; // micro sec per frame
            avih.write_u32_le(0)?; // max bytes per sec
            avih.write_u32_le(0)?; // padding granularity
            avih.write_u32_le(0)?; // flags
            total_frames = avih.stream_position()?;
            avih.write_u32_le(0)?;
            avih.write_u32_le(0)?; // initial frames
            avih.write_u32_le(1)?; // streams
            avih.write_u32_le(0)?; // suggested buffer size
            avih.write_u32_le(width)?;
            avih.write_u32_le(height)?;
            avih.write_all(&[0u8; 16])?;
            avih.finish()?;
        }
        {
            let mut strl = SizeScope::list(&mut hdrl, STRL)?;
            {
                let mut strh = SizeScope::chunk(&mut strl, STRH)?;
                strh.write_fourcc(VIDS)?;
                strh.write_fourcc(MJPEG_HANDLER)?;
                strh.write_u32_le(0)?; // flags
                strh.write_u16_le(0)?; // priority
                strh.write_u16_le(0)?; // language
                strh.write_u32_le(0)?; // initial frames
                strh.write_u32_le(1)?; // scale
                strh.write_u32_le(frame_rate)?;
                strh.write_u32_le(0)?; // start
                stream_length = strh.stream_position()?;
                strh.write_u32_le(0)?;
                strh.write_u32_le(0)?; // suggested buffer size
                strh.write_u32_le(0)?; // quality
                strh.write_u32_le(0)?; // sample size
                strh.write_i16_le(0)?;
                strh.write_i16_le(0)?;
                strh.write_i16_le(width as i16)?;
                strh.write_i16_le(height as i16)?;
                strh.finish()?;
            }
            {
                let mut strf = SizeScope::chunk(&mut strl, STRF)?;
                strf.write_u32_le(40)?; // struct size
                strf.write_u32_le(width)?;
                strf.write_u32_le(height)?;
                strf.write_u16_le(1)?; // planes
                strf.write_u16_le(24)?; // bit count
                strf.write_fourcc(MJPEG_COMPRESSION)?;
                strf.write_u32_le(0)?; // size image
                strf.write_i64_le(0)?; // x pels per meter
                strf.write_i64_le(0)?; // y pels per meter
                strf.write_u32_le(0)?; // colors used
                strf.write_u32_le(0)?; // colors important
                strf.finish()?;
            }
            strl.finish()?;
        }
        hdrl.finish()?;
    }

    {
        let mut junk = SizeScope::chunk(&mut *file, JUNK)?;
        junk.write_all(&[0u8; 12])?;
        junk.finish()?;
    }

    file.write_fourcc(LIST)?;
    let movi_size = file.stream_position()?;
    file.write_u32_le(0)?;
    file.write_fourcc(MOVI)?;

    Ok(DeferredFields {
        riff_size,
        total_frames,
        stream_length,
        movi_size,
    })
}

fn to_u32(value: u64) -> Result<u32, MuxError> {
    u32::try_from(value).map_err(|_| MuxError::FileTooLarge)
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(target: RECORDER_TARGET, "[MUXER] Failed to delete {:?}: {}", path, e);
        }
    }
}
