use std::io::{self, Seek, SeekFrom, Write};

use super::{FourCc, WriteLe, LIST};
use crate::logging::RECORDER_TARGET;

/// RAII guard for a length-prefixed region whose size is not known up front.
///
/// Opening writes a 4-byte placeholder and remembers where the payload
/// starts. Closing flushes, measures the bytes written since, seeks back to
/// patch the placeholder and returns the cursor to the end of the payload.
///
/// Close explicitly with [`SizeScope::finish`] to observe I/O errors. If the
/// scope is dropped instead (early return, `?`, panic unwind) the size is
/// still patched on a best-effort basis. Either way it is patched once.
///
/// Scopes nest: a scope is itself `Write + Seek`, so a child scope can be
/// opened on `&mut parent`.
pub struct SizeScope<W: Write + Seek> {
    inner: W,
    data_start: u64,
    closed: bool,
}

impl<W: Write + Seek> SizeScope<W> {
    /// Open a bare size field at the current position.
    pub fn open(mut inner: W) -> io::Result<Self> {
        inner.write_u32_le(0)?;
        let data_start = inner.stream_position()?;
        Ok(Self {
            inner,
            data_start,
            closed: false,
        })
    }

    /// Open a chunk: `tag`, then the deferred size.
    pub fn chunk(mut inner: W, tag: FourCc) -> io::Result<Self> {
        inner.write_fourcc(tag)?;
        Self::open(inner)
    }

    /// Open a list: `LIST`, the deferred size, then `list_type`.
    ///
    /// The list type is counted in the size, as RIFF requires.
    pub fn list(mut inner: W, list_type: FourCc) -> io::Result<Self> {
        inner.write_fourcc(LIST)?;
        let mut scope = Self::open(inner)?;
        scope.inner.write_fourcc(list_type)?;
        Ok(scope)
    }

    /// Stream offset of the first payload byte.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Patch the size field and return the patched value.
    pub fn finish(mut self) -> io::Result<u32> {
        self.close()
    }

    fn close(&mut self) -> io::Result<u32> {
        self.closed = true;
        self.inner.flush()?;

        let end = self.inner.stream_position()?;
        let size = u32::try_from(end - self.data_start).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "scoped region exceeds 4 GiB")
        })?;

        self.inner.seek(SeekFrom::Start(self.data_start - 4))?;
        self.inner.write_u32_le(size)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(size)
    }
}

impl<W: Write + Seek> Write for SizeScope<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Seek> Seek for SizeScope<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<W: Write + Seek> Drop for SizeScope<W> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.close() {
            tracing::error!(target: RECORDER_TARGET, "[MUXER] Failed to patch size at offset {}: {}", self.data_start - 4, e);
        }
    }
}
