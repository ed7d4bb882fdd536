use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use super::MuxOutput;

/// File that cannot grow past `limit` bytes, like a full disk.
///
/// Writes below the limit succeed, including overwrites of earlier bytes.
/// A write crossing the limit is cut short there and the next one fails.
pub(crate) struct CappedFile {
    file: File,
    limit: u64,
}

impl CappedFile {
    pub(crate) fn create(path: &Path, limit: u64) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            limit,
        })
    }
}

impl Write for CappedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pos = self.file.stream_position()?;
        if pos >= self.limit && !buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::Other, "file size limit exceeded"));
        }
        let room = (self.limit - pos.min(self.limit)).min(buf.len() as u64) as usize;
        self.file.write(&buf[..room])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for CappedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl MuxOutput for CappedFile {}
