//! RIFF/AVI container writing for Motion-JPEG streams.
//!
//! Layout produced by [`ContainerMuxer`]:
//!
//! ```text
//! RIFF <size> AVI
//!   LIST <size> hdrl
//!     avih <size> main header
//!     LIST <size> strl
//!       strh <size> stream header (vids / MJPG)
//!       strf <size> BITMAPINFOHEADER
//!   JUNK <size> 12 reserved bytes
//!   LIST <size> movi
//!     00dc <len> jpeg [pad]   (one per frame)
//!   idx1 <size> 16-byte records (one per frame)
//! ```
//!
//! Every `<size>` is written as a placeholder first and patched once the
//! enclosed bytes are known.

pub mod muxer;
pub mod scope;
#[cfg(test)]
pub(crate) mod capped;

pub use muxer::{ContainerMuxer, MuxOutput};
pub use scope::SizeScope;

use std::io::{self, Write};

pub type FourCc = [u8; 4];

pub const RIFF: FourCc = *b"RIFF";
pub const LIST: FourCc = *b"LIST";
pub const AVI: FourCc = *b"AVI ";
pub const HDRL: FourCc = *b"hdrl";
pub const AVIH: FourCc = *b"avih";
pub const STRL: FourCc = *b"strl";
pub const STRH: FourCc = *b"strh";
pub const STRF: FourCc = *b"strf";
pub const VIDS: FourCc = *b"vids";
pub const JUNK: FourCc = *b"JUNK";
pub const MOVI: FourCc = *b"movi";
pub const IDX1: FourCc = *b"idx1";
/// Compressed video data chunk of stream 0.
pub const FRAME_CHUNK: FourCc = *b"00dc";
/// Handler tag of the stream header; byte-reversed `MJPG` as legacy players expect.
pub const MJPEG_HANDLER: FourCc = *b"GPJM";
/// Compression tag of the stream format.
pub const MJPEG_COMPRESSION: FourCc = *b"MJPG";

/// `AVIIF_KEYFRAME` flag of an index record.
pub const KEYFRAME_FLAG: u32 = 0x10;
/// Size of one `idx1` record: tag, flags, offset, length.
pub const INDEX_RECORD_LEN: usize = 16;
/// Size of a chunk header: tag plus length.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Little-endian field writers for container structures.
pub(crate) trait WriteLe: Write {
    fn write_u16_le(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_i16_le(&mut self, value: i16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_u32_le(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_i64_le(&mut self, value: i64) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_fourcc(&mut self, tag: FourCc) -> io::Result<()> {
        self.write_all(&tag)
    }
}

impl<W: Write + ?Sized> WriteLe for W {}

/// Encode one `idx1` record.
pub fn index_record(offset: u32, length: u32) -> [u8; INDEX_RECORD_LEN] {
    let mut record = [0u8; INDEX_RECORD_LEN];
    record[0..4].copy_from_slice(&FRAME_CHUNK);
    record[4..8].copy_from_slice(&KEYFRAME_FLAG.to_le_bytes());
    record[8..12].copy_from_slice(&offset.to_le_bytes());
    record[12..16].copy_from_slice(&length.to_le_bytes());
    record
}
