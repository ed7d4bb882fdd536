//! Shared helpers for integration tests: an AVI reader that walks the written
//! chunk tree, a scripted capture source and a compressor that tags frames.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;

use mjpeg_recorder_lib::capture::{OffscreenTarget, ReadbackPoll, ReadbackRequest};
use mjpeg_recorder_lib::errors::EncodeError;
use mjpeg_recorder_lib::{CaptureSource, Compressor, RawImageBuffer, RowOrder};

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn tag_at(bytes: &[u8], offset: usize) -> [u8; 4] {
    bytes[offset..offset + 4].try_into().unwrap()
}

/// One `00dc` chunk found inside the `movi` list.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameChunk {
    pub offset: u32,
    pub payload: Vec<u8>,
}

/// One 16-byte record of the `idx1` chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub tag: [u8; 4],
    pub flags: u32,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug)]
pub struct AviFile {
    pub bytes: Vec<u8>,
    pub riff_size: u32,
    pub micros_per_frame: u32,
    pub total_frames: u32,
    pub width: u32,
    pub height: u32,
    pub rate: u32,
    pub stream_length: u32,
    pub compression: [u8; 4],
    /// Offset of the `LIST` tag that opens `movi`.
    pub movi_offset: usize,
    pub movi_size: u32,
    pub idx1_offset: usize,
    pub frames: Vec<FrameChunk>,
    pub index: Vec<IndexEntry>,
}

impl AviFile {
    pub fn read(path: &Path) -> Self {
        Self::parse(std::fs::read(path).expect("read avi file"))
    }

    pub fn parse(bytes: Vec<u8>) -> Self {
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");

        let mut avi = AviFile {
            riff_size: u32_at(&bytes, 4),
            micros_per_frame: 0,
            total_frames: 0,
            width: 0,
            height: 0,
            rate: 0,
            stream_length: 0,
            compression: [0; 4],
            movi_offset: 0,
            movi_size: 0,
            idx1_offset: 0,
            frames: Vec::new(),
            index: Vec::new(),
            bytes: Vec::new(),
        };

        let mut pos = 12;
        while pos + 8 <= bytes.len() {
            let tag = tag_at(&bytes, pos);
            let size = u32_at(&bytes, pos + 4) as usize;
            match &tag {
                b"LIST" => match &tag_at(&bytes, pos + 8) {
                    b"hdrl" => avi.parse_hdrl(&bytes, pos + 12, pos + 8 + size),
                    b"movi" => {
                        avi.movi_offset = pos;
                        avi.movi_size = size as u32;
                        avi.parse_movi(&bytes, pos + 12, pos + 8 + size);
                    }
                    other => panic!("unexpected list {:?}", other),
                },
                b"idx1" => {
                    avi.idx1_offset = pos;
                    avi.parse_idx1(&bytes, pos + 8, size);
                }
                b"JUNK" => assert_eq!(size, 12),
                other => panic!("unexpected chunk {:?} at {}", other, pos),
            }
            pos += 8 + size + size % 2;
        }
        assert_eq!(pos, bytes.len(), "trailing bytes after last chunk");

        avi.bytes = bytes;
        avi
    }

    fn parse_hdrl(&mut self, bytes: &[u8], start: usize, end: usize) {
        let mut pos = start;
        while pos < end {
            let tag = tag_at(bytes, pos);
            let size = u32_at(bytes, pos + 4) as usize;
            let data = pos + 8;
            match &tag {
                b"avih" => {
                    self.micros_per_frame = u32_at(bytes, data);
                    self.total_frames = u32_at(bytes, data + 16);
                    assert_eq!(u32_at(bytes, data + 24), 1, "stream count");
                    self.width = u32_at(bytes, data + 32);
                    self.height = u32_at(bytes, data + 36);
                }
                b"LIST" => {
                    assert_eq!(&tag_at(bytes, data), b"strl");
                    self.parse_hdrl(bytes, data + 4, data + size);
                }
                b"strh" => {
                    assert_eq!(&tag_at(bytes, data), b"vids");
                    assert_eq!(u32_at(bytes, data + 20), 1, "scale");
                    self.rate = u32_at(bytes, data + 24);
                    self.stream_length = u32_at(bytes, data + 32);
                }
                b"strf" => {
                    assert_eq!(u32_at(bytes, data), 40, "struct size");
                    self.compression = tag_at(bytes, data + 16);
                }
                other => panic!("unexpected header chunk {:?}", other),
            }
            pos = data + size + size % 2;
        }
        assert_eq!(pos, end, "header list size mismatch");
    }

    fn parse_movi(&mut self, bytes: &[u8], start: usize, end: usize) {
        let mut pos = start;
        while pos < end {
            assert_eq!(&tag_at(bytes, pos), b"00dc");
            let length = u32_at(bytes, pos + 4) as usize;
            self.frames.push(FrameChunk {
                offset: pos as u32,
                payload: bytes[pos + 8..pos + 8 + length].to_vec(),
            });
            if length % 2 == 1 {
                assert_eq!(bytes[pos + 8 + length], 0, "pad byte must be zero");
            }
            pos += 8 + length + length % 2;
        }
        assert_eq!(pos, end, "movi size mismatch");
    }

    fn parse_idx1(&mut self, bytes: &[u8], start: usize, size: usize) {
        assert_eq!(size % 16, 0);
        for record in bytes[start..start + size].chunks_exact(16) {
            self.index.push(IndexEntry {
                tag: tag_at(record, 0),
                flags: u32_at(record, 4),
                offset: u32_at(record, 8),
                length: u32_at(record, 12),
            });
        }
    }

    /// Frame payloads in index order, read through the index offsets.
    pub fn frames_via_index(&self) -> Vec<Vec<u8>> {
        self.index
            .iter()
            .map(|entry| {
                let start = entry.offset as usize + 8;
                assert_eq!(u32_at(&self.bytes, entry.offset as usize + 4), entry.length);
                self.bytes[start..start + entry.length as usize].to_vec()
            })
            .collect()
    }
}

/// Emits `[first pixel byte, 0xD9]` so tests can tell frames apart.
pub struct TagCompressor;

impl Compressor for TagCompressor {
    fn compress(&self, image: &RawImageBuffer, _quality: u8) -> Result<Vec<u8>, EncodeError> {
        Ok(vec![image.pixels[0], 0xD9])
    }
}

/// Capture source that fills frame `n` with byte `n` and fails chosen readbacks.
pub struct ScriptedSource {
    next: u8,
    failing: HashSet<u8>,
    pub order: RowOrder,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            next: 0,
            failing: HashSet::new(),
            order: RowOrder::TopFirst,
        }
    }

    pub fn failing(frames: &[u8]) -> Self {
        Self {
            failing: frames.iter().copied().collect(),
            ..Self::new()
        }
    }
}

pub struct ScriptedReadback {
    outcome: Option<ReadbackPoll>,
}

impl ReadbackRequest for ScriptedReadback {
    fn poll(&mut self) -> ReadbackPoll {
        self.outcome
            .take()
            .unwrap_or_else(|| ReadbackPoll::Failed("polled twice".to_string()))
    }
}

impl CaptureSource for ScriptedSource {
    type Request = ScriptedReadback;

    fn supports_async_readback(&self) -> bool {
        true
    }

    fn row_order(&self) -> RowOrder {
        self.order
    }

    fn request_readback(&mut self, target: &mut OffscreenTarget) -> ScriptedReadback {
        let frame = self.next;
        self.next = self.next.wrapping_add(1);

        let outcome = if self.failing.contains(&frame) {
            ReadbackPoll::Failed(format!("frame {} lost", frame))
        } else {
            target.pixels_mut().fill(frame);
            ReadbackPoll::Ready(target.pixels().to_vec())
        };
        ScriptedReadback {
            outcome: Some(outcome),
        }
    }
}
