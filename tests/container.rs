//! Integration tests for the AVI container writer.
//!
//! Files are written through the public muxer API and read back with the
//! chunk walker in `common`, which checks that every declared size matches
//! the bytes actually present.

mod common;

use std::io::{Cursor, Seek, SeekFrom, Write};

use common::AviFile;
use mjpeg_recorder_lib::avi::KEYFRAME_FLAG;
use mjpeg_recorder_lib::shared::paths::temp_index_path;
use mjpeg_recorder_lib::{ContainerMuxer, SizeScope};

fn payload(length: usize, seed: u8) -> Vec<u8> {
    (0..length).map(|i| seed.wrapping_add(i as u8)).collect()
}

fn write_file(frames: &[Vec<u8>]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.avi");
    let mut muxer = ContainerMuxer::begin(&path, 160, 90, 30).unwrap();
    for frame in frames {
        muxer.record_frame(frame).unwrap();
    }
    muxer.end().unwrap();
    (dir, path)
}

// =============================================================================
// Frame counts and sizes
// =============================================================================

#[test]
fn test_frame_count_matches_index_records() {
    for count in [0usize, 1, 2, 17] {
        let frames: Vec<Vec<u8>> = (0..count).map(|i| payload(10 + i, i as u8)).collect();
        let (_dir, path) = write_file(&frames);
        let avi = AviFile::read(&path);

        assert_eq!(avi.total_frames as usize, count);
        assert_eq!(avi.stream_length as usize, count);
        assert_eq!(avi.index.len(), count);
        assert_eq!(avi.frames.len(), count);
    }
}

#[test]
fn test_riff_size_is_file_length_minus_eight() {
    let frames = vec![payload(33, 1), payload(64, 2), payload(7, 3)];
    let (_dir, path) = write_file(&frames);
    let file_len = std::fs::metadata(&path).unwrap().len();
    let avi = AviFile::read(&path);

    assert_eq!(avi.riff_size as u64, file_len - 8);
}

#[test]
fn test_movi_size_ends_where_index_starts() {
    let frames = vec![payload(12, 1), payload(13, 2)];
    let (_dir, path) = write_file(&frames);
    let avi = AviFile::read(&path);

    let expected = avi.idx1_offset - avi.movi_offset - 8;
    assert_eq!(avi.movi_size as usize, expected);
    // Size counts from the end of the size field, i.e. start offset + 4.
    assert_eq!(avi.movi_size as usize, avi.idx1_offset - (avi.movi_offset + 4) - 4);
}

#[test]
fn test_known_frame_lengths_scenario() {
    let lengths = [100usize, 101, 50, 200, 99];
    let frames: Vec<Vec<u8>> = lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| payload(len, i as u8))
        .collect();
    let (_dir, path) = write_file(&frames);
    let avi = AviFile::read(&path);

    let payload_bytes: usize = lengths.iter().sum();
    let pad_bytes = 2; // 101 and 99
    let header_bytes = 5 * 8;
    let frame_data = payload_bytes + pad_bytes + header_bytes;

    assert_eq!(avi.movi_size as usize, 4 + frame_data);
    assert_eq!(avi.index.len(), 5);
    assert_eq!(avi.total_frames, 5);
    assert_eq!(avi.micros_per_frame, 1_000_000 / 30);
    assert_eq!(avi.rate, 30);
    assert_eq!((avi.width, avi.height), (160, 90));
    assert_eq!(&avi.compression, b"MJPG");
}

// =============================================================================
// Index contents
// =============================================================================

#[test]
fn test_index_points_at_frame_chunks() {
    let frames = vec![payload(9, 10), payload(20, 20), payload(1, 30)];
    let (_dir, path) = write_file(&frames);
    let avi = AviFile::read(&path);

    for (entry, chunk) in avi.index.iter().zip(&avi.frames) {
        assert_eq!(&entry.tag, b"00dc");
        assert_eq!(entry.flags & KEYFRAME_FLAG, KEYFRAME_FLAG);
        assert_eq!(entry.offset, chunk.offset);
        assert_eq!(entry.length as usize, chunk.payload.len());
    }
    assert_eq!(avi.frames_via_index(), frames);
}

#[test]
fn test_odd_frames_keep_chunks_word_aligned() {
    let frames = vec![payload(3, 0), payload(5, 0), payload(4, 0)];
    let (_dir, path) = write_file(&frames);
    let avi = AviFile::read(&path);

    for chunk in &avi.frames {
        assert_eq!(chunk.offset % 2, 0);
    }
    assert_eq!(avi.idx1_offset % 2, 0);
}

#[test]
fn test_temp_index_is_removed_after_end() {
    let (_dir, path) = write_file(&[payload(8, 0)]);
    assert!(path.exists());
    assert!(!temp_index_path(&path).exists());
}

#[test]
fn test_empty_frame_is_recorded() {
    let (_dir, path) = write_file(&[Vec::new(), payload(2, 0)]);
    let avi = AviFile::read(&path);

    assert_eq!(avi.index[0].length, 0);
    assert_eq!(avi.frames_via_index()[1], payload(2, 0));
}

// =============================================================================
// SizeScope
// =============================================================================

#[test]
fn test_nested_scopes_patch_every_size() {
    let mut out = Cursor::new(Vec::new());
    {
        let mut list = SizeScope::list(&mut out, *b"test").unwrap();
        {
            let mut inner = SizeScope::chunk(&mut list, *b"abcd").unwrap();
            inner.write_all(&[1, 2, 3, 4, 5, 6]).unwrap();
            assert_eq!(inner.finish().unwrap(), 6);
        }
        list.write_all(b"tail").unwrap();
    }
    let bytes = out.into_inner();

    assert_eq!(&bytes[0..4], b"LIST");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 4 + 8 + 6 + 4);
    assert_eq!(&bytes[12..16], b"abcd");
    assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 6);
}

#[test]
fn test_scope_patched_on_early_return() {
    fn write_then_fail(out: &mut Cursor<Vec<u8>>) -> std::io::Result<()> {
        let mut chunk = SizeScope::chunk(out, *b"fail")?;
        chunk.write_all(&[9; 10])?;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
    }

    let mut out = Cursor::new(Vec::new());
    assert!(write_then_fail(&mut out).is_err());

    assert_eq!(out.stream_position().unwrap(), 18);
    let bytes = out.into_inner();
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 10);
}

#[test]
fn test_scope_restores_cursor_to_end() {
    let mut out = Cursor::new(Vec::new());
    out.write_all(b"prefix").unwrap();
    {
        let mut chunk = SizeScope::chunk(&mut out, *b"data").unwrap();
        chunk.write_all(&[0; 5]).unwrap();
        chunk.finish().unwrap();
    }
    assert_eq!(out.seek(SeekFrom::Current(0)).unwrap(), 6 + 8 + 5);
}
