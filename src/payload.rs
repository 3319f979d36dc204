//! Payload handoff through a named shared-memory region.
//!
//! Some frames carry nothing but a decimal byte count. The emulator has
//! already written that many bytes into a named region; this module reads
//! them back in one bounded read.

use crate::bridge::frame::{Frame, TERMINATOR_BYTE};
use bytes::Bytes;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("frame is not a payload length: {0:?}")]
    InvalidLength(String),

    #[error("frame is incomplete")]
    Incomplete,

    #[error("invalid region name '{0}'")]
    InvalidName(String),

    #[error("failed to read region '{name}': {source}")]
    Read { name: String, source: io::Error },

    #[error("region '{name}' holds {available} bytes, expected {expected}")]
    Short {
        name: String,
        available: usize,
        expected: usize,
    },
}

/// Interpret a frame as an ASCII decimal length.
///
/// Surrounding whitespace and a trailing terminator byte are ignored.
pub fn parse_length(bytes: &[u8]) -> Result<usize, PayloadError> {
    let bytes = bytes.strip_suffix(&[TERMINATOR_BYTE]).unwrap_or(bytes);
    let invalid = || PayloadError::InvalidLength(String::from_utf8_lossy(bytes).into_owned());

    std::str::from_utf8(bytes)
        .map_err(|_| invalid())?
        .trim()
        .parse()
        .map_err(|_| invalid())
}

/// Reads named regions from the directory that backs them (`/dev/shm` on Linux).
#[derive(Debug, Clone)]
pub struct RegionReader {
    dir: PathBuf,
}

impl RegionReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read exactly `len` bytes from the start of region `name`.
    pub fn read(&self, name: &str, len: usize) -> Result<Bytes, PayloadError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(PayloadError::InvalidName(name.to_string()));
        }
        let read_err = |source| PayloadError::Read {
            name: name.to_string(),
            source,
        };

        let file = std::fs::File::open(self.dir.join(name)).map_err(read_err)?;
        // len comes from the peer; never reserve more than the region holds
        let size = file.metadata().map_err(read_err)?.len();
        let mut data = Vec::with_capacity(size.min(len as u64) as usize);
        file.take(len as u64)
            .read_to_end(&mut data)
            .map_err(read_err)?;

        if data.len() < len {
            return Err(PayloadError::Short {
                name: name.to_string(),
                available: data.len(),
                expected: len,
            });
        }
        Ok(Bytes::from(data))
    }

    /// Treat a complete frame as a length and read that many bytes from `name`.
    pub fn fetch(&self, frame: &Frame, name: &str) -> Result<Bytes, PayloadError> {
        if !frame.is_complete {
            return Err(PayloadError::Incomplete);
        }
        let len = parse_length(&frame.bytes)?;
        self.read(name, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("emu-bridge-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn frame(bytes: &[u8], is_complete: bool) -> Frame {
        Frame {
            bytes: Bytes::copy_from_slice(bytes),
            is_complete,
        }
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(b"123").unwrap(), 123);
        assert_eq!(parse_length(b" 42\r\n").unwrap(), 42);
        assert_eq!(parse_length(&[b'7', TERMINATOR_BYTE]).unwrap(), 7);
        assert!(matches!(
            parse_length(b"twelve"),
            Err(PayloadError::InvalidLength(_))
        ));
        assert!(matches!(parse_length(b""), Err(PayloadError::InvalidLength(_))));
    }

    #[test]
    fn test_read_exact_prefix() {
        let dir = scratch_dir("prefix");
        fs::write(dir.join("BizhawkTemp_main"), b"0123456789").unwrap();

        let reader = RegionReader::new(&dir);
        let data = reader.read("BizhawkTemp_main", 4).unwrap();
        assert_eq!(&data[..], b"0123");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_short_region() {
        let dir = scratch_dir("short");
        fs::write(dir.join("region"), b"abc").unwrap();

        let reader = RegionReader::new(&dir);
        match reader.read("region", 10) {
            Err(PayloadError::Short {
                available,
                expected,
                ..
            }) => {
                assert_eq!(available, 3);
                assert_eq!(expected, 10);
            }
            other => panic!("unexpected: {:?}", other),
        }

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_fetch_oversized_length_is_short() {
        let dir = scratch_dir("oversized");
        fs::write(dir.join("region"), b"abc").unwrap();
        let reader = RegionReader::new(&dir);

        let frame = frame(format!("{}\r\n", usize::MAX).as_bytes(), true);
        match reader.fetch(&frame, "region") {
            Err(PayloadError::Short {
                available,
                expected,
                ..
            }) => {
                assert_eq!(available, 3);
                assert_eq!(expected, usize::MAX);
            }
            other => panic!("unexpected: {:?}", other),
        }

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_read_missing_and_invalid_names() {
        let dir = scratch_dir("missing");
        let reader = RegionReader::new(&dir);
        assert!(matches!(
            reader.read("nope", 1),
            Err(PayloadError::Read { .. })
        ));
        assert!(matches!(
            reader.read("../etc", 1),
            Err(PayloadError::InvalidName(_))
        ));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_fetch_uses_frame_as_length() {
        let dir = scratch_dir("fetch");
        fs::write(dir.join("region"), b"payload-bytes").unwrap();
        let reader = RegionReader::new(&dir);

        let data = reader.fetch(&frame(b"7\r\n", true), "region").unwrap();
        assert_eq!(&data[..], b"payload");

        assert!(matches!(
            reader.fetch(&frame(b"7", false), "region"),
            Err(PayloadError::Incomplete)
        ));

        fs::remove_dir_all(dir).unwrap();
    }
}
