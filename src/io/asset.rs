//! In-memory asset source.

use super::{ReadResult, ReadSource};
use crate::error::Result;
use bytes::Bytes;
use std::time::Duration;

/// A forward-only, non-seekable stream over an embedded asset.
///
/// The stream owns its read offset. Each read returns
/// `min(buf.len(), remaining)` bytes; once the asset is exhausted every read
/// returns [`ReadResult::Done`].
///
/// # Example
///
/// ```rust
/// use flashplay::io::{AssetStream, ReadResult, ReadSource};
/// use std::time::Duration;
///
/// static ASSET: &[u8] = &[1, 2, 3, 4, 5];
///
/// let mut stream = AssetStream::from_static(ASSET);
/// let mut buf = [0u8; 4];
///
/// assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Data(4));
/// assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Data(1));
/// assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Done);
/// ```
#[derive(Debug, Clone)]
pub struct AssetStream {
    name: String,
    data: Bytes,
    offset: usize,
}

impl AssetStream {
    /// Create a stream over owned or shared bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            name: "asset".to_string(),
            data: data.into(),
            offset: 0,
        }
    }

    /// Create a stream over bytes baked into the program image.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Total asset size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the asset is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes not yet delivered.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }
}

impl ReadSource for AssetStream {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<ReadResult> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(ReadResult::Done);
        }

        let n = buf.len().min(remaining);
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        Ok(ReadResult::Data(n))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_reads_cover_asset() {
        let mut stream = AssetStream::new(vec![7u8; 10_000]);
        let mut buf = vec![0u8; 4096];

        let mut sizes = Vec::new();
        loop {
            match stream.read(&mut buf, Duration::ZERO).unwrap() {
                ReadResult::Data(n) => sizes.push(n),
                ReadResult::Done => break,
                ReadResult::Timeout => unreachable!(),
            }
        }

        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(sizes.iter().sum::<usize>(), 10_000);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn test_done_is_sticky() {
        let mut stream = AssetStream::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];

        assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Data(3));
        for _ in 0..3 {
            assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Done);
            assert_eq!(stream.position(), 3);
        }
    }

    #[test]
    fn test_zero_length_request() {
        let mut stream = AssetStream::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 0];

        assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Data(0));
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_empty_asset() {
        let mut stream = AssetStream::new(Vec::new());
        let mut buf = [0u8; 16];
        assert!(stream.is_empty());
        assert_eq!(stream.read(&mut buf, Duration::ZERO).unwrap(), ReadResult::Done);
    }

    #[test]
    fn test_bytes_are_copied_in_order() {
        let data: Vec<u8> = (0..=255).collect();
        let mut stream = AssetStream::new(data.clone()).with_name("ramp");
        let mut out = Vec::new();
        let mut buf = [0u8; 100];

        while let ReadResult::Data(n) = stream.read(&mut buf, Duration::ZERO).unwrap() {
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(out, data);
        assert_eq!(ReadSource::name(&stream), "ramp");
    }
}
