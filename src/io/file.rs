//! File-backed source.

use super::{ReadResult, ReadSource};
use crate::error::Result;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::Duration;

/// A source reading sequentially from a file.
///
/// Local file reads complete promptly, so the wait is not used.
pub struct FileStream {
    name: String,
    file: File,
    bytes_read: u64,
}

impl FileStream {
    /// Open a file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self {
            name: format!("file:{}", path.display()),
            file,
            bytes_read: 0,
        })
    }

    /// Get the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl ReadSource for FileStream {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<ReadResult> {
        if buf.is_empty() {
            return Ok(ReadResult::Data(0));
        }

        loop {
            match self.file.read(buf) {
                Ok(0) => return Ok(ReadResult::Done),
                Ok(n) => {
                    self.bytes_read += n as u64;
                    return Ok(ReadResult::Data(n));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_stream_reads_to_done() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&[9u8; 300]).unwrap();
        tmp.flush().unwrap();

        let mut stream = FileStream::open(tmp.path()).unwrap();
        let mut buf = [0u8; 128];
        let mut total = 0;

        loop {
            match stream.read(&mut buf, Duration::from_millis(10)).unwrap() {
                ReadResult::Data(n) => total += n,
                ReadResult::Done => break,
                ReadResult::Timeout => panic!("file reads never time out"),
            }
        }

        assert_eq!(total, 300);
        assert_eq!(stream.bytes_read(), 300);
    }

    #[test]
    fn test_missing_file() {
        assert!(FileStream::open("/nonexistent/flashplay/asset.m4a").is_err());
    }
}
