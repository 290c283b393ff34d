//! Output writing raw PCM to a file.

use super::AudioOutput;
use crate::config::ClockConfig;
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes interleaved PCM to a file as it arrives.
///
/// No header is written; clock changes are only logged.
pub struct FileOutput {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl FileOutput {
    /// Create (or truncate) the file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    /// Get the number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl AudioOutput for FileOutput {
    fn configure(&mut self, clock: &ClockConfig) -> Result<()> {
        tracing::info!(
            "{}: PCM continues at {}",
            self.path.display(),
            clock.music_info()
        );
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.writer.write_all(pcm)?;
        self.bytes_written += pcm.len() as u64;
        Ok(pcm.len())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_output_writes_pcm() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pcm");

        let mut output = FileOutput::create(&path).unwrap();
        output.configure(&ClockConfig::default()).unwrap();
        output.write(&[1, 2, 3]).unwrap();
        output.write(&[4]).unwrap();
        output.flush().unwrap();

        assert_eq!(output.bytes_written(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }
}
