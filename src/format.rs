//! PCM stream format metadata.
//!
//! [`MusicInfo`] is what a decoder discovers about its stream and what the
//! output transport is clocked with.

use crate::error::{Error, Result};
use std::fmt;

/// Sample rate, bit depth and channel count of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MusicInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample.
    pub bits: u16,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl MusicInfo {
    /// Create a new format description.
    pub const fn new(sample_rate: u32, bits: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits,
            channels,
        }
    }

    /// 16 kHz, 16 bit, mono.
    pub const fn voice() -> Self {
        Self::new(16_000, 16, 1)
    }

    /// 44.1 kHz, 16 bit, stereo.
    pub const fn cd() -> Self {
        Self::new(44_100, 16, 2)
    }

    /// Bytes per sample for one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Bytes per frame (one sample on every channel).
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Bytes consumed per second at this format.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Check the values are something an I2S transport can be clocked with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample rate must be non-zero".into()));
        }
        if !matches!(self.bits, 8 | 16 | 24 | 32) {
            return Err(Error::Config(format!(
                "unsupported bit depth {} (expected 8, 16, 24 or 32)",
                self.bits
            )));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(Error::Config(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        Ok(())
    }
}

impl Default for MusicInfo {
    fn default() -> Self {
        Self::voice()
    }
}

impl fmt::Display for MusicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} bit, {} ch",
            self.sample_rate, self.bits, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_and_byte_rate() {
        let info = MusicInfo::cd();
        assert_eq!(info.bytes_per_sample(), 2);
        assert_eq!(info.frame_bytes(), 4);
        assert_eq!(info.byte_rate(), 176_400);

        let info = MusicInfo::new(48_000, 24, 2);
        assert_eq!(info.bytes_per_sample(), 3);
        assert_eq!(info.frame_bytes(), 6);
    }

    #[test]
    fn test_validate() {
        assert!(MusicInfo::voice().validate().is_ok());
        assert!(MusicInfo::new(0, 16, 1).validate().is_err());
        assert!(MusicInfo::new(16_000, 12, 1).validate().is_err());
        assert!(MusicInfo::new(16_000, 16, 0).validate().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(MusicInfo::voice().to_string(), "16000 Hz, 16 bit, 1 ch");
    }
}
