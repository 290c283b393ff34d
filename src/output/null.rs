//! Output that discards PCM.

use super::{AudioOutput, Pacer};
use crate::config::ClockConfig;
use crate::error::Result;

/// An output that drops everything it is given.
///
/// When paced, writes block for as long as the PCM would take to play at
/// the configured clock, which makes end-to-end timing realistic without
/// audio hardware.
#[derive(Debug, Default)]
pub struct NullOutput {
    clock: Option<ClockConfig>,
    pacer: Option<Pacer>,
    bytes_written: u64,
}

impl NullOutput {
    /// Create an unpaced output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an output that paces writes at the clock rate.
    pub fn paced() -> Self {
        Self {
            pacer: Some(Pacer::default()),
            ..Self::default()
        }
    }

    /// Get the number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Get the current clock.
    pub fn clock(&self) -> Option<ClockConfig> {
        self.clock
    }
}

impl AudioOutput for NullOutput {
    fn configure(&mut self, clock: &ClockConfig) -> Result<()> {
        self.clock = Some(*clock);
        if let Some(pacer) = &mut self.pacer {
            pacer.reset(clock.music_info().byte_rate());
        }
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if let Some(pacer) = &mut self.pacer {
            pacer.pace(pcm.len());
        }
        self.bytes_written += pcm.len() as u64;
        Ok(pcm.len())
    }

    fn is_paced(&self) -> bool {
        self.pacer.is_some()
    }

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_null_output_counts() {
        let mut output = NullOutput::new();
        output.configure(&ClockConfig::default()).unwrap();
        assert_eq!(output.write(&[0u8; 100]).unwrap(), 100);
        assert_eq!(output.bytes_written(), 100);
        assert_eq!(output.clock(), Some(ClockConfig::default()));
        assert!(!output.is_paced());
    }

    #[test]
    fn test_paced_output_takes_real_time() {
        let mut output = NullOutput::paced();
        // 8 kHz, 8 bit mono: 8000 bytes per second
        output.configure(&ClockConfig::new(8_000, 8, 1)).unwrap();

        let start = Instant::now();
        output.write(&[0u8; 400]).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(45));
        assert!(output.is_paced());
    }
}
