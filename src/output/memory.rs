//! Output capturing PCM in memory.

use super::{AudioOutput, Pacer};
use crate::config::ClockConfig;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Capture {
    data: Vec<u8>,
    clocks: Vec<ClockConfig>,
    flushes: usize,
    writes: usize,
    largest_write: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Accept,
    Limit(usize),
    Fail,
}

/// An output that records everything it receives.
///
/// A [`MemoryOutputHandle`] taken before the output is moved into a
/// pipeline reads the capture from any thread.
///
/// # Example
///
/// ```rust
/// use flashplay::config::ClockConfig;
/// use flashplay::output::{AudioOutput, MemoryOutput};
///
/// let mut output = MemoryOutput::new();
/// let handle = output.handle();
///
/// output.configure(&ClockConfig::new(44_100, 16, 2)).unwrap();
/// output.write(&[1, 2, 3, 4]).unwrap();
///
/// assert_eq!(handle.data(), vec![1, 2, 3, 4]);
/// assert_eq!(handle.clocks().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryOutput {
    capture: Arc<Mutex<Capture>>,
    mode: Mode,
    two_slot: bool,
    pacer: Option<Pacer>,
}

impl MemoryOutput {
    /// Create an unbounded capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capture that accepts at most `limit` bytes per write.
    ///
    /// Models a DMA ring that takes partial writes. A limit of zero models a
    /// stalled ring that never drains.
    pub fn with_write_limit(limit: usize) -> Self {
        Self {
            mode: Mode::Limit(limit),
            ..Self::default()
        }
    }

    /// Create a capture whose ring never accepts a byte.
    pub fn stalled() -> Self {
        Self::with_write_limit(0)
    }

    /// Create a capture whose every write fails.
    pub fn failing() -> Self {
        Self {
            mode: Mode::Fail,
            ..Self::default()
        }
    }

    /// Carry a left and a right slot in every frame, like an I2S bus.
    pub fn with_two_slot_wire(mut self) -> Self {
        self.two_slot = true;
        self
    }

    /// Block writes for as long as their PCM takes to play.
    pub fn with_pacing(mut self) -> Self {
        self.pacer = Some(Pacer::default());
        self
    }

    /// Get a handle to the capture.
    pub fn handle(&self) -> MemoryOutputHandle {
        MemoryOutputHandle {
            capture: self.capture.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Capture> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioOutput for MemoryOutput {
    fn configure(&mut self, clock: &ClockConfig) -> Result<()> {
        if let Some(pacer) = &mut self.pacer {
            let frame = clock.wire_frame_bytes(self.two_slot) as u64;
            pacer.reset(clock.sample_rate as u64 * frame);
        }
        self.lock().clocks.push(*clock);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let n = match self.mode {
            Mode::Accept => pcm.len(),
            Mode::Limit(limit) => limit.min(pcm.len()),
            Mode::Fail => return Err(Error::Output("memory output rejected the write".into())),
        };
        if let Some(pacer) = &mut self.pacer {
            pacer.pace(n);
        }

        let mut capture = self.lock();
        capture.data.extend_from_slice(&pcm[..n]);
        capture.writes += 1;
        capture.largest_write = capture.largest_write.max(pcm.len());
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    fn two_slot(&self) -> bool {
        self.two_slot
    }

    fn is_paced(&self) -> bool {
        self.pacer.is_some()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Read access to a [`MemoryOutput`] capture.
#[derive(Debug, Clone)]
pub struct MemoryOutputHandle {
    capture: Arc<Mutex<Capture>>,
}

impl MemoryOutputHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, Capture> {
        self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of all captured PCM.
    pub fn data(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// Number of captured bytes.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    /// Check if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every clock applied, oldest first.
    pub fn clocks(&self) -> Vec<ClockConfig> {
        self.lock().clocks.clone()
    }

    /// The clock applied last.
    pub fn last_clock(&self) -> Option<ClockConfig> {
        self.lock().clocks.last().copied()
    }

    /// Number of flushes.
    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }

    /// Number of write calls, including rejected partial ones.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Length of the largest buffer passed to a single write.
    pub fn largest_write(&self) -> usize {
        self.lock().largest_write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_limit() {
        let mut output = MemoryOutput::with_write_limit(3);
        let handle = output.handle();

        assert_eq!(output.write(&[1, 2, 3, 4, 5]).unwrap(), 3);
        assert_eq!(output.write(&[4, 5]).unwrap(), 2);
        assert_eq!(handle.data(), vec![1, 2, 3, 4, 5]);
        assert_eq!(handle.writes(), 2);
        assert_eq!(handle.largest_write(), 5);
    }

    #[test]
    fn test_stalled_output_accepts_nothing() {
        let mut output = MemoryOutput::stalled();
        let handle = output.handle();

        assert_eq!(output.write(&[1, 2, 3]).unwrap(), 0);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_failing_output() {
        let mut output = MemoryOutput::failing();
        assert!(matches!(output.write(&[1, 2]), Err(Error::Output(_))));
        assert!(output.handle().is_empty());
    }

    #[test]
    fn test_clock_history() {
        let mut output = MemoryOutput::new();
        let handle = output.handle();

        output.configure(&ClockConfig::default()).unwrap();
        output.configure(&ClockConfig::new(44_100, 16, 2)).unwrap();
        output.flush().unwrap();

        assert_eq!(handle.clocks().len(), 2);
        assert_eq!(handle.last_clock(), Some(ClockConfig::new(44_100, 16, 2)));
        assert_eq!(handle.flushes(), 1);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_wire_flags() {
        let output = MemoryOutput::new().with_two_slot_wire().with_pacing();
        assert!(output.two_slot());
        assert!(output.is_paced());
        assert!(!MemoryOutput::new().two_slot());
    }
}
