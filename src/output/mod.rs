//! Output transports behind the I2S writer.
//!
//! An [`AudioOutput`] stands in for the I2S peripheral and its DMA ring:
//! it is told the clock, then fed interleaved little-endian PCM.
//!
//! | Output | Use |
//! |--------|-----|
//! | [`NullOutput`] | Discards PCM, optionally paced at the clock rate |
//! | [`MemoryOutput`] | Captures PCM and clock changes for inspection |
//! | [`FileOutput`] | Writes raw PCM to a file |
//! | `CpalOutput` | Host speakers (feature `cpal-output`) |

mod file;
mod memory;
mod null;

#[cfg(feature = "cpal-output")]
mod cpal;

pub use file::FileOutput;
pub use memory::{MemoryOutput, MemoryOutputHandle};
pub use null::NullOutput;

#[cfg(feature = "cpal-output")]
pub use self::cpal::CpalOutput;

use crate::config::ClockConfig;
use crate::error::Result;
use std::time::{Duration, Instant};

/// A PCM transport with a reconfigurable clock.
pub trait AudioOutput: Send {
    /// Apply a new clock. Called before the first write and on every
    /// format change.
    fn configure(&mut self, clock: &ClockConfig) -> Result<()>;

    /// Write PCM, returning how many bytes were accepted.
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    /// Wait until everything written has been played out.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Check if every frame on the wire has a left and a right slot, as on
    /// an I2S bus in standard mode.
    ///
    /// The writer then routes mono PCM into the slots named by the clock's
    /// slot mask; otherwise mono PCM is written as is.
    fn two_slot(&self) -> bool {
        false
    }

    /// Check if the output plays PCM in real time and starves when the
    /// writer stops feeding it.
    fn is_paced(&self) -> bool {
        false
    }

    /// Get the name of this output (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<O: AudioOutput + ?Sized> AudioOutput for Box<O> {
    fn configure(&mut self, clock: &ClockConfig) -> Result<()> {
        (**self).configure(clock)
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        (**self).write(pcm)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn two_slot(&self) -> bool {
        (**self).two_slot()
    }

    fn is_paced(&self) -> bool {
        (**self).is_paced()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Blocks writes for as long as their PCM takes to play.
#[derive(Debug, Default)]
pub(crate) struct Pacer {
    byte_rate: u64,
    started: Option<Instant>,
    played: Duration,
}

impl Pacer {
    /// Restart pacing at `byte_rate` bytes per second.
    pub(crate) fn reset(&mut self, byte_rate: u64) {
        self.byte_rate = byte_rate;
        self.started = None;
        self.played = Duration::ZERO;
    }

    /// Account for `bytes` more PCM, sleeping while ahead of real time.
    pub(crate) fn pace(&mut self, bytes: usize) {
        if self.byte_rate == 0 {
            return;
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        self.played += Duration::from_secs_f64(bytes as f64 / self.byte_rate as f64);
        if let Some(ahead) = self.played.checked_sub(started.elapsed()) {
            std::thread::sleep(ahead);
        }
    }
}
