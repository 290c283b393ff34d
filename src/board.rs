//! Board and codec control.
//!
//! The player powers the codec's decode path up before streaming and down
//! after teardown. [`HostBoard`] is the implementation for running on a
//! development host, where there is no codec chip to program.

use crate::error::{Error, Result};

/// Which codec path a control call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecMode {
    /// ADC path.
    Encode,
    /// DAC path.
    Decode,
    /// Both paths.
    Both,
    /// Analog line input.
    LineIn,
}

/// Power control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecCtrl {
    /// Power the path up.
    Start,
    /// Power the path down.
    Stop,
}

/// Board-level audio hardware.
pub trait AudioBoard: Send {
    /// Start or stop a codec path.
    fn ctrl_codec(&mut self, mode: CodecMode, ctrl: CodecCtrl) -> Result<()>;

    /// Set the codec's hardware volume in percent.
    fn set_volume(&mut self, _percent: u8) -> Result<()> {
        Ok(())
    }

    /// Get the name of this board (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A board without codec hardware; control calls are tracked and logged.
#[derive(Debug, Default)]
pub struct HostBoard {
    decode_running: bool,
    encode_running: bool,
    volume: u8,
}

impl HostBoard {
    /// Bring the board up.
    pub fn init() -> Result<Self> {
        tracing::info!("host board initialized");
        Ok(Self {
            volume: 100,
            ..Self::default()
        })
    }

    /// Check if the decode path is powered.
    pub fn is_decoding(&self) -> bool {
        self.decode_running
    }

    /// Check if the encode path is powered.
    pub fn is_encoding(&self) -> bool {
        self.encode_running
    }

    /// Get the hardware volume.
    pub fn volume(&self) -> u8 {
        self.volume
    }
}

impl AudioBoard for HostBoard {
    fn ctrl_codec(&mut self, mode: CodecMode, ctrl: CodecCtrl) -> Result<()> {
        let on = ctrl == CodecCtrl::Start;
        match mode {
            CodecMode::Decode => self.decode_running = on,
            CodecMode::Encode | CodecMode::LineIn => self.encode_running = on,
            CodecMode::Both => {
                self.decode_running = on;
                self.encode_running = on;
            }
        }
        tracing::debug!("codec {:?} {:?}", mode, ctrl);
        Ok(())
    }

    fn set_volume(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(Error::Board(format!("volume {} out of range", percent)));
        }
        self.volume = percent;
        Ok(())
    }

    fn name(&self) -> &str {
        "host"
    }
}
