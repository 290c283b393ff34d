//! Configuration for the player and its components.
//!
//! Every struct has a `Default` matching the stock board setup: a 16 kHz,
//! 16 bit mono I2S writer on port 0 fed by an M4A decoder.
//!
//! # Example
//!
//! ```rust
//! use flashplay::config::{AssetKind, PlayerConfig};
//! use std::time::Duration;
//!
//! let config = PlayerConfig::default()
//!     .with_asset_kind(AssetKind::Mp3)
//!     .with_listen_timeout(Some(Duration::from_millis(500)));
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use crate::format::MusicInfo;
use std::time::Duration;

// ============================================================================
// Pipeline
// ============================================================================

/// Configuration for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of chunks each link between two stages can hold.
    pub link_capacity: usize,
    /// Largest read requested from a custom read source at once.
    pub chunk_size: usize,
    /// Upper bound on any single wait inside a worker.
    ///
    /// Workers recheck their stop flag at least this often.
    pub poll_interval: Duration,
    /// Stack size of each element worker thread.
    pub task_stack: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            link_capacity: 8,
            chunk_size: 4096,
            poll_interval: Duration::from_millis(20),
            task_stack: 512 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Create a config with a custom link capacity.
    pub fn with_link_capacity(link_capacity: usize) -> Self {
        Self {
            link_capacity,
            ..Self::default()
        }
    }

    /// Check the config for unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.link_capacity == 0 {
            return Err(Error::Config("link capacity must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Event channel
// ============================================================================

/// Configuration for an [`EventIface`](crate::event::EventIface).
#[derive(Debug, Clone)]
pub struct EventIfaceConfig {
    /// Number of messages that can wait for the listener.
    pub queue_size: usize,
    /// How long an element may wait for queue space before dropping a message.
    pub send_timeout: Duration,
}

impl Default for EventIfaceConfig {
    fn default() -> Self {
        Self {
            queue_size: 32,
            send_timeout: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// I2S output
// ============================================================================

/// I2S controller port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2sPort {
    /// Port 0.
    #[default]
    Num0,
    /// Port 1.
    Num1,
}

/// Slot layout on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotMode {
    /// One channel, routed to the slots in the mask.
    #[default]
    Mono,
    /// Two interleaved channels.
    Stereo,
}

impl SlotMode {
    /// Slot mode for a channel count.
    pub fn for_channels(channels: u16) -> Self {
        if channels <= 1 {
            SlotMode::Mono
        } else {
            SlotMode::Stereo
        }
    }
}

/// Which slots of a two-slot frame carry data in mono mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotMask {
    /// Left slot only.
    Left,
    /// Right slot only.
    #[default]
    Right,
    /// Both slots.
    Both,
}

impl SlotMask {
    /// Check if the left slot carries data.
    pub fn left(&self) -> bool {
        matches!(self, SlotMask::Left | SlotMask::Both)
    }

    /// Check if the right slot carries data.
    pub fn right(&self) -> bool {
        matches!(self, SlotMask::Right | SlotMask::Both)
    }
}

/// The active clock of an output transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Data bit width.
    pub bits: u16,
    /// Channel count.
    pub channels: u16,
    /// Slot layout, derived from the channel count.
    pub slot_mode: SlotMode,
    /// Slots a mono stream is routed to on a two-slot wire.
    pub slot_mask: SlotMask,
}

impl ClockConfig {
    /// Build a clock from rate, width and channel count.
    pub fn new(sample_rate: u32, bits: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bits,
            channels,
            slot_mode: SlotMode::for_channels(channels),
            slot_mask: SlotMask::default(),
        }
    }

    /// Set the mono slot mask.
    pub fn with_slot_mask(mut self, slot_mask: SlotMask) -> Self {
        self.slot_mask = slot_mask;
        self
    }

    /// The PCM format this clock expects.
    pub fn music_info(&self) -> MusicInfo {
        MusicInfo::new(self.sample_rate, self.bits, self.channels)
    }

    /// Bytes per frame on the wire.
    ///
    /// A two-slot wire carries mono samples in a stereo-sized frame.
    pub fn wire_frame_bytes(&self, two_slot: bool) -> usize {
        let info = self.music_info();
        if two_slot && self.slot_mode == SlotMode::Mono {
            info.bytes_per_sample() * 2
        } else {
            info.frame_bytes()
        }
    }
}

impl From<MusicInfo> for ClockConfig {
    fn from(info: MusicInfo) -> Self {
        ClockConfig::new(info.sample_rate, info.bits, info.channels)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new(16_000, 16, 1)
    }
}

/// Configuration for the I2S writer element.
#[derive(Debug, Clone)]
pub struct I2sConfig {
    /// Controller port.
    pub port: I2sPort,
    /// Number of DMA descriptors.
    pub dma_desc_num: usize,
    /// Frames per DMA descriptor.
    pub dma_frame_num: usize,
    /// Send silence to a real-time output when no PCM arrives for as long
    /// as the DMA ring takes to play out.
    pub auto_clear: bool,
    /// Initial clock, replaced when the decoder reports the stream format.
    ///
    /// Its slot mask is kept across format changes.
    pub clock: ClockConfig,
    /// Apply the software volume stage.
    pub use_alc: bool,
    /// Software volume in percent, 0 to 100.
    pub volume: u8,
    /// Bytes pulled from the upstream link per write. Must hold whole frames
    /// of the initial clock.
    pub buffer_len: usize,
}

impl Default for I2sConfig {
    fn default() -> Self {
        Self {
            port: I2sPort::Num0,
            dma_desc_num: 3,
            dma_frame_num: 312,
            auto_clear: true,
            clock: ClockConfig::default(),
            use_alc: true,
            volume: 100,
            buffer_len: 3600,
        }
    }
}

impl I2sConfig {
    /// Frames the whole DMA ring holds.
    pub fn dma_frames(&self) -> usize {
        self.dma_desc_num * self.dma_frame_num
    }

    /// Size in bytes of the DMA ring for PCM in `clock`'s format.
    pub fn dma_buffer_bytes(&self, clock: &ClockConfig) -> usize {
        self.dma_frames() * clock.music_info().frame_bytes()
    }

    /// Time the DMA ring takes to play out at `clock`'s rate.
    pub fn dma_duration(&self, clock: &ClockConfig) -> Duration {
        Duration::from_secs_f64(self.dma_frames() as f64 / clock.sample_rate.max(1) as f64)
    }

    /// Check the config for unusable values.
    pub fn validate(&self) -> Result<()> {
        self.clock.music_info().validate()?;
        if self.dma_desc_num < 2 {
            return Err(Error::Config("at least two DMA descriptors are needed".into()));
        }
        if self.dma_frame_num == 0 {
            return Err(Error::Config("DMA frame count must be non-zero".into()));
        }
        if self.volume > 100 {
            return Err(Error::Config(format!(
                "volume {} out of range 0..=100",
                self.volume
            )));
        }
        if self.buffer_len == 0 {
            return Err(Error::Config("I2S buffer length must be non-zero".into()));
        }
        let frame = self.clock.music_info().frame_bytes();
        if self.buffer_len % frame != 0 {
            return Err(Error::Config(format!(
                "I2S buffer length {} is not a multiple of the {} byte frame",
                self.buffer_len, frame
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Container/codec of the embedded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetKind {
    /// AAC in an MPEG-4 container.
    #[default]
    M4a,
    /// Raw ADTS AAC.
    Aac,
    /// MPEG-1 Layer III.
    Mp3,
    /// RIFF WAVE.
    Wav,
}

impl AssetKind {
    /// File extension used as the container hint.
    pub fn extension(&self) -> &'static str {
        match self {
            AssetKind::M4a => "m4a",
            AssetKind::Aac => "aac",
            AssetKind::Mp3 => "mp3",
            AssetKind::Wav => "wav",
        }
    }
}

/// Configuration for the decoder element.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    /// What the asset contains.
    pub kind: AssetKind,
}

// ============================================================================
// Player
// ============================================================================

/// Top-level configuration for [`Player`](crate::driver::Player).
#[derive(Debug, Clone, Default)]
pub struct PlayerConfig {
    /// Pipeline buffering and worker settings.
    pub pipeline: PipelineConfig,
    /// Event channel settings.
    pub event: EventIfaceConfig,
    /// I2S writer settings.
    pub i2s: I2sConfig,
    /// Decoder settings.
    pub decoder: DecoderConfig,
    /// Wait per listen call; `None` waits without bound.
    pub listen_timeout: Option<Duration>,
    /// Leave the event loop when the sink reports an error status.
    pub stop_on_sink_error: bool,
}

impl PlayerConfig {
    /// Set the asset kind.
    pub fn with_asset_kind(mut self, kind: AssetKind) -> Self {
        self.decoder.kind = kind;
        self
    }

    /// Set the listen timeout.
    pub fn with_listen_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.listen_timeout = timeout;
        self
    }

    /// Leave the event loop on sink error statuses.
    pub fn with_stop_on_sink_error(mut self, stop: bool) -> Self {
        self.stop_on_sink_error = stop;
        self
    }

    /// Check every component config.
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.i2s.validate()?;
        if self.event.queue_size == 0 {
            return Err(Error::Config("event queue size must be at least 1".into()));
        }
        Ok(())
    }
}
