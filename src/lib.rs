//! # flashplay
//!
//! Decode an audio asset and stream its PCM to an I2S-style output through a
//! small element pipeline.
//!
//! The pieces fit together like this:
//!
//! ```text
//!  ReadSource ──> [dec: decoder element] ══link══> [i2s: I2S writer] ──> AudioOutput
//!                          │                               │
//!                          └──── EventMessage ────┬────────┘
//!                                                 v
//!                                           EventIface ──> driver loop
//! ```
//!
//! ## Features
//!
//! - **Element pipeline**: registered elements linked into a chain, one worker
//!   thread per element, bounded Kanal channels between neighbours
//! - **Event channel**: lifecycle statuses and format discoveries delivered
//!   to a single listener
//! - **Symphonia decoding**: AAC/M4A, MP3 and WAV, pure Rust
//! - **Swappable outputs**: null, memory capture, file, or the host speaker
//!   with the `cpal-output` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use flashplay::prelude::*;
//!
//! let info = MusicInfo::voice();
//! let pcm = vec![0u8; 3200];
//! let output = MemoryOutput::new();
//! let capture = output.handle();
//!
//! let mut player = Player::new(PlayerConfig::default(), HostBoard::init()?)?;
//! let report = player.play_with(
//!     RawPcmDecoder::new(info, 512)?,
//!     AssetStream::new(pcm),
//!     output,
//! )?;
//!
//! assert_eq!(report.exit, ExitReason::SinkFinished);
//! assert_eq!(capture.len(), 3200);
//! # Ok::<(), flashplay::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod board;
pub mod config;
pub mod driver;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod format;
pub mod io;
pub mod output;
pub mod pipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::board::{AudioBoard, CodecCtrl, CodecMode, HostBoard};
    pub use crate::config::{
        AssetKind, ClockConfig, EventIfaceConfig, I2sConfig, PipelineConfig, PlayerConfig,
    };
    pub use crate::driver::{ExitReason, PlaybackReport, Player};
    pub use crate::element::{Element, ElementBody, ElementContext, ElementStatus, Flow};
    pub use crate::elements::{
        AudioDecoder, DecoderElement, I2sHandle, I2sWriter, RawPcmDecoder, decoder_for,
    };
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventCommand, EventIface, EventMessage};
    pub use crate::format::MusicInfo;
    pub use crate::io::{AssetStream, ReadSource};
    pub use crate::output::{AudioOutput, MemoryOutput, NullOutput};
    pub use crate::pipeline::Pipeline;
}

pub use error::{Error, Result};
