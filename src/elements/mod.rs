//! Built-in pipeline elements.
//!
//! ## Decode
//! - [`DecoderElement`]: Runs any [`AudioDecoder`] as a pipeline stage
//! - [`SymphoniaDecoder`]: M4A/AAC/MP3/WAV via Symphonia (feature-gated)
//! - [`RawPcmDecoder`]: Headerless PCM in a known format
//!
//! ## Sinks
//! - [`I2sWriter`]: Writes PCM to an [`AudioOutput`](crate::output::AudioOutput),
//!   with an [`I2sHandle`] for live clock changes

mod decoder;
mod i2s;
mod pcm;

#[cfg(any(feature = "audio-aac", feature = "audio-mp3", feature = "audio-wav"))]
mod symphonia;

pub use decoder::{AudioDecoder, DecoderElement, PcmFrame};
pub use i2s::{I2sHandle, I2sWriter};
pub use pcm::RawPcmDecoder;

#[cfg(any(feature = "audio-aac", feature = "audio-mp3", feature = "audio-wav"))]
pub use self::symphonia::SymphoniaDecoder;

use crate::config::AssetKind;
use crate::error::Result;

/// Pick the decoder for an asset kind.
///
/// Fails when no decoder for `kind` was compiled in.
pub fn decoder_for(kind: AssetKind) -> Result<Box<dyn AudioDecoder>> {
    let compiled = match kind {
        AssetKind::M4a | AssetKind::Aac => cfg!(feature = "audio-aac"),
        AssetKind::Mp3 => cfg!(feature = "audio-mp3"),
        AssetKind::Wav => cfg!(feature = "audio-wav"),
    };
    if !compiled {
        return Err(crate::Error::Config(format!(
            "no decoder for .{} assets in this build",
            kind.extension()
        )));
    }
    symphonia_for(kind)
}

#[cfg(any(feature = "audio-aac", feature = "audio-mp3", feature = "audio-wav"))]
fn symphonia_for(kind: AssetKind) -> Result<Box<dyn AudioDecoder>> {
    Ok(Box::new(SymphoniaDecoder::for_kind(kind)))
}

#[cfg(not(any(feature = "audio-aac", feature = "audio-mp3", feature = "audio-wav")))]
fn symphonia_for(kind: AssetKind) -> Result<Box<dyn AudioDecoder>> {
    Err(crate::Error::Config(format!(
        "no decoder for .{} assets in this build",
        kind.extension()
    )))
}
