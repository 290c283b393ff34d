//! Compressed audio decoding using Symphonia (pure Rust).
//!
//! # Supported Containers
//!
//! | Asset | Feature Flag |
//! |-------|--------------|
//! | M4A (AAC in MP4) | `audio-aac` |
//! | ADTS AAC | `audio-aac` |
//! | MP3 | `audio-mp3` |
//! | WAV | `audio-wav` |
//!
//! The input is read sequentially through the element's [`InputPort`];
//! nothing is seeked, so the source can be a forward-only asset or socket.
//! Output is always 16 bit interleaved PCM.
//!
//! Some containers (MP4 among them) do not state the channel layout up
//! front, so opening decodes the first packet and reports its format.

use super::decoder::{AudioDecoder, PcmFrame};
use crate::config::AssetKind;
use crate::element::InputPort;
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use bytes::Bytes;
use std::io::ErrorKind;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

// Consecutive undecodable packets tolerated before giving up.
const MAX_DECODE_ERRORS: u32 = 8;

struct Active {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

/// Audio decoder using Symphonia.
pub struct SymphoniaDecoder {
    kind: Option<AssetKind>,
    active: Option<Active>,
    pending: Option<PcmFrame>,
    frames: u64,
}

impl SymphoniaDecoder {
    /// Create a decoder that detects the container from the stream.
    pub fn new() -> Self {
        Self {
            kind: None,
            active: None,
            pending: None,
            frames: 0,
        }
    }

    /// Create a decoder for a known asset kind.
    pub fn for_kind(kind: AssetKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::new()
        }
    }

    /// Get the number of frames decoded.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&mut self, input: InputPort) -> Result<MusicInfo> {
        let source = ReadOnlySource::new(input);
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(kind) = self.kind {
            hint.with_extension(kind.extension());
        }

        let detected = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| map_error("unrecognized container", e))?;
        let format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("no audio track found".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| map_error("failed to create audio decoder", e))?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);
        let declared = MusicInfo::new(sample_rate, 16, channels);
        let track_id = track.id;

        let mut active = Active {
            format,
            decoder,
            track_id,
        };
        let first = decode_next(&mut active)?;
        let info = first.as_ref().map_or(declared, |f| f.info);
        if info != declared {
            tracing::debug!("container declared {}, stream decodes as {}", declared, info);
        }

        self.active = Some(active);
        self.pending = first;
        self.frames = 0;
        Ok(info)
    }

    fn next_frame(&mut self) -> Result<Option<PcmFrame>> {
        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None => {
                let active = self
                    .active
                    .as_mut()
                    .ok_or_else(|| Error::Decode("decoder not opened".into()))?;
                decode_next(active)?
            }
        };
        if frame.is_some() {
            self.frames += 1;
        }
        Ok(frame)
    }

    fn name(&self) -> &str {
        "symphonia"
    }
}

fn decode_next(active: &mut Active) -> Result<Option<PcmFrame>> {
    let mut errors = 0;

    loop {
        let packet = match active.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(map_error("failed to read packet", e)),
        };
        if packet.track_id() != active.track_id {
            continue;
        }

        let decoded = match active.decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                errors += 1;
                tracing::warn!("skipping undecodable packet: {}", msg);
                if errors > MAX_DECODE_ERRORS {
                    return Err(Error::Decode(format!(
                        "{} consecutive packets failed to decode",
                        errors
                    )));
                }
                continue;
            }
            Err(e) => return Err(map_error("decode failed", e)),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        let mut data = Vec::with_capacity(samples.samples().len() * 2);
        for s in samples.samples() {
            data.extend_from_slice(&s.to_le_bytes());
        }

        let info = MusicInfo::new(spec.rate, 16, spec.channels.count() as u16);
        return Ok(Some(PcmFrame {
            info,
            data: Bytes::from(data),
        }));
    }
}

// A stop request surfaces from the input port as an aborted read.
fn map_error(context: &str, err: SymphoniaError) -> Error {
    match err {
        SymphoniaError::IoError(e) if e.kind() == ErrorKind::ConnectionAborted => Error::Aborted,
        e => Error::Decode(format!("{}: {}", context, e)),
    }
}
