//! The decode stage and the decoder trait it drives.
//!
//! [`DecoderElement`] wraps any [`AudioDecoder`]: it hands the decoder its
//! input port, publishes the stream format as soon as the decoder knows
//! it, and forwards decoded PCM downstream. A mid-stream format change is
//! published again before the first frame in the new format.

use crate::element::{ElementBody, ElementContext, ElementRole, ElementStatus, Flow, InputPort};
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use bytes::Bytes;

/// A block of interleaved little-endian PCM and its format.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Format of `data`.
    pub info: MusicInfo,
    /// Interleaved samples.
    pub data: Bytes,
}

/// Turns an encoded byte stream into PCM frames.
pub trait AudioDecoder: Send {
    /// Take the input and read enough of it to learn the stream format.
    fn open(&mut self, input: InputPort) -> Result<MusicInfo>;

    /// Decode the next frame. `None` is end of stream.
    fn next_frame(&mut self) -> Result<Option<PcmFrame>>;

    /// Get the name of this decoder (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<D: AudioDecoder + ?Sized> AudioDecoder for Box<D> {
    fn open(&mut self, input: InputPort) -> Result<MusicInfo> {
        (**self).open(input)
    }

    fn next_frame(&mut self) -> Result<Option<PcmFrame>> {
        (**self).next_frame()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Pipeline stage running an [`AudioDecoder`].
pub struct DecoderElement<D: AudioDecoder> {
    decoder: D,
    current: Option<MusicInfo>,
    frames: u64,
}

impl<D: AudioDecoder> DecoderElement<D> {
    /// Wrap a decoder.
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            current: None,
            frames: 0,
        }
    }

    /// Get the number of frames forwarded in the current run.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn publish(&mut self, ctx: &mut ElementContext, info: MusicInfo) {
        if self.current != Some(info) {
            if let Some(old) = self.current {
                tracing::info!("{}: format change {} -> {}", ctx.name(), old, info);
            }
            self.current = Some(info);
            ctx.report_info(info);
        }
    }
}

impl<D: AudioDecoder> ElementBody for DecoderElement<D> {
    fn role(&self) -> ElementRole {
        ElementRole::Filter
    }

    fn open(&mut self, ctx: &mut ElementContext) -> Result<()> {
        let input = ctx
            .take_input()
            .ok_or_else(|| Error::Element(format!("{} has no input", ctx.name())))?;
        self.current = None;
        self.frames = 0;

        let info = self.decoder.open(input)?;
        tracing::debug!("{}: {} opened", ctx.name(), self.decoder.name());
        self.publish(ctx, info);
        Ok(())
    }

    fn process(&mut self, ctx: &mut ElementContext) -> Result<Flow> {
        match self.decoder.next_frame()? {
            Some(frame) => {
                self.publish(ctx, frame.info);
                ctx.write_bytes(frame.data)?;
                self.frames += 1;
                Ok(Flow::Continue)
            }
            None => {
                tracing::debug!(
                    "{}: end of stream after {} frames ({} bytes)",
                    ctx.name(),
                    self.frames,
                    ctx.bytes_written()
                );
                ctx.report_status(ElementStatus::InputDone);
                ctx.report_position();
                Ok(Flow::Done)
            }
        }
    }

    fn name(&self) -> &str {
        self.decoder.name()
    }
}
