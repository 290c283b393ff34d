//! Pass-through decoder for headerless PCM.

use super::decoder::{AudioDecoder, PcmFrame};
use crate::element::InputPort;
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use crate::io::ReadResult;
use bytes::Bytes;

/// Treats the input as raw PCM in a known format.
///
/// Frames are cut at whole-sample boundaries; a trailing partial sample is
/// dropped.
pub struct RawPcmDecoder {
    info: MusicInfo,
    frame_bytes: usize,
    input: Option<InputPort>,
}

impl RawPcmDecoder {
    /// Create a decoder emitting frames of about `frame_bytes` bytes.
    pub fn new(info: MusicInfo, frame_bytes: usize) -> Result<Self> {
        info.validate()?;
        let unit = info.frame_bytes();
        // Round down to whole sample frames, at least one.
        let frame_bytes = (frame_bytes / unit).max(1) * unit;
        Ok(Self {
            info,
            frame_bytes,
            input: None,
        })
    }
}

impl AudioDecoder for RawPcmDecoder {
    fn open(&mut self, input: InputPort) -> Result<MusicInfo> {
        self.input = Some(input);
        Ok(self.info)
    }

    fn next_frame(&mut self) -> Result<Option<PcmFrame>> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| Error::Decode("decoder not opened".into()))?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match input.read(&mut buf[filled..])? {
                ReadResult::Data(n) => filled += n,
                ReadResult::Done | ReadResult::Timeout => break,
            }
        }

        let unit = self.info.frame_bytes();
        buf.truncate(filled - filled % unit);
        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(PcmFrame {
            info: self.info,
            data: Bytes::from(buf),
        }))
    }

    fn name(&self) -> &str {
        "pcm"
    }
}
