//! I2S writer sink with a live-reconfigurable clock.
//!
//! The writer pulls PCM from its upstream link and feeds an
//! [`AudioOutput`]. An [`I2sHandle`] kept by the application can change the
//! clock while the writer runs; the change is applied after the next chunk
//! arrives and before it is written, so no PCM is split across clocks.
//!
//! Only whole frames reach the output. Mono on a two-slot wire is routed
//! into the slots of the clock's mask, and each write is bounded by the
//! size of the DMA ring.

use crate::config::{ClockConfig, I2sConfig, SlotMask, SlotMode};
use crate::element::{ChunkRead, ElementBody, ElementContext, ElementErrorKind, ElementRole, Flow};
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use crate::output::AudioOutput;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Attempts at a write the output accepts none of before failing.
const MAX_STALLED_WRITES: u32 = 100;

#[derive(Debug)]
struct I2sShared {
    clock: Mutex<ClockConfig>,
    volume: AtomicU8,
}

impl I2sShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, ClockConfig> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cross-thread control of an [`I2sWriter`].
///
/// # Example
///
/// ```rust
/// use flashplay::config::{I2sConfig, SlotMode};
/// use flashplay::elements::I2sWriter;
/// use flashplay::output::NullOutput;
///
/// let writer = I2sWriter::new(I2sConfig::default(), NullOutput::new()).unwrap();
/// let handle = writer.handle();
///
/// handle.set_clk(44_100, 16, 2).unwrap();
/// assert_eq!(handle.clock().sample_rate, 44_100);
/// assert_eq!(handle.clock().slot_mode, SlotMode::Stereo);
/// ```
#[derive(Debug, Clone)]
pub struct I2sHandle {
    shared: Arc<I2sShared>,
}

impl I2sHandle {
    /// Change the clock to `sample_rate` Hz, `bits` wide, `channels` slots.
    ///
    /// The new clock is active immediately; a running writer applies it to
    /// the transport before its next write. The mono slot mask is kept.
    pub fn set_clk(&self, sample_rate: u32, bits: u16, channels: u16) -> Result<()> {
        ClockConfig::new(sample_rate, bits, channels)
            .music_info()
            .validate()?;

        let mut active = self.shared.lock();
        let clock = ClockConfig::new(sample_rate, bits, channels).with_slot_mask(active.slot_mask);
        if *active != clock {
            tracing::info!("i2s clock {} -> {}", active.music_info(), clock.music_info());
            *active = clock;
        }
        Ok(())
    }

    /// Change the clock from stream format metadata.
    pub fn set_music_info(&self, info: MusicInfo) -> Result<()> {
        self.set_clk(info.sample_rate, info.bits, info.channels)
    }

    /// Get the active clock.
    pub fn clock(&self) -> ClockConfig {
        *self.shared.lock()
    }

    /// Set the software volume in percent (clamped to 100).
    pub fn set_volume(&self, percent: u8) {
        self.shared.volume.store(percent.min(100), Ordering::Relaxed);
    }

    /// Get the software volume in percent.
    pub fn volume(&self) -> u8 {
        self.shared.volume.load(Ordering::Relaxed)
    }
}

/// Sink element writing PCM to an output transport.
pub struct I2sWriter<O: AudioOutput> {
    config: I2sConfig,
    output: O,
    shared: Arc<I2sShared>,
    applied: Option<ClockConfig>,
    residue: BytesMut,
    bytes_written: u64,
    underruns: u64,
}

impl<O: AudioOutput> I2sWriter<O> {
    /// Create a writer with the configured initial clock.
    pub fn new(config: I2sConfig, output: O) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(I2sShared {
            clock: Mutex::new(config.clock),
            volume: AtomicU8::new(config.volume),
        });
        Ok(Self {
            config,
            output,
            shared,
            applied: None,
            residue: BytesMut::new(),
            bytes_written: 0,
            underruns: 0,
        })
    }

    /// Get a control handle.
    pub fn handle(&self) -> I2sHandle {
        I2sHandle {
            shared: self.shared.clone(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &I2sConfig {
        &self.config
    }

    /// Get the number of bytes handed to the output, silence included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn clock(&self) -> ClockConfig {
        self.applied.unwrap_or(self.config.clock)
    }

    // Largest single write: one DMA ring of wire frames.
    fn max_write(&self) -> usize {
        let frame = self.clock().wire_frame_bytes(self.output.two_slot());
        self.config.dma_frames() * frame
    }

    // Apply the active clock if the transport has not seen it yet.
    fn apply_clock(&mut self, ctx: &mut ElementContext) -> Result<()> {
        let clock = *self.shared.lock();
        if self.applied == Some(clock) {
            return Ok(());
        }

        self.output
            .configure(&clock)
            .inspect_err(|_| ctx.mark_fault(ElementErrorKind::Output))?;
        if !self.residue.is_empty() {
            tracing::debug!(
                "{}: dropping {} byte partial frame on clock change",
                ctx.name(),
                self.residue.len()
            );
            self.residue.clear();
        }
        tracing::debug!(
            "{}: {} on {} ({:?}, {} x {} frame DMA, {:?} mask)",
            ctx.name(),
            clock.music_info(),
            self.output.name(),
            self.config.port,
            self.config.dma_desc_num,
            self.config.dma_frame_num,
            clock.slot_mask
        );
        self.applied = Some(clock);
        ctx.set_info(clock.music_info());
        Ok(())
    }

    // Next chunk from upstream. Only a real-time output with auto clear
    // gives up waiting, after one DMA ring of playback.
    fn next_chunk(&mut self, ctx: &mut ElementContext) -> Result<ChunkRead> {
        if self.config.auto_clear && self.output.is_paced() {
            let timeout = self.config.dma_duration(&self.clock());
            return ctx.read_chunk_timeout(self.config.buffer_len, timeout);
        }

        Ok(match ctx.read_chunk(self.config.buffer_len)? {
            Some(chunk) => ChunkRead::Data(chunk),
            None => ChunkRead::Done,
        })
    }

    // Join `chunk` to the bytes left over from the last one and split off
    // the whole frames.
    fn whole_frames(&mut self, chunk: Bytes) -> Bytes {
        let frame = self.clock().music_info().frame_bytes();
        if self.residue.is_empty() && chunk.len() % frame == 0 {
            return chunk;
        }

        self.residue.extend_from_slice(&chunk);
        let whole = self.residue.len() - self.residue.len() % frame;
        self.residue.split_to(whole).freeze()
    }

    // Lay PCM out for the wire.
    fn to_wire(&self, pcm: Bytes) -> Bytes {
        let clock = self.clock();
        let volume = self.shared.volume.load(Ordering::Relaxed);
        let pcm = if self.config.use_alc && volume < 100 && clock.bits == 16 {
            Bytes::from(scale_volume(&pcm, volume))
        } else {
            pcm
        };

        if clock.slot_mode == SlotMode::Mono && self.output.two_slot() {
            let width = clock.music_info().bytes_per_sample();
            Bytes::from(route_mono(&pcm, width, clock.slot_mask))
        } else {
            pcm
        }
    }

    fn underrun(&mut self, ctx: &mut ElementContext) -> Result<()> {
        let silence = vec![0u8; self.max_write()];
        self.underruns += 1;
        tracing::debug!(
            "{}: underrun {}, {} bytes of silence",
            ctx.name(),
            self.underruns,
            silence.len()
        );
        self.write_all(ctx, &silence)
    }

    fn send(&mut self, ctx: &mut ElementContext, wire: &[u8]) -> Result<()> {
        let max = self.max_write();
        for piece in wire.chunks(max) {
            self.write_all(ctx, piece)?;
        }
        Ok(())
    }

    fn write_all(&mut self, ctx: &mut ElementContext, mut pcm: &[u8]) -> Result<()> {
        let mut stalled = 0;
        while !pcm.is_empty() {
            let n = self
                .output
                .write(pcm)
                .inspect_err(|_| ctx.mark_fault(ElementErrorKind::Output))?;
            if n == 0 {
                stalled += 1;
                if stalled > MAX_STALLED_WRITES {
                    ctx.mark_fault(ElementErrorKind::Timeout);
                    return Err(Error::Output(format!(
                        "{} accepted no data",
                        self.output.name()
                    )));
                }
                if ctx.is_stopping() {
                    return Err(Error::Aborted);
                }
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            stalled = 0;
            self.bytes_written += n as u64;
            pcm = &pcm[n..];
        }
        Ok(())
    }
}

impl<O: AudioOutput> ElementBody for I2sWriter<O> {
    fn role(&self) -> ElementRole {
        ElementRole::Sink
    }

    fn open(&mut self, ctx: &mut ElementContext) -> Result<()> {
        self.applied = None;
        self.residue.clear();
        self.apply_clock(ctx)
    }

    fn process(&mut self, ctx: &mut ElementContext) -> Result<Flow> {
        let chunk = match self.next_chunk(ctx)? {
            ChunkRead::Data(chunk) => chunk,
            ChunkRead::Timeout => {
                self.apply_clock(ctx)?;
                self.underrun(ctx)?;
                return Ok(Flow::Continue);
            }
            ChunkRead::Done => {
                if !self.residue.is_empty() {
                    tracing::debug!(
                        "{}: dropping {} byte partial frame at end of stream",
                        ctx.name(),
                        self.residue.len()
                    );
                    self.residue.clear();
                }
                return Ok(Flow::Done);
            }
        };

        self.apply_clock(ctx)?;
        let pcm = self.whole_frames(chunk);
        if !pcm.is_empty() {
            let wire = self.to_wire(pcm);
            self.send(ctx, &wire)?;
        }
        Ok(Flow::Continue)
    }

    fn close(&mut self, ctx: &mut ElementContext) -> Result<()> {
        tracing::debug!(
            "{}: {} bytes written, {} underruns",
            ctx.name(),
            self.bytes_written,
            self.underruns
        );
        self.output.flush()
    }

    fn initial_info(&self) -> Option<MusicInfo> {
        Some(self.config.clock.music_info())
    }

    fn name(&self) -> &str {
        "i2s"
    }
}

// Spread mono samples over left/right slots, zeroing slots outside `mask`.
fn route_mono(pcm: &[u8], width: usize, mask: SlotMask) -> Vec<u8> {
    let silent = [0u8; 4];
    let mut out = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm.chunks_exact(width) {
        for used in [mask.left(), mask.right()] {
            if used {
                out.extend_from_slice(sample);
            } else {
                out.extend_from_slice(&silent[..width]);
            }
        }
    }
    out
}

// Scale 16 bit little-endian samples by `percent`.
fn scale_volume(pcm: &[u8], percent: u8) -> Vec<u8> {
    let gain = percent as i32;
    let mut out = Vec::with_capacity(pcm.len());
    let mut samples = pcm.chunks_exact(2);
    for s in &mut samples {
        let v = i16::from_le_bytes([s[0], s[1]]) as i32 * gain / 100;
        out.extend_from_slice(&(v as i16).to_le_bytes());
    }
    out.extend_from_slice(samples.remainder());
    out
}
