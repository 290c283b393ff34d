//! Host speaker output using cpal.

use super::AudioOutput;
use crate::config::ClockConfig;
use crate::error::{Error, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Queue bound, in seconds of audio at the current clock.
const MAX_QUEUED_SECS: f32 = 0.25;
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

enum StreamRequest {
    Open(ClockConfig, kanal::Sender<Result<()>>),
    Close,
}

/// Plays PCM on the host's default output device.
///
/// The cpal stream lives on its own thread; writes convert PCM to `f32`
/// samples and queue them for the device callback. Like an I2S bus the
/// device always runs two slots, so mono arrives already routed by the
/// writer.
pub struct CpalOutput {
    queue: SampleQueue,
    requests: kanal::Sender<StreamRequest>,
    worker: Option<JoinHandle<()>>,
    clock: Option<ClockConfig>,
    carry: Vec<u8>,
    max_queued: usize,
}

impl CpalOutput {
    /// Start the stream thread. The device is opened on `configure`.
    pub fn new() -> Result<Self> {
        let queue: SampleQueue = Arc::default();
        let (requests, rx) = kanal::bounded(4);

        let worker = {
            let queue = queue.clone();
            thread::Builder::new()
                .name("cpal-output".into())
                .spawn(move || stream_thread(queue, rx))?
        };

        Ok(Self {
            queue,
            requests,
            worker: Some(worker),
            clock: None,
            carry: Vec::new(),
            max_queued: 0,
        })
    }

    fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn wait_for_room(&self) -> Result<()> {
        let deadline = Instant::now() + STALL_TIMEOUT;
        while self.queued() > self.max_queued {
            if Instant::now() > deadline {
                return Err(Error::Output("audio device stopped consuming".into()));
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn configure(&mut self, clock: &ClockConfig) -> Result<()> {
        if self.clock == Some(*clock) {
            return Ok(());
        }
        self.flush()?;

        let (reply_tx, reply_rx) = kanal::bounded(1);
        self.requests
            .send(StreamRequest::Open(*clock, reply_tx))
            .map_err(|_| Error::Output("stream thread exited".into()))?;
        reply_rx
            .recv_timeout(STALL_TIMEOUT)
            .map_err(|_| Error::Output("stream thread did not answer".into()))??;

        self.clock = Some(*clock);
        self.carry.clear();
        self.max_queued =
            (clock.sample_rate as f32 * wire_channels(clock) as f32 * MAX_QUEUED_SECS) as usize;
        tracing::info!("cpal output running at {}", clock.music_info());
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let clock = self
            .clock
            .ok_or_else(|| Error::Output("write before configure".into()))?;
        let width = clock.music_info().bytes_per_sample();

        self.carry.extend_from_slice(pcm);
        let whole = self.carry.len() - self.carry.len() % width;
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.extend(self.carry[..whole].chunks_exact(width).map(to_f32));
        }
        self.carry.drain(..whole);

        self.wait_for_room()?;
        Ok(pcm.len())
    }

    fn flush(&mut self) -> Result<()> {
        let deadline = Instant::now() + STALL_TIMEOUT;
        while self.queued() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn two_slot(&self) -> bool {
        true
    }

    fn is_paced(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.requests.send(StreamRequest::Close);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn wire_channels(clock: &ClockConfig) -> u16 {
    clock.channels.max(2)
}

fn to_f32(sample: &[u8]) -> f32 {
    match sample.len() {
        1 => (sample[0] as f32 - 128.0) / 128.0,
        2 => i16::from_le_bytes([sample[0], sample[1]]) as f32 / 32768.0,
        3 => {
            let v = i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        _ => i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]) as f32 / 2_147_483_648.0,
    }
}

fn stream_thread(queue: SampleQueue, requests: kanal::Receiver<StreamRequest>) {
    let mut stream: Option<cpal::Stream> = None;

    while let Ok(request) = requests.recv() {
        match request {
            StreamRequest::Open(clock, reply) => {
                stream = None;
                let result = open_stream(&clock, queue.clone()).map(|s| {
                    stream = Some(s);
                });
                let _ = reply.send(result);
            }
            StreamRequest::Close => break,
        }
    }

    drop(stream);
}

fn open_stream(clock: &ClockConfig, queue: SampleQueue) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Output("no audio output device found".into()))?;

    let config = StreamConfig {
        channels: wire_channels(clock),
        sample_rate: cpal::SampleRate(clock.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |err| tracing::error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::Output(format!("failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| Error::Output(format!("failed to start playback: {}", e)))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion() {
        assert_eq!(to_f32(&[0x00, 0x00]), 0.0);
        assert_eq!(to_f32(&[0x00, 0x80]), -1.0);
        assert_eq!(to_f32(&[128]), 0.0);
        assert!((to_f32(&[0xff, 0xff, 0x7f]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mono_runs_two_slots() {
        assert_eq!(wire_channels(&ClockConfig::new(16_000, 16, 1)), 2);
        assert_eq!(wire_channels(&ClockConfig::new(44_100, 16, 2)), 2);
    }
}
