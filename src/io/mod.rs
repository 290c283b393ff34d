//! Read sources that feed the first stage of a pipeline.
//!
//! A [`ReadSource`] replaces an element's default input acquisition. The
//! decoder stage calls it from its own worker thread with a bounded wait:
//!
//! - `Ok(ReadResult::Data(n))`: `n` bytes were written to the buffer
//! - `Ok(ReadResult::Done)`: the input is exhausted (end of stream)
//! - `Ok(ReadResult::Timeout)`: nothing arrived within the wait, try again
//! - `Err(...)`: the source failed
//!
//! # Adapters
//!
//! - [`AssetStream`]: an in-memory asset, usually `include_bytes!` data
//! - [`FileStream`]: a file (or any `Read`) on the host
//! - [`TcpStreamSource`]: a TCP connection

mod asset;
mod file;
mod tcp;

pub use asset::AssetStream;
pub use file::FileStream;
pub use tcp::TcpStreamSource;

use crate::error::Result;
use std::time::Duration;

/// Outcome of a single [`ReadSource::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// This many bytes were produced.
    Data(usize),
    /// Input exhausted.
    Done,
    /// Nothing available within the wait.
    Timeout,
}

impl ReadResult {
    /// Number of bytes produced, zero for `Done` and `Timeout`.
    pub fn len(&self) -> usize {
        match self {
            ReadResult::Data(n) => *n,
            ReadResult::Done | ReadResult::Timeout => 0,
        }
    }

    /// Whether no bytes were produced.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is the end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        matches!(self, ReadResult::Done)
    }
}

/// A forward-only byte source that honours a bounded wait.
///
/// Sources are moved into the worker thread of the stage that reads them,
/// so any position they keep is plain owned state.
pub trait ReadSource: Send + Sync {
    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadResult>;

    /// Get the name of this source (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<S: ReadSource + ?Sized> ReadSource for Box<S> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadResult> {
        (**self).read(buf, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
