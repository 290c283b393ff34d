//! Input and output ports of a running element.
//!
//! Adjacent stages are joined by a bounded kanal channel carrying
//! [`LinkMessage`]s. A full link stalls the producer and an empty link
//! stalls the consumer; both waits are sliced by the poll interval so a
//! stop request is noticed promptly.

use super::handle::ElementShared;
use crate::error::{Error, Result};
use crate::io::{ReadResult, ReadSource};
use bytes::Bytes;
use kanal::{ReceiveErrorTimeout, SendErrorTimeout};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A unit travelling over a link between two stages.
#[derive(Debug, Clone)]
pub(crate) enum LinkMessage {
    /// A chunk of stream bytes.
    Data(Bytes),
    /// The upstream stage consumed all of its input.
    Eos,
    /// The upstream stage failed; no more data will follow.
    Abort,
}

/// Create a bounded link.
pub(crate) fn link(capacity: usize) -> (kanal::Sender<LinkMessage>, kanal::Receiver<LinkMessage>) {
    kanal::bounded(capacity.max(1))
}

/// Outcome of a chunk read bounded by a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    /// Between one byte and the requested maximum.
    Data(Bytes),
    /// End of stream.
    Done,
    /// Nothing arrived before the timeout.
    Timeout,
}

// Outcome of one wait on the input.
enum Wait<T> {
    Ready(T),
    Done,
    Expired,
}

enum InputKind {
    Source {
        source: Box<dyn ReadSource>,
        max_read: usize,
    },
    Link {
        rx: kanal::Receiver<LinkMessage>,
        pending: Bytes,
    },
}

/// Where a stage reads its input from.
///
/// Either a custom [`ReadSource`] or the link from the previous stage.
/// Reads block until data, end of stream, or a stop request arrives. A
/// custom source is never asked for more than the pipeline's chunk size
/// at once.
pub struct InputPort {
    kind: InputKind,
    shared: Arc<ElementShared>,
    poll: Duration,
    done: bool,
    bytes_read: u64,
}

impl InputPort {
    pub(crate) fn from_source(
        source: Box<dyn ReadSource>,
        shared: Arc<ElementShared>,
        poll: Duration,
        max_read: usize,
    ) -> Self {
        Self {
            kind: InputKind::Source {
                source,
                max_read: max_read.max(1),
            },
            shared,
            poll,
            done: false,
            bytes_read: 0,
        }
    }

    pub(crate) fn from_link(
        rx: kanal::Receiver<LinkMessage>,
        shared: Arc<ElementShared>,
        poll: Duration,
    ) -> Self {
        Self {
            kind: InputKind::Link {
                rx,
                pending: Bytes::new(),
            },
            shared,
            poll,
            done: false,
            bytes_read: 0,
        }
    }

    /// Check if end of stream was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Get the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read into `buf`.
    ///
    /// Returns `Data(n)` with `n > 0` or `Done`; never `Timeout`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadResult> {
        if buf.is_empty() {
            return Ok(ReadResult::Data(0));
        }
        if self.done {
            return Ok(ReadResult::Done);
        }

        let wait = match &mut self.kind {
            InputKind::Source { source, max_read } => {
                let len = buf.len().min(*max_read);
                read_source(source.as_mut(), &mut buf[..len], &self.shared, self.poll, None)?
            }
            InputKind::Link { rx, pending } => {
                match fill_pending(rx, pending, &self.shared, self.poll, None, &mut self.done)? {
                    Wait::Ready(()) => {
                        let n = buf.len().min(pending.len());
                        buf[..n].copy_from_slice(&pending.split_to(n));
                        Wait::Ready(n)
                    }
                    Wait::Done => Wait::Done,
                    Wait::Expired => Wait::Expired,
                }
            }
        };

        match wait {
            Wait::Ready(n) => {
                self.bytes_read += n as u64;
                Ok(ReadResult::Data(n))
            }
            Wait::Done => {
                self.done = true;
                Ok(ReadResult::Done)
            }
            Wait::Expired => Ok(ReadResult::Timeout),
        }
    }

    /// Read at most `max` bytes as a shared chunk. `None` is end of stream.
    pub fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        match self.read_chunk_until(max, None)? {
            ChunkRead::Data(chunk) => Ok(Some(chunk)),
            ChunkRead::Done | ChunkRead::Timeout => Ok(None),
        }
    }

    /// Like [`read_chunk`](Self::read_chunk), but gives up after `timeout`.
    pub fn read_chunk_timeout(&mut self, max: usize, timeout: Duration) -> Result<ChunkRead> {
        self.read_chunk_until(max, Some(Instant::now() + timeout))
    }

    fn read_chunk_until(&mut self, max: usize, deadline: Option<Instant>) -> Result<ChunkRead> {
        if max == 0 {
            return Ok(ChunkRead::Data(Bytes::new()));
        }
        if self.done {
            return Ok(ChunkRead::Done);
        }

        let wait = match &mut self.kind {
            InputKind::Source { source, max_read } => {
                let mut buf = vec![0u8; max.min(*max_read)];
                match read_source(source.as_mut(), &mut buf, &self.shared, self.poll, deadline)? {
                    Wait::Ready(n) => {
                        buf.truncate(n);
                        Wait::Ready(Bytes::from(buf))
                    }
                    Wait::Done => Wait::Done,
                    Wait::Expired => Wait::Expired,
                }
            }
            InputKind::Link { rx, pending } => {
                match fill_pending(rx, pending, &self.shared, self.poll, deadline, &mut self.done)? {
                    Wait::Ready(()) => Wait::Ready(pending.split_to(max.min(pending.len()))),
                    Wait::Done => Wait::Done,
                    Wait::Expired => Wait::Expired,
                }
            }
        };

        match wait {
            Wait::Ready(chunk) => {
                self.bytes_read += chunk.len() as u64;
                Ok(ChunkRead::Data(chunk))
            }
            Wait::Done => {
                self.done = true;
                Ok(ChunkRead::Done)
            }
            Wait::Expired => Ok(ChunkRead::Timeout),
        }
    }
}

// Length of the next wait slice, or `None` once `deadline` has passed.
fn next_slice(poll: Duration, deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        None => Some(poll),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            (!left.is_zero()).then(|| left.min(poll))
        }
    }
}

// Loop until the source yields bytes, reports end of stream, or the
// deadline passes.
fn read_source(
    source: &mut dyn ReadSource,
    buf: &mut [u8],
    shared: &ElementShared,
    poll: Duration,
    deadline: Option<Instant>,
) -> Result<Wait<usize>> {
    loop {
        if shared.control.is_stopping() {
            return Err(Error::Aborted);
        }
        let Some(slice) = next_slice(poll, deadline) else {
            return Ok(Wait::Expired);
        };
        match source.read(buf, slice)? {
            ReadResult::Data(0) | ReadResult::Timeout => continue,
            ReadResult::Data(n) => return Ok(Wait::Ready(n)),
            ReadResult::Done => return Ok(Wait::Done),
        }
    }
}

// Wait until `pending` holds bytes. An abort marker also ends the stream.
fn fill_pending(
    rx: &kanal::Receiver<LinkMessage>,
    pending: &mut Bytes,
    shared: &ElementShared,
    poll: Duration,
    deadline: Option<Instant>,
    done: &mut bool,
) -> Result<Wait<()>> {
    while pending.is_empty() {
        if shared.control.is_stopping() {
            return Err(Error::Aborted);
        }
        let Some(slice) = next_slice(poll, deadline) else {
            return Ok(Wait::Expired);
        };
        match rx.recv_timeout(slice) {
            Ok(LinkMessage::Data(bytes)) => *pending = bytes,
            Ok(LinkMessage::Eos) => return Ok(Wait::Done),
            Ok(LinkMessage::Abort) => {
                *done = true;
                return Err(Error::Element("upstream stage failed".into()));
            }
            Err(ReceiveErrorTimeout::Timeout) => continue,
            Err(_) => return Err(Error::ChannelClosed),
        }
    }
    Ok(Wait::Ready(()))
}

impl io::Read for InputPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match InputPort::read(self, buf) {
            Ok(ReadResult::Data(n)) => Ok(n),
            Ok(ReadResult::Done | ReadResult::Timeout) => Ok(0),
            Err(Error::Aborted) => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                Error::Aborted,
            )),
            Err(Error::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            InputKind::Source { source, .. } => source.name().to_string(),
            InputKind::Link { .. } => "link".to_string(),
        };
        f.debug_struct("InputPort")
            .field("kind", &kind)
            .field("done", &self.done)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

/// Where a stage writes its output: the link to the next stage.
pub struct OutputPort {
    tx: kanal::Sender<LinkMessage>,
    shared: Arc<ElementShared>,
    poll: Duration,
    bytes_written: u64,
}

impl OutputPort {
    pub(crate) fn new(
        tx: kanal::Sender<LinkMessage>,
        shared: Arc<ElementShared>,
        poll: Duration,
    ) -> Self {
        Self {
            tx,
            shared,
            poll,
            bytes_written: 0,
        }
    }

    /// Get the number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Send a chunk, waiting for space in the link.
    pub fn write(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let len = chunk.len() as u64;
        self.send(LinkMessage::Data(chunk))?;
        self.bytes_written += len;
        Ok(())
    }

    /// Mark end of stream.
    pub(crate) fn finish(&mut self) -> Result<()> {
        self.send(LinkMessage::Eos)
    }

    /// Tell the next stage no more data will come after a failure.
    ///
    /// Gives up on a full link after one poll interval.
    pub(crate) fn abort(&mut self) {
        if self.tx.send_timeout(LinkMessage::Abort, self.poll).is_err() {
            tracing::debug!("could not deliver abort marker downstream");
        }
    }

    fn send(&mut self, msg: LinkMessage) -> Result<()> {
        loop {
            if self.shared.control.is_stopping() {
                return Err(Error::Aborted);
            }
            // A timed out send drops its message, so each attempt sends a
            // cheap clone.
            match self.tx.send_timeout(msg.clone(), self.poll) {
                Ok(()) => return Ok(()),
                Err(SendErrorTimeout::Timeout) => continue,
                Err(_) => return Err(Error::ChannelClosed),
            }
        }
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("bytes_written", &self.bytes_written)
            .field("queued", &self.tx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::AssetStream;
    use std::io::Read;
    use std::thread;

    const POLL: Duration = Duration::from_millis(5);

    fn shared() -> Arc<ElementShared> {
        Arc::new(ElementShared::new())
    }

    #[test]
    fn test_source_port_reads_to_done() {
        let asset = AssetStream::new(vec![1u8; 10]);
        let mut port = InputPort::from_source(Box::new(asset), shared(), POLL, 4096);
        let mut buf = [0u8; 4];

        assert_eq!(port.read(&mut buf).unwrap(), ReadResult::Data(4));
        assert_eq!(port.read(&mut buf).unwrap(), ReadResult::Data(4));
        assert_eq!(port.read(&mut buf).unwrap(), ReadResult::Data(2));
        assert_eq!(port.read(&mut buf).unwrap(), ReadResult::Done);
        assert!(port.is_done());
        assert_eq!(port.bytes_read(), 10);
    }

    #[test]
    fn test_source_port_read_chunk() {
        let asset = AssetStream::new(vec![7u8; 6]);
        let mut port = InputPort::from_source(Box::new(asset), shared(), POLL, 4096);

        assert_eq!(port.read_chunk(4).unwrap().unwrap().len(), 4);
        assert_eq!(port.read_chunk(4).unwrap().unwrap().as_ref(), &[7u8, 7]);
        assert!(port.read_chunk(4).unwrap().is_none());
    }

    #[test]
    fn test_source_reads_capped_at_max_read() {
        let asset = AssetStream::new(vec![9u8; 10]);
        let mut port = InputPort::from_source(Box::new(asset), shared(), POLL, 3);
        let mut buf = [0u8; 8];

        assert_eq!(port.read(&mut buf).unwrap(), ReadResult::Data(3));
        assert_eq!(port.read_chunk(8).unwrap().unwrap().len(), 3);
        assert_eq!(port.bytes_read(), 6);
    }

    #[test]
    fn test_read_chunk_timeout_on_idle_link() {
        let (tx, rx) = link(2);
        let mut output = OutputPort::new(tx, shared(), POLL);
        let mut input = InputPort::from_link(rx, shared(), POLL);

        let start = std::time::Instant::now();
        assert_eq!(
            input.read_chunk_timeout(4, Duration::from_millis(30)).unwrap(),
            ChunkRead::Timeout
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!input.is_done());

        output.write(Bytes::from_static(b"pcm")).unwrap();
        output.finish().unwrap();
        assert_eq!(
            input.read_chunk_timeout(4, Duration::from_millis(30)).unwrap(),
            ChunkRead::Data(Bytes::from_static(b"pcm"))
        );
        assert_eq!(
            input.read_chunk_timeout(4, Duration::from_millis(30)).unwrap(),
            ChunkRead::Done
        );
        assert!(input.is_done());
    }

    #[test]
    fn test_link_preserves_bytes_and_order() {
        let (tx, rx) = link(2);
        let writer_shared = shared();
        let mut output = OutputPort::new(tx, writer_shared, POLL);
        let mut input = InputPort::from_link(rx, shared(), POLL);

        let producer = thread::spawn(move || {
            for i in 0..5u8 {
                output.write(Bytes::from(vec![i; 3])).unwrap();
            }
            output.finish().unwrap();
            output.bytes_written()
        });

        let mut received = Vec::new();
        input.read_to_end(&mut received).unwrap();

        assert_eq!(producer.join().unwrap(), 15);
        assert_eq!(received, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn test_partial_chunk_reads() {
        let (tx, rx) = link(2);
        let mut output = OutputPort::new(tx, shared(), POLL);
        let mut input = InputPort::from_link(rx, shared(), POLL);

        output.write(Bytes::from_static(b"abcdef")).unwrap();
        output.finish().unwrap();

        assert_eq!(input.read_chunk(4).unwrap().unwrap().as_ref(), b"abcd");
        assert_eq!(input.read_chunk(4).unwrap().unwrap().as_ref(), b"ef");
        assert!(input.read_chunk(4).unwrap().is_none());
    }

    #[test]
    fn test_stop_aborts_blocked_read() {
        let (_tx, rx) = link(1);
        let reader_shared = shared();
        let mut input = InputPort::from_link(rx, reader_shared.clone(), POLL);

        reader_shared.control.request_stop();
        assert!(matches!(input.read_chunk(16), Err(Error::Aborted)));
    }

    #[test]
    fn test_stop_aborts_blocked_write() {
        let (tx, _rx) = link(1);
        let writer_shared = shared();
        let mut output = OutputPort::new(tx, writer_shared.clone(), POLL);

        output.write(Bytes::from_static(b"x")).unwrap();

        let stopper = {
            let writer_shared = writer_shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                writer_shared.control.request_stop();
            })
        };

        // Link is full; this blocks until the stop request lands.
        assert!(matches!(
            output.write(Bytes::from_static(b"y")),
            Err(Error::Aborted)
        ));
        stopper.join().unwrap();
    }

    #[test]
    fn test_abort_marker_fails_reader() {
        let (tx, rx) = link(1);
        let mut output = OutputPort::new(tx, shared(), POLL);
        let mut input = InputPort::from_link(rx, shared(), POLL);

        output.abort();
        assert!(matches!(input.read_chunk(8), Err(Error::Element(_))));
        assert!(input.is_done());
    }
}
