//! Network-backed source.

use super::{ReadResult, ReadSource};
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// A source reading an encoded stream from a TCP connection.
///
/// Connects lazily on the first read. No single read waits longer than its
/// timeout, connecting included: a connect attempt that runs out of time
/// is reported as [`ReadResult::Timeout`] and retried by the next read
/// until the connect timeout has passed since the first attempt. The
/// per-read wait is applied as the socket read timeout. A closed
/// connection is end of stream.
pub struct TcpStreamSource {
    name: String,
    addr: SocketAddr,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    connect_deadline: Option<Instant>,
    bytes_read: u64,
}

impl TcpStreamSource {
    /// Create a source that will connect to `addr`.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config("invalid address".into()))?;

        Ok(Self {
            name: format!("tcp:{}", addr),
            addr,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            connect_deadline: None,
            bytes_read: 0,
        })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let addr = stream.peer_addr()?;
        Ok(Self {
            name: format!("tcp:{}", addr),
            addr,
            stream: Some(stream),
            connect_timeout: Duration::from_secs(5),
            connect_deadline: None,
            bytes_read: 0,
        })
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    // Try to connect for at most `timeout`. `false` means out of time for
    // this attempt.
    fn try_connect(&mut self, timeout: Duration) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(true);
        }

        let deadline = *self
            .connect_deadline
            .get_or_insert_with(|| Instant::now() + self.connect_timeout);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::TimedOut,
                format!("{}: connect timed out", self.name),
            )));
        }

        // A zero timeout is rejected by the socket API.
        let attempt = timeout.min(remaining).max(Duration::from_millis(1));
        match TcpStream::connect_timeout(&self.addr, attempt) {
            Ok(stream) => {
                tracing::debug!("{} connected", self.name);
                self.stream = Some(stream);
                self.connect_deadline = None;
                Ok(true)
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                tracing::trace!("{} connect attempt timed out", self.name);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl ReadSource for TcpStreamSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<ReadResult> {
        if buf.is_empty() {
            return Ok(ReadResult::Data(0));
        }

        if !self.try_connect(timeout)? {
            return Ok(ReadResult::Timeout);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Element("tcp stream not connected".into()));
        };
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        match stream.read(buf) {
            Ok(0) => Ok(ReadResult::Done),
            Ok(n) => {
                self.bytes_read += n as u64;
                Ok(ReadResult::Data(n))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadResult::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_source_reads_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(&[3u8; 1000]).unwrap();
        });

        let mut source = TcpStreamSource::connect(addr).unwrap();
        let mut buf = [0u8; 256];
        let mut total = 0;

        loop {
            match source.read(&mut buf, Duration::from_millis(200)).unwrap() {
                ReadResult::Data(n) => total += n,
                ReadResult::Timeout => continue,
                ReadResult::Done => break,
            }
        }

        server.join().unwrap();
        assert_eq!(total, 1000);
        assert_eq!(source.bytes_read(), 1000);
    }

    #[test]
    fn test_tcp_source_times_out_without_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (_server_side, _) = listener.accept().unwrap();

        let mut source = TcpStreamSource::from_stream(client).unwrap();
        let mut buf = [0u8; 16];
        let result = source.read(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(result, ReadResult::Timeout);
    }

    #[test]
    fn test_unreachable_peer_does_not_block_a_read() {
        // Reserved documentation range, never routed.
        let mut source = TcpStreamSource::connect("192.0.2.1:9").unwrap();
        let mut buf = [0u8; 16];

        let start = Instant::now();
        let result = source.read(&mut buf, Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(1));
        // Depending on the host this is a timeout or an unreachable error.
        assert!(!matches!(result, Ok(ReadResult::Data(_))));
    }

    #[test]
    fn test_connect_gives_up_after_connect_timeout() {
        let mut source = TcpStreamSource::connect("192.0.2.1:9")
            .unwrap()
            .with_connect_timeout(Duration::from_millis(100));
        let mut buf = [0u8; 16];

        let start = Instant::now();
        let failed = loop {
            match source.read(&mut buf, Duration::from_millis(30)) {
                Ok(ReadResult::Timeout) => continue,
                Ok(other) => panic!("unexpected read result {:?}", other),
                Err(e) => break e,
            }
        };
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(failed, Error::Io(_)));
    }

    #[test]
    fn test_refused_connection_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let mut source = TcpStreamSource::connect(addr).unwrap();
        let mut buf = [0u8; 16];
        assert!(source.read(&mut buf, Duration::from_millis(200)).is_err());
    }
}
