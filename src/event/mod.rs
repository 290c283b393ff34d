//! Event channel between running elements and a single listener.
//!
//! Elements report lifecycle statuses and stream format discoveries as
//! [`EventMessage`]s. The listener (normally the driver loop) blocks in
//! [`EventIface::listen`] and handles each message exactly once.
//!
//! # Example
//!
//! ```rust
//! use flashplay::config::EventIfaceConfig;
//! use flashplay::event::{EventCommand, EventIface};
//! use std::time::Duration;
//!
//! let iface = EventIface::new(EventIfaceConfig::default());
//!
//! // Nothing pending: a bounded listen returns `None`, not an error.
//! assert!(iface.listen(Some(Duration::from_millis(1))).unwrap().is_none());
//!
//! // Any thread holding a sender can ask the listener to stop.
//! iface.sender().request_stop();
//! let msg = iface.listen(None).unwrap().unwrap();
//! assert!(matches!(msg.command, EventCommand::Stop));
//! ```

use crate::config::EventIfaceConfig;
use crate::element::{ElementId, ElementStatus};
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use kanal::{ReceiveErrorTimeout, SendErrorTimeout};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What kind of object produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// A pipeline element.
    Element,
    /// The pipeline itself.
    Pipeline,
    /// Application code outside the pipeline.
    Application,
}

/// Identity of the element that produced a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    /// Unique element id.
    pub id: ElementId,
    /// Tag or name of the element.
    pub name: Arc<str>,
}

/// Command carried by a message, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCommand {
    /// Leave the event loop.
    Stop,
    /// The source discovered (or changed) its output format.
    ReportMusicInfo(MusicInfo),
    /// The source changed lifecycle state or failed.
    ReportStatus(ElementStatus),
    /// Bytes the source has emitted so far.
    ReportPosition {
        /// Total bytes written downstream.
        bytes: u64,
    },
}

/// A single notification.
#[derive(Debug, Clone)]
pub struct EventMessage {
    /// Kind of producer.
    pub source_type: SourceType,
    /// Producing element, if the producer is an element.
    pub source: Option<SourceRef>,
    /// Command and payload.
    pub command: EventCommand,
}

impl EventMessage {
    /// Build a message from an element.
    pub fn from_element(source: SourceRef, command: EventCommand) -> Self {
        Self {
            source_type: SourceType::Element,
            source: Some(source),
            command,
        }
    }

    /// Build a message from application code.
    pub fn from_application(command: EventCommand) -> Self {
        Self {
            source_type: SourceType::Application,
            source: None,
            command,
        }
    }

    /// Whether the message was produced by the element with this id.
    pub fn is_from(&self, id: ElementId) -> bool {
        self.source_type == SourceType::Element
            && self.source.as_ref().is_some_and(|s| s.id == id)
    }

    /// Name of the producing element, if any.
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name.as_ref())
    }
}

impl fmt::Display for EventMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.source_name().unwrap_or("application");
        match &self.command {
            EventCommand::Stop => write!(f, "{}: stop", from),
            EventCommand::ReportMusicInfo(info) => write!(f, "{}: music info {}", from, info),
            EventCommand::ReportStatus(status) => write!(f, "{}: status {:?}", from, status),
            EventCommand::ReportPosition { bytes } => write!(f, "{}: position {} bytes", from, bytes),
        }
    }
}

/// Sending half of an event channel.
///
/// Cloned into every element worker when a listener is attached.
#[derive(Clone)]
pub struct EventSender {
    tx: kanal::Sender<EventMessage>,
    send_timeout: Duration,
}

impl EventSender {
    /// Send a message, waiting at most the configured send timeout.
    ///
    /// Returns `false` if the message was dropped.
    pub fn send(&self, msg: EventMessage) -> bool {
        match self.tx.send_timeout(msg, self.send_timeout) {
            Ok(()) => true,
            Err(SendErrorTimeout::Timeout) => {
                tracing::warn!("event queue full, dropping message");
                false
            }
            Err(_) => {
                tracing::debug!("event listener gone, dropping message");
                false
            }
        }
    }

    /// Ask the listener to leave its loop.
    pub fn request_stop(&self) -> bool {
        self.send(EventMessage::from_application(EventCommand::Stop))
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

/// The listening end of an event channel.
pub struct EventIface {
    tx: kanal::Sender<EventMessage>,
    rx: kanal::Receiver<EventMessage>,
    config: EventIfaceConfig,
}

impl EventIface {
    /// Create a new event channel.
    pub fn new(config: EventIfaceConfig) -> Self {
        let (tx, rx) = kanal::bounded(config.queue_size.max(1));
        Self { tx, rx, config }
    }

    /// Get a sender for this channel.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            send_timeout: self.config.send_timeout,
        }
    }

    /// Wait for the next message.
    ///
    /// `None` waits without bound. With a timeout, `Ok(None)` means no
    /// message arrived in time.
    pub fn listen(&self, timeout: Option<Duration>) -> Result<Option<EventMessage>> {
        match timeout {
            None => match self.rx.recv() {
                Ok(msg) => Ok(Some(msg)),
                Err(_) => Err(Error::ChannelClosed),
            },
            Some(t) => match self.rx.recv_timeout(t) {
                Ok(msg) => Ok(Some(msg)),
                Err(ReceiveErrorTimeout::Timeout) => Ok(None),
                Err(_) => Err(Error::ChannelClosed),
            },
        }
    }

    /// Number of messages waiting.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Discard every waiting message.
    pub fn clear(&self) -> usize {
        let mut n = 0;
        while let Ok(Some(_)) = self.rx.try_recv() {
            n += 1;
        }
        n
    }
}

impl fmt::Debug for EventIface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventIface")
            .field("pending", &self.pending())
            .field("queue_size", &self.config.queue_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementErrorKind;
    use std::thread;

    fn source(name: &str) -> SourceRef {
        SourceRef {
            id: ElementId::next(),
            name: Arc::from(name),
        }
    }

    #[test]
    fn test_listen_timeout_is_not_an_error() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let result = iface.listen(Some(Duration::from_millis(5))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_per_source_order_is_preserved() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let tx = iface.sender();
        let dec = source("dec");

        let producer = thread::spawn(move || {
            for bytes in 0..10u64 {
                tx.send(EventMessage::from_element(
                    dec.clone(),
                    EventCommand::ReportPosition { bytes },
                ));
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 10 {
            let msg = iface.listen(Some(Duration::from_secs(1))).unwrap().unwrap();
            if let EventCommand::ReportPosition { bytes } = msg.command {
                seen.push(bytes);
            }
        }
        producer.join().unwrap();

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_drops_after_timeout() {
        let iface = EventIface::new(EventIfaceConfig {
            queue_size: 1,
            send_timeout: Duration::from_millis(5),
        });
        let tx = iface.sender();

        assert!(tx.request_stop());
        assert!(!tx.request_stop());
        assert_eq!(iface.pending(), 1);
        assert_eq!(iface.clear(), 1);
    }

    #[test]
    fn test_is_from() {
        let dec = source("dec");
        let i2s = source("i2s");
        let msg = EventMessage::from_element(
            i2s.clone(),
            EventCommand::ReportStatus(ElementStatus::Error(ElementErrorKind::Output)),
        );

        assert!(msg.is_from(i2s.id));
        assert!(!msg.is_from(dec.id));
        assert_eq!(msg.source_name(), Some("i2s"));

        let stop = EventMessage::from_application(EventCommand::Stop);
        assert!(!stop.is_from(i2s.id));
        assert_eq!(stop.to_string(), "application: stop");
    }
}
