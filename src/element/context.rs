//! Element runtime context.
//!
//! The context is handed to an [`ElementBody`](super::ElementBody) on its
//! worker thread and provides the element's ports, its event sender and
//! its shared state.

use super::handle::{ElementId, ElementShared};
use super::port::{ChunkRead, InputPort, OutputPort};
use super::state::{ElementErrorKind, ElementState, ElementStatus};
use crate::error::{Error, Result};
use crate::event::{EventCommand, EventMessage, EventSender, SourceRef};
use crate::format::MusicInfo;
use crate::io::ReadResult;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Runtime context for one run of an element.
pub struct ElementContext {
    source: SourceRef,
    shared: Arc<ElementShared>,
    input: Option<InputPort>,
    output: Option<OutputPort>,
    events: Option<EventSender>,
    fault: Option<ElementErrorKind>,
    input_done_reported: bool,
}

impl ElementContext {
    pub(crate) fn new(
        source: SourceRef,
        shared: Arc<ElementShared>,
        input: Option<InputPort>,
        output: Option<OutputPort>,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            source,
            shared,
            input,
            output,
            events,
            fault: None,
            input_done_reported: false,
        }
    }

    /// Get the element's name.
    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Get the element's id.
    pub fn id(&self) -> ElementId {
        self.source.id
    }

    /// Check if the pipeline asked this element to stop.
    pub fn is_stopping(&self) -> bool {
        self.shared.control.is_stopping()
    }

    /// Get the format metadata last reported by this element.
    pub fn info(&self) -> MusicInfo {
        self.shared.info()
    }

    /// Check if this run has an input port left.
    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    /// Check if this run has a downstream link.
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Take ownership of the input port, e.g. to hand it to a decoder.
    pub fn take_input(&mut self) -> Option<InputPort> {
        self.input.take()
    }

    /// Read into `buf` from the input port.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadResult> {
        let input = self.input.as_mut().ok_or_else(|| no_port("input"))?;
        let result = input.read(buf);
        self.after_read(result.as_ref().map(|r| r.is_done()));
        result
    }

    /// Read at most `max` bytes from the input port as a shared chunk.
    pub fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>> {
        let input = self.input.as_mut().ok_or_else(|| no_port("input"))?;
        let result = input.read_chunk(max);
        self.after_read(result.as_ref().map(|c| c.is_none()));
        result
    }

    /// Read a chunk, giving up after `timeout` with [`ChunkRead::Timeout`].
    pub fn read_chunk_timeout(&mut self, max: usize, timeout: Duration) -> Result<ChunkRead> {
        let input = self.input.as_mut().ok_or_else(|| no_port("input"))?;
        let result = input.read_chunk_timeout(max, timeout);
        self.after_read(result.as_ref().map(|c| *c == ChunkRead::Done));
        result
    }

    /// Write a copy of `data` downstream.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.write_bytes(Bytes::copy_from_slice(data))
    }

    /// Write a shared chunk downstream.
    pub fn write_bytes(&mut self, chunk: Bytes) -> Result<()> {
        let output = self.output.as_mut().ok_or_else(|| no_port("output"))?;
        output.write(chunk).inspect_err(|e| {
            if !e.is_aborted() {
                self.fault.get_or_insert(ElementErrorKind::Output);
            }
        })
    }

    /// Bytes written downstream during this run.
    pub fn bytes_written(&self) -> u64 {
        self.output.as_ref().map_or(0, |o| o.bytes_written())
    }

    /// Publish a new output format.
    ///
    /// Updates [`Element::info`](super::Element::info) and notifies the
    /// listener, if any.
    pub fn report_info(&mut self, info: MusicInfo) {
        self.shared.set_info(info);
        tracing::info!("{}: music info {}", self.source.name, info);
        self.send(EventCommand::ReportMusicInfo(info));
    }

    /// Update the stored format without notifying anyone.
    pub fn set_info(&mut self, info: MusicInfo) {
        self.shared.set_info(info);
    }

    /// Notify the listener of a status change.
    pub fn report_status(&mut self, status: ElementStatus) {
        self.send(EventCommand::ReportStatus(status));
    }

    /// Notify the listener of how much has been written so far.
    pub fn report_position(&mut self) {
        let bytes = self.bytes_written();
        self.send(EventCommand::ReportPosition { bytes });
    }

    /// Record `kind` as the failing phase unless one is already known.
    pub fn mark_fault(&mut self, kind: ElementErrorKind) {
        self.fault.get_or_insert(kind);
    }

    pub(crate) fn fault(&self) -> Option<ElementErrorKind> {
        self.fault
    }

    pub(crate) fn control(&self) -> &super::ElementControl {
        &self.shared.control
    }

    /// Move to `state` and report the matching status.
    pub(crate) fn enter(&mut self, state: ElementState, status: ElementStatus) {
        if self.shared.transition(&self.source.name, state) {
            self.report_status(status);
        }
    }

    pub(crate) fn finish_output(&mut self) -> Result<()> {
        match self.output.as_mut() {
            Some(output) => output.finish(),
            None => Ok(()),
        }
    }

    pub(crate) fn abort_output(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.abort();
        }
    }

    fn after_read(&mut self, result: std::result::Result<bool, &Error>) {
        match result {
            Ok(true) if !self.input_done_reported => {
                self.input_done_reported = true;
                tracing::debug!("{}: input done", self.source.name);
                self.report_status(ElementStatus::InputDone);
            }
            Ok(_) => {}
            Err(e) if !e.is_aborted() => self.mark_fault(ElementErrorKind::Input),
            Err(_) => {}
        }
    }

    fn send(&self, command: EventCommand) {
        if let Some(events) = &self.events {
            events.send(EventMessage::from_element(self.source.clone(), command));
        }
    }
}

fn no_port(which: &str) -> Error {
    Error::Element(format!("element has no {} port", which))
}

impl std::fmt::Debug for ElementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementContext")
            .field("name", &self.source.name)
            .field("has_input", &self.input.is_some())
            .field("has_output", &self.output.is_some())
            .field("has_listener", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventIfaceConfig;
    use crate::event::EventIface;
    use crate::io::AssetStream;

    fn context(iface: &EventIface, asset: &'static [u8]) -> ElementContext {
        let shared = Arc::new(ElementShared::new());
        let input = InputPort::from_source(
            Box::new(AssetStream::from_static(asset)),
            shared.clone(),
            Duration::from_millis(5),
            4096,
        );
        let source = SourceRef {
            id: ElementId::next(),
            name: Arc::from("dec"),
        };
        ElementContext::new(source, shared, Some(input), None, Some(iface.sender()))
    }

    #[test]
    fn test_input_done_reported_once() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let mut ctx = context(&iface, b"abc");
        let mut buf = [0u8; 8];

        assert_eq!(ctx.read(&mut buf).unwrap(), ReadResult::Data(3));
        assert_eq!(ctx.read(&mut buf).unwrap(), ReadResult::Done);
        assert_eq!(ctx.read(&mut buf).unwrap(), ReadResult::Done);

        let msg = iface.listen(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!(
            msg.command,
            EventCommand::ReportStatus(ElementStatus::InputDone)
        );
        assert_eq!(iface.pending(), 0);
    }

    #[test]
    fn test_report_info_updates_shared_state() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let mut ctx = context(&iface, b"");
        let info = MusicInfo::cd();

        ctx.report_info(info);

        assert_eq!(ctx.info(), info);
        let msg = iface.listen(Some(Duration::from_millis(10))).unwrap().unwrap();
        assert_eq!(msg.command, EventCommand::ReportMusicInfo(info));
        assert!(msg.is_from(ctx.id()));
    }

    #[test]
    fn test_write_without_output_fails() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let mut ctx = context(&iface, b"");
        assert!(matches!(ctx.write(b"pcm"), Err(Error::Element(_))));
    }

    #[test]
    fn test_take_input() {
        let iface = EventIface::new(EventIfaceConfig::default());
        let mut ctx = context(&iface, b"xy");
        assert!(ctx.has_input());
        let port = ctx.take_input();
        assert!(port.is_some());
        assert!(!ctx.has_input());
        assert!(ctx.read(&mut [0u8; 2]).is_err());
    }
}
