//! The application driver: assemble decode -> I2S, run it, react to events.
//!
//! The driver moves through four states:
//!
//! ```text
//! Init ──> Running ──> Draining ──> Stopped
//! ```
//!
//! While `Running` it blocks on the event channel. A format report from any
//! element retunes the I2S clock; a stop request, or the I2S sink reporting
//! that it finished or stopped, moves it to `Draining`. Every other message
//! is logged and ignored.

use crate::board::{AudioBoard, CodecCtrl, CodecMode};
use crate::config::{ClockConfig, PlayerConfig};
use crate::element::{Element, ElementErrorKind, ElementId, ElementStatus};
use crate::elements::{AudioDecoder, DecoderElement, I2sHandle, I2sWriter, decoder_for};
use crate::error::Result;
use crate::event::{EventCommand, EventIface, EventMessage, EventSender, SourceType};
use crate::format::MusicInfo;
use crate::io::ReadSource;
use crate::output::AudioOutput;
use crate::pipeline::Pipeline;
use std::time::Duration;

const DECODER_TAG: &str = "dec";
const SINK_TAG: &str = "i2s";

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverState {
    /// Building the board, pipeline and listener.
    #[default]
    Init,
    /// Streaming and handling events.
    Running,
    /// Stopping and joining the pipeline.
    Draining,
    /// Everything released.
    Stopped,
}

/// Why the event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A `Stop` command arrived.
    StopRequested,
    /// The sink played everything.
    SinkFinished,
    /// The sink was stopped.
    SinkStopped,
    /// The sink failed and the policy stops on sink errors.
    SinkError(ElementErrorKind),
}

/// What the driver does with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Keep listening.
    Continue,
    /// Retune the output clock, then keep listening.
    Reconfigure(MusicInfo),
    /// Leave the loop and tear down.
    Drain(ExitReason),
}

/// The driver's transition table.
///
/// # Example
///
/// ```rust
/// use flashplay::driver::{EventAction, EventPolicy, ExitReason};
/// use flashplay::element::{ElementId, ElementStatus};
/// use flashplay::event::{EventCommand, EventMessage, SourceRef};
///
/// let sink = ElementId::next();
/// let policy = EventPolicy::new(sink);
///
/// let finished = EventMessage::from_element(
///     SourceRef { id: sink, name: "i2s".into() },
///     EventCommand::ReportStatus(ElementStatus::StateFinished),
/// );
/// assert_eq!(policy.decide(&finished), EventAction::Drain(ExitReason::SinkFinished));
/// ```
#[derive(Debug, Clone)]
pub struct EventPolicy {
    sink: ElementId,
    stop_on_sink_error: bool,
}

impl EventPolicy {
    /// Create a policy watching `sink` for terminal statuses.
    pub fn new(sink: ElementId) -> Self {
        Self {
            sink,
            stop_on_sink_error: false,
        }
    }

    /// Also drain when the sink reports an error.
    pub fn with_stop_on_sink_error(mut self, stop: bool) -> Self {
        self.stop_on_sink_error = stop;
        self
    }

    /// Decide what to do with `msg`.
    pub fn decide(&self, msg: &EventMessage) -> EventAction {
        match &msg.command {
            EventCommand::Stop => EventAction::Drain(ExitReason::StopRequested),
            EventCommand::ReportMusicInfo(info) if msg.source_type == SourceType::Element => {
                EventAction::Reconfigure(*info)
            }
            EventCommand::ReportStatus(status) if msg.is_from(self.sink) => match status {
                ElementStatus::StateFinished => EventAction::Drain(ExitReason::SinkFinished),
                ElementStatus::StateStopped => EventAction::Drain(ExitReason::SinkStopped),
                ElementStatus::Error(kind) => {
                    tracing::error!("sink reported {:?} error", kind);
                    if self.stop_on_sink_error {
                        EventAction::Drain(ExitReason::SinkError(*kind))
                    } else {
                        EventAction::Continue
                    }
                }
                other => {
                    tracing::debug!("sink status {:?}", other);
                    EventAction::Continue
                }
            },
            _ => {
                tracing::trace!("ignoring {}", msg);
                EventAction::Continue
            }
        }
    }
}

/// The `Running` state: applies an [`EventPolicy`] to incoming messages.
#[derive(Debug)]
pub struct EventLoop {
    policy: EventPolicy,
    i2s: I2sHandle,
    state: DriverState,
    exit: Option<ExitReason>,
    format_changes: Vec<MusicInfo>,
    messages: u64,
}

impl EventLoop {
    /// Create a loop in the `Running` state.
    pub fn new(policy: EventPolicy, i2s: I2sHandle) -> Self {
        Self {
            policy,
            i2s,
            state: DriverState::Running,
            exit: None,
            format_changes: Vec::new(),
            messages: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Get why the loop ended, once it has.
    pub fn exit(&self) -> Option<ExitReason> {
        self.exit
    }

    /// Handle one message and return the resulting state.
    pub fn handle(&mut self, msg: &EventMessage) -> DriverState {
        self.messages += 1;
        if self.state != DriverState::Running {
            tracing::debug!("not running, dropping {}", msg);
            return self.state;
        }

        match self.policy.decide(msg) {
            EventAction::Continue => {}
            EventAction::Reconfigure(info) => match self.i2s.set_music_info(info) {
                Ok(()) => self.format_changes.push(info),
                Err(e) => tracing::warn!("ignoring unusable format {}: {}", info, e),
            },
            EventAction::Drain(reason) => {
                tracing::info!("leaving event loop: {:?}", reason);
                self.exit = Some(reason);
                self.state = DriverState::Draining;
            }
        }
        self.state
    }

    /// Listen on `iface` until a message moves the loop out of `Running`.
    pub fn run(&mut self, iface: &EventIface, timeout: Option<Duration>) -> Result<()> {
        while self.state == DriverState::Running {
            match iface.listen(timeout)? {
                Some(msg) => {
                    self.handle(&msg);
                }
                None => tracing::trace!("no event within {:?}", timeout),
            }
        }
        Ok(())
    }

    fn into_report(self) -> PlaybackReport {
        PlaybackReport {
            exit: self.exit.unwrap_or(ExitReason::StopRequested),
            format_changes: self.format_changes,
            final_clock: self.i2s.clock(),
            messages: self.messages,
        }
    }
}

/// Summary of one playback.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    /// Why the event loop ended.
    pub exit: ExitReason,
    /// Every format applied to the output, in order.
    pub format_changes: Vec<MusicInfo>,
    /// Output clock at the end.
    pub final_clock: ClockConfig,
    /// Messages handled by the loop.
    pub messages: u64,
}

/// Plays one asset at a time through decode -> I2S.
pub struct Player<B: AudioBoard> {
    config: PlayerConfig,
    board: B,
    iface: EventIface,
    state: DriverState,
}

impl<B: AudioBoard> Player<B> {
    /// Create a player on an initialized board.
    pub fn new(config: PlayerConfig, board: B) -> Result<Self> {
        config.validate()?;
        let iface = EventIface::new(config.event.clone());
        Ok(Self {
            config,
            board,
            iface,
            state: DriverState::Init,
        })
    }

    /// Get the driver state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Get the board.
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Get a sender that can end playback from another thread.
    ///
    /// Only requests sent while a playback is running take effect.
    pub fn stop_handle(&self) -> EventSender {
        self.iface.sender()
    }

    /// Decode `source` with the configured decoder and play it on `output`.
    pub fn play(
        &mut self,
        source: impl ReadSource + 'static,
        output: impl AudioOutput + 'static,
    ) -> Result<PlaybackReport> {
        let decoder = decoder_for(self.config.decoder.kind)?;
        self.play_with(decoder, source, output)
    }

    /// Play `source` through a specific decoder.
    pub fn play_with(
        &mut self,
        decoder: impl AudioDecoder + 'static,
        source: impl ReadSource + 'static,
        output: impl AudioOutput + 'static,
    ) -> Result<PlaybackReport> {
        self.state = DriverState::Init;
        let stale = self.iface.clear();
        if stale > 0 {
            tracing::debug!("discarded {} stale events", stale);
        }

        self.board.ctrl_codec(CodecMode::Decode, CodecCtrl::Start)?;
        let result = self.stream(decoder, source, output);
        if let Err(e) = self.board.ctrl_codec(CodecMode::Decode, CodecCtrl::Stop) {
            tracing::warn!("{}: codec stop failed: {}", self.board.name(), e);
        }

        self.state = DriverState::Stopped;
        result
    }

    fn stream(
        &mut self,
        decoder: impl AudioDecoder + 'static,
        source: impl ReadSource + 'static,
        output: impl AudioOutput + 'static,
    ) -> Result<PlaybackReport> {
        let writer = I2sWriter::new(self.config.i2s.clone(), output)?;
        let i2s_handle = writer.handle();

        let mut dec = Element::new(DECODER_TAG, DecoderElement::new(decoder));
        dec.set_read_source(source);
        let i2s = Element::new(SINK_TAG, writer);
        let sink_id = i2s.id();

        // On early return the pipeline's Drop releases whatever was set up.
        let mut pipeline = Pipeline::new(self.config.pipeline.clone());
        pipeline.register(dec, DECODER_TAG)?;
        pipeline.register(i2s, SINK_TAG)?;
        pipeline.link(&[DECODER_TAG, SINK_TAG])?;
        pipeline.set_listener(&self.iface);

        pipeline.run()?;
        self.state = DriverState::Running;

        let policy =
            EventPolicy::new(sink_id).with_stop_on_sink_error(self.config.stop_on_sink_error);
        let mut events = EventLoop::new(policy, i2s_handle);
        let listened = events.run(&self.iface, self.config.listen_timeout);

        self.state = DriverState::Draining;
        pipeline.stop()?;
        pipeline.wait_for_stop()?;

        pipeline.unlink()?;
        for tag in [DECODER_TAG, SINK_TAG] {
            pipeline.unregister(tag)?.deinit()?;
        }
        pipeline.remove_listener();

        listened?;
        Ok(events.into_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::I2sConfig;
    use crate::event::SourceRef;
    use crate::output::NullOutput;
    use std::sync::Arc;

    fn from(id: ElementId, name: &str, command: EventCommand) -> EventMessage {
        EventMessage::from_element(
            SourceRef {
                id,
                name: Arc::from(name),
            },
            command,
        )
    }

    fn status(id: ElementId, status: ElementStatus) -> EventMessage {
        from(id, "i2s", EventCommand::ReportStatus(status))
    }

    #[test]
    fn test_sink_terminal_statuses_drain() {
        let sink = ElementId::next();
        let policy = EventPolicy::new(sink);

        assert_eq!(
            policy.decide(&status(sink, ElementStatus::StateFinished)),
            EventAction::Drain(ExitReason::SinkFinished)
        );
        assert_eq!(
            policy.decide(&status(sink, ElementStatus::StateStopped)),
            EventAction::Drain(ExitReason::SinkStopped)
        );
    }

    #[test]
    fn test_other_sink_statuses_continue() {
        let sink = ElementId::next();
        let policy = EventPolicy::new(sink);

        for s in [
            ElementStatus::StateRunning,
            ElementStatus::StatePaused,
            ElementStatus::InputDone,
            ElementStatus::Error(ElementErrorKind::Output),
            ElementStatus::Error(ElementErrorKind::Timeout),
        ] {
            assert_eq!(policy.decide(&status(sink, s)), EventAction::Continue, "{:?}", s);
        }
    }

    #[test]
    fn test_sink_error_drains_when_configured() {
        let sink = ElementId::next();
        let policy = EventPolicy::new(sink).with_stop_on_sink_error(true);
        assert_eq!(
            policy.decide(&status(sink, ElementStatus::Error(ElementErrorKind::Output))),
            EventAction::Drain(ExitReason::SinkError(ElementErrorKind::Output))
        );
    }

    #[test]
    fn test_decoder_finishing_does_not_drain() {
        let sink = ElementId::next();
        let dec = ElementId::next();
        let policy = EventPolicy::new(sink);
        assert_eq!(
            policy.decide(&from(
                dec,
                "dec",
                EventCommand::ReportStatus(ElementStatus::StateFinished)
            )),
            EventAction::Continue
        );
    }

    #[test]
    fn test_music_info_reconfigures() {
        let policy = EventPolicy::new(ElementId::next());
        let info = MusicInfo::cd();
        assert_eq!(
            policy.decide(&from(
                ElementId::next(),
                "dec",
                EventCommand::ReportMusicInfo(info)
            )),
            EventAction::Reconfigure(info)
        );
    }

    #[test]
    fn test_stop_from_application_drains() {
        let policy = EventPolicy::new(ElementId::next());
        assert_eq!(
            policy.decide(&EventMessage::from_application(EventCommand::Stop)),
            EventAction::Drain(ExitReason::StopRequested)
        );
    }

    #[test]
    fn test_event_loop_retunes_clock_and_stays_running() {
        let writer = I2sWriter::new(I2sConfig::default(), NullOutput::new()).unwrap();
        let handle = writer.handle();
        let sink = ElementId::next();
        let mut events = EventLoop::new(EventPolicy::new(sink), handle.clone());

        let state = events.handle(&from(
            ElementId::next(),
            "dec",
            EventCommand::ReportMusicInfo(MusicInfo::new(44_100, 16, 2)),
        ));

        assert_eq!(state, DriverState::Running);
        assert_eq!(handle.clock(), ClockConfig::new(44_100, 16, 2));

        let state = events.handle(&status(sink, ElementStatus::StateFinished));
        assert_eq!(state, DriverState::Draining);
        assert_eq!(events.exit(), Some(ExitReason::SinkFinished));
    }

    #[test]
    fn test_event_loop_ignores_unusable_format() {
        let writer = I2sWriter::new(I2sConfig::default(), NullOutput::new()).unwrap();
        let handle = writer.handle();
        let mut events = EventLoop::new(EventPolicy::new(ElementId::next()), handle.clone());

        let state = events.handle(&from(
            ElementId::next(),
            "dec",
            EventCommand::ReportMusicInfo(MusicInfo::new(0, 16, 2)),
        ));

        assert_eq!(state, DriverState::Running);
        assert_eq!(handle.clock(), ClockConfig::default());
    }
}
