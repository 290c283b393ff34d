//! The element handle owned by a pipeline.

use super::control::ElementControl;
use super::state::{ElementRole, ElementState};
use super::traits::ElementBody;
use crate::error::{Error, Result};
use crate::format::MusicInfo;
use crate::io::ReadSource;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State visible to both the handle and the element's worker thread.
#[derive(Debug)]
pub(crate) struct ElementShared {
    pub(crate) state: Mutex<ElementState>,
    pub(crate) info: Mutex<MusicInfo>,
    pub(crate) control: ElementControl,
}

impl ElementShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ElementState::Init),
            info: Mutex::new(MusicInfo::default()),
            control: ElementControl::new(),
        }
    }

    pub(crate) fn state(&self) -> ElementState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if the transition is legal.
    pub(crate) fn transition(&self, name: &str, next: ElementState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            tracing::warn!("{}: illegal transition {} -> {}", name, *state, next);
            return false;
        }
        tracing::debug!("{}: {} -> {}", name, *state, next);
        *state = next;
        true
    }

    pub(crate) fn info(&self) -> MusicInfo {
        *self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_info(&self, info: MusicInfo) {
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }
}

/// A pipeline stage: identity, lifecycle state and the body doing the work.
///
/// An element is created detached, registered into a
/// [`Pipeline`](crate::pipeline::Pipeline) under a tag, and released with
/// [`deinit`](Self::deinit) after it has been unregistered.
///
/// # Example
///
/// ```rust
/// use flashplay::element::{Element, ElementState};
/// use flashplay::elements::I2sWriter;
/// use flashplay::config::I2sConfig;
/// use flashplay::output::NullOutput;
///
/// let writer = I2sWriter::new(I2sConfig::default(), NullOutput::new()).unwrap();
/// let element = Element::new("i2s", writer);
///
/// assert_eq!(element.state(), ElementState::Init);
/// assert_eq!(element.info().sample_rate, 16_000);
/// element.deinit().unwrap();
/// ```
pub struct Element {
    id: ElementId,
    name: Arc<str>,
    role: ElementRole,
    shared: Arc<ElementShared>,
    body: Option<Box<dyn ElementBody>>,
    read_source: Option<Box<dyn ReadSource>>,
    worker: Option<JoinHandle<Box<dyn ElementBody>>>,
}

impl Element {
    /// Create a detached element around a body.
    pub fn new(name: impl Into<String>, body: impl ElementBody + 'static) -> Self {
        Self::from_box(name, Box::new(body))
    }

    /// Create a detached element around a boxed body.
    pub fn from_box(name: impl Into<String>, body: Box<dyn ElementBody>) -> Self {
        let shared = Arc::new(ElementShared::new());
        if let Some(info) = body.initial_info() {
            shared.set_info(info);
        }
        let name: String = name.into();
        Self {
            id: ElementId::next(),
            name: Arc::from(name),
            role: body.role(),
            shared,
            body: Some(body),
            read_source: None,
            worker: None,
        }
    }

    /// Get the element id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Get the element name (its tag once registered).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the element role.
    pub fn role(&self) -> ElementRole {
        self.role
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> ElementState {
        self.shared.state()
    }

    /// Get the output format metadata last reported by this element.
    pub fn info(&self) -> MusicInfo {
        self.shared.info()
    }

    /// Replace the element's input with a custom read source.
    ///
    /// The source is moved into the worker on the next run.
    pub fn set_read_source(&mut self, source: impl ReadSource + 'static) {
        tracing::debug!("{}: read source set to {}", self.name, source.name());
        self.read_source = Some(Box::new(source));
    }

    /// Check if a read source is installed.
    pub fn has_read_source(&self) -> bool {
        self.read_source.is_some()
    }

    /// Release the element.
    ///
    /// Fails if a worker is still alive.
    pub fn deinit(mut self) -> Result<()> {
        if self.state().is_active() || self.worker.is_some() {
            return Err(Error::State(format!(
                "element '{}' is still running",
                self.name
            )));
        }
        self.shared.transition(&self.name, ElementState::Terminated);
        self.body = None;
        self.read_source = None;
        tracing::debug!("{}: deinitialized", self.name);
        Ok(())
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = Arc::from(name);
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn shared(&self) -> &Arc<ElementShared> {
        &self.shared
    }

    pub(crate) fn take_body(&mut self) -> Option<Box<dyn ElementBody>> {
        self.body.take()
    }

    pub(crate) fn take_read_source(&mut self) -> Option<Box<dyn ReadSource>> {
        self.read_source.take()
    }

    pub(crate) fn set_worker(&mut self, worker: JoinHandle<Box<dyn ElementBody>>) {
        self.worker = Some(worker);
    }

    pub(crate) fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Join the worker, putting the body back for the next run.
    pub(crate) fn join(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(body) => {
                self.body = Some(body);
                Ok(())
            }
            Err(_) => {
                self.shared.transition(&self.name, ElementState::Error);
                Err(Error::Element(format!("worker for '{}' panicked", self.name)))
            }
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("has_read_source", &self.read_source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementContext, Flow};

    struct Idle;

    impl ElementBody for Idle {
        fn role(&self) -> ElementRole {
            ElementRole::Sink
        }

        fn process(&mut self, _ctx: &mut ElementContext) -> Result<Flow> {
            Ok(Flow::Done)
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Element::new("a", Idle);
        let b = Element::new("b", Idle);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_new_element_is_init() {
        let element = Element::new("sink", Idle);
        assert_eq!(element.state(), ElementState::Init);
        assert_eq!(element.role(), ElementRole::Sink);
        assert_eq!(element.name(), "sink");
        assert!(!element.has_read_source());
    }

    #[test]
    fn test_deinit_idle_element() {
        let mut element = Element::new("sink", Idle);
        element.set_read_source(crate::io::AssetStream::new(vec![0u8; 4]));
        assert!(element.has_read_source());
        assert!(element.deinit().is_ok());
    }

    #[test]
    fn test_deinit_running_element_fails() {
        let element = Element::new("sink", Idle);
        element.shared().transition("sink", ElementState::Running);
        assert!(matches!(element.deinit(), Err(Error::State(_))));
    }
}
