//! Pipeline graph structure using daggy.
//!
//! Registered elements are the nodes; the current link chain is the set of
//! edges. Node indices are never reused within a pipeline: unregistering an
//! element leaves an empty node behind, so a [`NodeId`] handed out earlier
//! can never name a different element.

use crate::config::PipelineConfig;
use crate::element::{Element, ElementId, ElementState, LinkMessage};
use crate::error::{Error, Result};
use crate::event::{EventIface, EventSender};
use daggy::{Dag, NodeIndex};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Unique identifier for a node in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// State of the pipeline, derived from its linked elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Pipeline is not running.
    #[default]
    Stopped,
    /// At least one element is running.
    Running,
    /// Every live element is paused.
    Paused,
    /// Every linked element drained its input.
    Finished,
    /// An element failed.
    Error,
}

/// A node in the pipeline graph.
pub(crate) struct Node {
    /// Tag the element was registered under.
    pub(crate) tag: String,
    /// The element; `None` once unregistered.
    pub(crate) element: Option<Element>,
}

/// An edge of the link chain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link {
    /// Position of the upstream element in the chain.
    pub(crate) position: usize,
}

/// A linear chain of elements driven by worker threads.
///
/// # Example
///
/// ```rust
/// use flashplay::config::{I2sConfig, PipelineConfig};
/// use flashplay::element::Element;
/// use flashplay::elements::{DecoderElement, I2sWriter, RawPcmDecoder};
/// use flashplay::format::MusicInfo;
/// use flashplay::io::AssetStream;
/// use flashplay::output::MemoryOutput;
/// use flashplay::pipeline::Pipeline;
///
/// let output = MemoryOutput::new();
/// let captured = output.handle();
///
/// let mut dec = Element::new(
///     "dec",
///     DecoderElement::new(RawPcmDecoder::new(MusicInfo::voice(), 256).unwrap()),
/// );
/// dec.set_read_source(AssetStream::new(vec![0u8; 1000]));
/// let i2s = Element::new("i2s", I2sWriter::new(I2sConfig::default(), output).unwrap());
///
/// let mut pipeline = Pipeline::new(PipelineConfig::default());
/// pipeline.register(dec, "dec").unwrap();
/// pipeline.register(i2s, "i2s").unwrap();
/// pipeline.link(&["dec", "i2s"]).unwrap();
///
/// pipeline.run().unwrap();
/// pipeline.wait_for_stop().unwrap();
///
/// assert_eq!(captured.len(), 1000);
/// ```
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    /// The DAG structure.
    pub(crate) graph: Dag<Node, Link>,
    /// Tag-to-NodeId mapping for registered elements.
    nodes_by_tag: HashMap<String, NodeId>,
    /// The linked elements, upstream first.
    pub(crate) chain: SmallVec<[NodeId; 4]>,
    /// Sender clones keeping every link open for the current run.
    pub(crate) links: Vec<kanal::Sender<LinkMessage>>,
    pub(crate) listener: Option<EventSender>,
    pub(crate) running: bool,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            graph: Dag::new(),
            nodes_by_tag: HashMap::new(),
            chain: SmallVec::new(),
            links: Vec::new(),
            listener: None,
            running: false,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Add an element under `tag`. The element is renamed to its tag.
    pub fn register(&mut self, mut element: Element, tag: &str) -> Result<ElementId> {
        if self.nodes_by_tag.contains_key(tag) {
            return Err(Error::Pipeline(format!("tag '{}' already registered", tag)));
        }

        element.set_name(tag);
        let id = element.id();
        let idx = self.graph.add_node(Node {
            tag: tag.to_string(),
            element: Some(element),
        });
        self.nodes_by_tag.insert(tag.to_string(), NodeId(idx));
        tracing::debug!("registered '{}' ({})", tag, id);
        Ok(id)
    }

    /// Remove the element registered under `tag` and hand it back.
    ///
    /// The element must not be part of the current link chain.
    pub fn unregister(&mut self, tag: &str) -> Result<Element> {
        let id = self.node_id(tag)?;
        if self.chain.contains(&id) {
            return Err(Error::State(format!(
                "element '{}' is linked; unlink first",
                tag
            )));
        }

        let node = self
            .graph
            .node_weight_mut(id.0)
            .ok_or_else(|| Error::ElementNotFound(tag.to_string()))?;
        let element = node
            .element
            .take()
            .ok_or_else(|| Error::ElementNotFound(tag.to_string()))?;
        if element.state().is_active() {
            node.element = Some(element);
            return Err(Error::State(format!("element '{}' is running", tag)));
        }

        self.nodes_by_tag.remove(tag);
        tracing::debug!("unregistered '{}'", tag);
        Ok(element)
    }

    /// Get the element registered under `tag`.
    pub fn element(&self, tag: &str) -> Option<&Element> {
        let id = self.nodes_by_tag.get(tag)?;
        self.graph.node_weight(id.0)?.element.as_ref()
    }

    /// Get the element registered under `tag` mutably.
    pub fn element_mut(&mut self, tag: &str) -> Option<&mut Element> {
        let id = self.nodes_by_tag.get(tag)?;
        self.graph.node_weight_mut(id.0)?.element.as_mut()
    }

    /// Get the node id of a registered tag.
    pub fn node_id(&self, tag: &str) -> Result<NodeId> {
        self.nodes_by_tag
            .get(tag)
            .copied()
            .ok_or_else(|| Error::ElementNotFound(tag.to_string()))
    }

    /// Connect registered elements into a chain, upstream first.
    ///
    /// Fewer than two tags leaves the current chain untouched. A new chain
    /// replaces the old one.
    pub fn link(&mut self, tags: &[&str]) -> Result<()> {
        if tags.len() < 2 {
            tracing::warn!(
                "link needs at least two elements, got {}; keeping current link",
                tags.len()
            );
            return Ok(());
        }
        if self.running {
            return Err(Error::State("cannot relink a running pipeline".into()));
        }

        let mut chain: SmallVec<[NodeId; 4]> = SmallVec::new();
        for tag in tags {
            let id = self.node_id(tag)?;
            if chain.contains(&id) {
                return Err(Error::Pipeline(format!("'{}' appears twice in link", tag)));
            }
            chain.push(id);
        }

        for (i, tag) in tags.iter().enumerate() {
            let role = self
                .element(tag)
                .ok_or_else(|| Error::ElementNotFound(tag.to_string()))?
                .role();
            if i + 1 < tags.len() && !role.has_output() {
                return Err(Error::Pipeline(format!(
                    "'{}' produces no output for '{}'",
                    tag,
                    tags[i + 1]
                )));
            }
            if i > 0 && !role.has_input() {
                return Err(Error::Pipeline(format!(
                    "'{}' accepts no input from '{}'",
                    tag,
                    tags[i - 1]
                )));
            }
        }

        self.clear_edges();
        for (position, pair) in chain.windows(2).enumerate() {
            self.graph
                .add_edge(pair[0].0, pair[1].0, Link { position })
                .map_err(|_| Error::Pipeline("linking would create a cycle".into()))?;
        }
        self.chain = chain;

        tracing::info!("linked [{}]", tags.join(" -> "));
        Ok(())
    }

    /// Remove the link chain. Elements stay registered.
    pub fn unlink(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::State("cannot unlink a running pipeline".into()));
        }
        if !self.chain.is_empty() {
            tracing::debug!("unlinked [{}]", self.linked_tags().join(" -> "));
        }
        self.clear_edges();
        self.chain.clear();
        Ok(())
    }

    /// Tags of the linked elements, upstream first.
    pub fn linked_tags(&self) -> Vec<&str> {
        self.chain
            .iter()
            .filter_map(|id| self.graph.node_weight(id.0))
            .map(|node| node.tag.as_str())
            .collect()
    }

    /// Check if a chain is linked.
    pub fn is_linked(&self) -> bool {
        !self.chain.is_empty()
    }

    /// Number of links in the chain.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tags of every registered element.
    pub fn tags(&self) -> Vec<&str> {
        self.nodes_by_tag.keys().map(String::as_str).collect()
    }

    /// Route element events to `iface`.
    ///
    /// Takes effect for elements started by the next `run`.
    pub fn set_listener(&mut self, iface: &EventIface) {
        self.listener = Some(iface.sender());
    }

    /// Stop routing element events.
    pub fn remove_listener(&mut self) {
        self.listener = None;
    }

    /// Check if a listener is attached.
    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Check if workers were started and not yet joined.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the pipeline state from the linked elements' states.
    pub fn state(&self) -> PipelineState {
        let states: SmallVec<[ElementState; 4]> = self
            .chain
            .iter()
            .filter_map(|id| self.graph.node_weight(id.0)?.element.as_ref())
            .map(Element::state)
            .collect();

        if states.contains(&ElementState::Running) {
            PipelineState::Running
        } else if states.contains(&ElementState::Paused) {
            PipelineState::Paused
        } else if states.contains(&ElementState::Error) {
            PipelineState::Error
        } else if !states.is_empty() && states.iter().all(|s| *s == ElementState::Finished) {
            PipelineState::Finished
        } else {
            PipelineState::Stopped
        }
    }

    /// Release everything in order: stop, wait, unlink, unregister and
    /// deinit every element, remove the listener.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    pub fn teardown(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                tracing::warn!("teardown: {}", e);
                first_error.get_or_insert(e);
            }
        };

        note(self.stop());
        note(self.wait_for_stop());
        note(self.unlink());

        let mut tags: Vec<String> = self.nodes_by_tag.keys().cloned().collect();
        tags.sort();
        for tag in tags {
            note(self.unregister(&tag).and_then(Element::deinit));
        }

        self.remove_listener();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn chain_element_mut(&mut self, position: usize) -> Option<&mut Element> {
        let id = *self.chain.get(position)?;
        self.graph.node_weight_mut(id.0)?.element.as_mut()
    }

    fn clear_edges(&mut self) {
        // Removal swaps the last edge into the hole, so go back to front.
        let edges: Vec<_> = self.graph.graph().edge_indices().collect();
        for edge in edges.into_iter().rev() {
            self.graph.remove_edge(edge);
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.nodes_by_tag.is_empty() && !self.running {
            return;
        }
        if let Err(e) = self.teardown() {
            tracing::warn!("pipeline dropped with errors: {}", e);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registered", &self.nodes_by_tag.len())
            .field("linked", &self.linked_tags())
            .field("running", &self.running)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}
