//! Pipeline construction and execution.
//!
//! This module provides the core pipeline infrastructure:
//!
//! - [`Pipeline`]: registered elements, the link chain, and its workers
//! - [`NodeId`]: a stable handle to a registered element's graph node
//! - [`PipelineState`]: aggregate state of the linked elements
//!
//! # Lifecycle
//!
//! ```text
//! register ─> link ─> run ─> stop ─> wait_for_stop ─> unlink ─> unregister ─> deinit
//! ```
//!
//! Dropping a [`Pipeline`] performs whatever part of this sequence is still
//! outstanding, in this order.

mod executor;
mod graph;

pub use graph::{NodeId, Pipeline, PipelineState};
