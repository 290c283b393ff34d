//! Element system for flashplay pipelines.
//!
//! This module defines the pieces every pipeline stage is made of:
//!
//! - [`Element`]: the handle a pipeline owns (identity, state, read source)
//! - [`ElementBody`]: the work a stage does, driven on its own thread
//! - [`ElementContext`]: the body's view of its ports and the event channel
//! - [`ElementState`] / [`ElementStatus`]: lifecycle and reported statuses
//!
//! # Design
//!
//! Bodies are **synchronous** and own their thread for the duration of a
//! run. Everything that can block (reading input, writing output, waiting
//! while paused) is bounded by the pipeline's poll interval and honours
//! the element's stop flag, so `Pipeline::stop` always completes.

mod context;
mod control;
mod handle;
mod port;
mod state;
mod traits;

pub use context::ElementContext;
pub use control::ElementControl;
pub use handle::{Element, ElementId};
pub use port::{ChunkRead, InputPort, OutputPort};
pub use state::{ElementErrorKind, ElementRole, ElementState, ElementStatus};
pub use traits::{ElementBody, Flow};

pub(crate) use handle::ElementShared;
pub(crate) use port::{LinkMessage, link};
