//! The trait implemented by the work done inside an element.
//!
//! Bodies are **synchronous**: the pipeline gives each element its own
//! worker thread, which calls [`ElementBody::process`] until it returns
//! [`Flow::Done`], fails, or the pipeline asks it to stop. Blocking reads
//! and writes go through the [`ElementContext`], which bounds every wait
//! and turns a stop request into [`Error::Aborted`](crate::Error::Aborted).

use super::context::ElementContext;
use super::state::ElementRole;
use crate::error::Result;
use crate::format::MusicInfo;

/// What the worker should do after a `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Call `process` again.
    Continue,
    /// All input consumed; finish the stream.
    Done,
}

/// The work of one pipeline stage.
///
/// # Example
///
/// ```rust
/// use flashplay::element::{ElementBody, ElementContext, ElementRole, Flow};
/// use flashplay::Result;
///
/// /// Counts the bytes it is fed.
/// struct Counter(u64);
///
/// impl ElementBody for Counter {
///     fn role(&self) -> ElementRole {
///         ElementRole::Sink
///     }
///
///     fn process(&mut self, ctx: &mut ElementContext) -> Result<Flow> {
///         match ctx.read_chunk(1024)? {
///             Some(chunk) => {
///                 self.0 += chunk.len() as u64;
///                 Ok(Flow::Continue)
///             }
///             None => Ok(Flow::Done),
///         }
///     }
/// }
/// ```
pub trait ElementBody: Send {
    /// Whether this body reads input, writes output, or both.
    fn role(&self) -> ElementRole;

    /// Called once on the worker thread before the first `process`.
    fn open(&mut self, _ctx: &mut ElementContext) -> Result<()> {
        Ok(())
    }

    /// Do one unit of work.
    fn process(&mut self, ctx: &mut ElementContext) -> Result<Flow>;

    /// Called once on the worker thread after the last `process`, also on
    /// failure and stop.
    fn close(&mut self, _ctx: &mut ElementContext) -> Result<()> {
        Ok(())
    }

    /// Format metadata known before the element runs.
    fn initial_info(&self) -> Option<MusicInfo> {
        None
    }

    /// Get the name of this body (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<B: ElementBody + ?Sized> ElementBody for Box<B> {
    fn role(&self) -> ElementRole {
        (**self).role()
    }

    fn open(&mut self, ctx: &mut ElementContext) -> Result<()> {
        (**self).open(ctx)
    }

    fn process(&mut self, ctx: &mut ElementContext) -> Result<Flow> {
        (**self).process(ctx)
    }

    fn close(&mut self, ctx: &mut ElementContext) -> Result<()> {
        (**self).close(ctx)
    }

    fn initial_info(&self) -> Option<MusicInfo> {
        (**self).initial_info()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
