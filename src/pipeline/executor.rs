//! Pipeline executor using worker threads and Kanal channels.
//!
//! `run` spawns one named thread per linked element and connects adjacent
//! elements with bounded Kanal channels. Each worker drives its element's
//! body until the body finishes, fails, or the pipeline asks it to stop.

use super::graph::Pipeline;
use crate::element::{
    ElementBody, ElementContext, ElementErrorKind, ElementState, ElementStatus, Flow, InputPort,
    OutputPort, link,
};
use crate::error::{Error, Result};
use crate::event::SourceRef;
use std::thread;
use std::time::Duration;

/// How a worker's processing loop ended.
enum Exit {
    Finished,
    Stopped,
}

impl Pipeline {
    /// Start every linked element on its own worker thread.
    ///
    /// Returns once all workers are spawned; elements are `Running` when
    /// this returns.
    pub fn run(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::State("pipeline is already running".into()));
        }
        if self.chain.len() < 2 {
            return Err(Error::Pipeline("no linked elements to run".into()));
        }
        self.config.validate()?;
        self.check_runnable()?;

        let n = self.chain.len();
        let poll = self.config.poll_interval;
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (1..n).map(|_| link(self.config.link_capacity)).unzip();
        let mut receivers: Vec<_> = receivers.into_iter().map(Some).collect();
        let listener = self.listener.clone();
        let chunk_size = self.config.chunk_size;
        let stack = self.config.task_stack;

        for position in 0..n {
            let element = self
                .chain_element_mut(position)
                .ok_or_else(|| Error::Pipeline("linked element vanished".into()))?;
            let shared = element.shared().clone();
            shared.control.reset();

            let input = match element.take_read_source() {
                Some(source) => Some(InputPort::from_source(
                    source,
                    shared.clone(),
                    poll,
                    chunk_size,
                )),
                None if position > 0 => receivers[position - 1]
                    .take()
                    .map(|rx| InputPort::from_link(rx, shared.clone(), poll)),
                None => None,
            };
            let output = senders
                .get(position)
                .map(|tx| OutputPort::new(tx.clone(), shared.clone(), poll));

            let source = SourceRef {
                id: element.id(),
                name: element.name_arc(),
            };
            let mut ctx = ElementContext::new(
                source,
                shared,
                input,
                output,
                listener.clone(),
            );

            let body = element
                .take_body()
                .ok_or_else(|| Error::State(format!("element '{}' has no body", element.name())))?;
            ctx.enter(ElementState::Running, ElementStatus::StateRunning);

            let spawned = thread::Builder::new()
                .name(element.name().to_string())
                .stack_size(stack)
                .spawn(move || run_worker(body, ctx, poll));

            match spawned {
                Ok(handle) => element.set_worker(handle),
                Err(e) => {
                    tracing::error!("failed to spawn worker for '{}': {}", element.name(), e);
                    element.shared().transition(element.name(), ElementState::Error);
                    self.running = true;
                    self.links = senders;
                    let _ = self.stop();
                    let _ = self.wait_for_stop();
                    return Err(e.into());
                }
            }
        }

        self.links = senders;
        self.running = true;
        tracing::info!("pipeline running [{}]", self.linked_tags().join(" -> "));
        Ok(())
    }

    /// Ask every linked element to stop. Does not wait.
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        tracing::debug!("stopping pipeline");
        for position in 0..self.chain.len() {
            if let Some(element) = self.chain_element_mut(position) {
                element.shared().control.request_stop();
            }
        }
        Ok(())
    }

    /// Join every worker. Returns immediately if nothing is running.
    pub fn wait_for_stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        let mut first_error = None;
        for position in 0..self.chain.len() {
            if let Some(element) = self.chain_element_mut(position) {
                if let Err(e) = element.join() {
                    tracing::error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.links.clear();
        self.running = false;
        tracing::debug!("pipeline workers joined");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Park every worker between chunks.
    pub fn pause(&mut self) -> Result<()> {
        self.set_paused(true)
    }

    /// Release parked workers.
    pub fn resume(&mut self) -> Result<()> {
        self.set_paused(false)
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        if !self.running {
            return Err(Error::State("pipeline is not running".into()));
        }
        for position in 0..self.chain.len() {
            if let Some(element) = self.chain_element_mut(position) {
                element.shared().control.set_paused(paused);
            }
        }
        Ok(())
    }

    // Everything that can fail is checked before the first thread starts.
    fn check_runnable(&self) -> Result<()> {
        for (position, tag) in self.linked_tags().into_iter().enumerate() {
            let element = self
                .element(tag)
                .ok_or_else(|| Error::ElementNotFound(tag.to_string()))?;
            if element.has_worker() || element.state().is_active() {
                return Err(Error::State(format!("element '{}' is still running", tag)));
            }
            if element.state() == ElementState::Terminated {
                return Err(Error::State(format!("element '{}' was deinitialized", tag)));
            }
            if position == 0 && element.role().has_input() && !element.has_read_source() {
                return Err(Error::Pipeline(format!(
                    "'{}' heads the chain but has no read source",
                    tag
                )));
            }
        }
        Ok(())
    }
}

fn run_worker(
    mut body: Box<dyn ElementBody>,
    mut ctx: ElementContext,
    poll: Duration,
) -> Box<dyn ElementBody> {
    let outcome = drive(body.as_mut(), &mut ctx, poll);
    let closed = body.close(&mut ctx);

    let mut status = match outcome {
        Ok(Exit::Finished) => match ctx.finish_output() {
            Ok(()) => ElementStatus::StateFinished,
            Err(_) if ctx.is_stopping() => ElementStatus::StateStopped,
            Err(e) => {
                tracing::error!("{}: could not finish stream: {}", ctx.name(), e);
                ElementStatus::Error(ElementErrorKind::Output)
            }
        },
        Ok(Exit::Stopped) => ElementStatus::StateStopped,
        Err(e) if e.is_aborted() || ctx.is_stopping() => {
            tracing::debug!("{}: stopped ({})", ctx.name(), e);
            ElementStatus::StateStopped
        }
        Err(e) => {
            tracing::error!("{}: {}", ctx.name(), e);
            ctx.abort_output();
            ElementStatus::Error(ctx.fault().unwrap_or(ElementErrorKind::Process))
        }
    };

    if let Err(e) = closed {
        tracing::warn!("{}: close failed: {}", ctx.name(), e);
        if !status.is_error() {
            status = ElementStatus::Error(ElementErrorKind::Close);
        }
    }

    let state = status.state().unwrap_or(ElementState::Error);
    tracing::info!("{}: {}", ctx.name(), state);
    ctx.enter(state, status);
    body
}

fn drive(body: &mut dyn ElementBody, ctx: &mut ElementContext, poll: Duration) -> Result<Exit> {
    if let Err(e) = body.open(ctx) {
        ctx.mark_fault(ElementErrorKind::Open);
        return Err(e);
    }

    loop {
        if ctx.is_stopping() {
            return Ok(Exit::Stopped);
        }
        if ctx.control().is_paused() {
            ctx.enter(ElementState::Paused, ElementStatus::StatePaused);
            ctx.control().wait_while_paused(poll);
            if ctx.is_stopping() {
                return Ok(Exit::Stopped);
            }
            ctx.enter(ElementState::Running, ElementStatus::StateRunning);
            continue;
        }

        match body.process(ctx)? {
            Flow::Continue => {}
            Flow::Done => return Ok(Exit::Finished),
        }
    }
}
