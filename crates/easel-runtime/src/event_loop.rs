#![forbid(unsafe_code)]

//! Fixed-cadence application event loop.
//!
//! [`EventLoop`] runs on its caller's thread: each iteration exhausts the
//! pending events of an [`EventSource`], dispatches the `on_tick` delegate
//! with the elapsed time step, then sleeps out the rest of the frame budget
//! (overruns proceed immediately, per [`crate::frame`]).
//!
//! Quit handling follows the toolkit convention: when `on_quit` is bound, a
//! [`Event::Quit`] is handed to it and the handler decides whether to stop
//! the loop through a [`QuitHandle`]; when unbound, `Quit` stops the loop
//! directly.
//!
//! Delegate dispatch failures (say, a receiver dropped between frames) are
//! contained at the dispatch site and logged; the loop keeps running.

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use easel_core::delegate::Delegate;
use easel_core::event::Event;

use crate::frame::{DEFAULT_FRAME_PERIOD, FramePacer};

/// Produces canonical events for the loop.
///
/// Backends translate their OS event queue into [`Event`]s behind this
/// trait; the loop drains the source to exhaustion once per frame.
pub trait EventSource {
    /// Remove and return one pending event; `None` when the queue is
    /// exhausted for now.
    fn poll(&mut self) -> Option<Event>;
}

/// Stops a running [`EventLoop`] from inside a handler.
///
/// Handles are clonable and only meaningful on the loop's own thread.
#[derive(Debug, Clone)]
pub struct QuitHandle {
    running: Rc<Cell<bool>>,
}

impl QuitHandle {
    /// Ask the loop to terminate after the current iteration.
    pub fn quit(&self) {
        self.running.set(false);
    }
}

/// A fixed-cadence event loop with rebindable handler slots.
///
/// ```ignore
/// use easel_runtime::event_loop::EventLoop;
///
/// let mut event_loop = EventLoop::new();
/// let quit = event_loop.quit_handle();
/// event_loop.on_quit.bind_closure(move |()| quit.quit());
/// event_loop.on_tick.bind_closure(|time_step| {
///     // advance animations by `time_step` seconds
/// });
/// event_loop.run(&mut backend_events);
/// ```
#[derive(Debug)]
pub struct EventLoop {
    /// Invoked on [`Event::Quit`] when bound; the handler stops the loop via
    /// its [`QuitHandle`]. When unbound, `Quit` stops the loop directly.
    pub on_quit: Delegate<(), ()>,
    /// Invoked once per frame, when bound, with the time step in seconds
    /// since the previous tick.
    pub on_tick: Delegate<f32, ()>,
    running: Rc<Cell<bool>>,
    frame_period: Duration,
}

impl EventLoop {
    /// A loop at the default 60 Hz cadence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_frame_period(DEFAULT_FRAME_PERIOD)
    }

    /// A loop with a caller-chosen frame period.
    #[must_use]
    pub fn with_frame_period(frame_period: Duration) -> Self {
        Self {
            on_quit: Delegate::new(),
            on_tick: Delegate::new(),
            running: Rc::new(Cell::new(false)),
            frame_period,
        }
    }

    /// A handle that stops the loop; hand it to `on_quit`/`on_tick` callees.
    #[must_use]
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            running: Rc::clone(&self.running),
        }
    }

    /// Run until quit. Each iteration drains `source`, ticks, then paces.
    pub fn run<S: EventSource>(&mut self, source: &mut S) {
        self.running.set(true);
        tracing::debug!(
            period_us = self.frame_period.as_micros() as u64,
            "event loop started"
        );

        let mut pacer = FramePacer::new(self.frame_period);
        let mut previous_tick = Instant::now();
        while self.running.get() {
            self.pump(source);

            if self.on_tick.is_bound() {
                let now = Instant::now();
                let time_step = now.duration_since(previous_tick).as_secs_f32();
                previous_tick = now;
                if let Err(err) = self.on_tick.invoke(time_step) {
                    tracing::warn!(error = %err, "tick handler failed");
                }
            }

            let remaining = pacer.remaining();
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
            pacer.advance();
        }
        tracing::debug!("event loop stopped");
    }

    /// Drain the source's pending events and dispatch handlers.
    fn pump<S: EventSource>(&mut self, source: &mut S) {
        while let Some(event) = source.poll() {
            match event {
                Event::Quit => {
                    if self.on_quit.is_bound() {
                        if let Err(err) = self.on_quit.invoke(()) {
                            tracing::warn!(error = %err, "quit handler failed");
                        }
                    } else {
                        self.running.set(false);
                    }
                }
                // Focus changes have no handler slots yet.
                Event::FocusGained | Event::FocusLost => {}
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
