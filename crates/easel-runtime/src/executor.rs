#![forbid(unsafe_code)]

//! Dedicated render-command thread.
//!
//! [`RenderExecutor`] decouples command *submission* (any thread) from
//! command *execution* (exactly one worker thread). Producers build
//! [`CommandQueue`] batches and hand them to [`submit`]; the worker drains
//! all pending batches once per frame and runs them in submission order,
//! paced to a fixed frame period.
//!
//! The worker owns the [`RenderContext`] and activates it once, before the
//! first frame; it is the only thread that ever executes commands.
//!
//! # Frame Loop
//!
//! Each iteration swaps the entire pending list with an empty one under the
//! submission lock (the lock is held for the swap, never for execution),
//! executes the swapped-out batches, then waits out the rest of the frame
//! budget on a condition variable so shutdown can cut the wait short.
//! An overrunning frame proceeds immediately.
//!
//! # Error Propagation
//!
//! A failing or panicking command never unwinds into `submit`'s caller and
//! never stops later commands. Failures are logged and forwarded on a
//! bounded channel the owner polls with [`RenderExecutor::check_error`].
//!
//! # Shutdown
//!
//! Shutdown is cooperative: [`shutdown`] (or drop) clears the running flag,
//! wakes the worker, and joins it unconditionally. Batches still pending at
//! that instant are discarded, not executed; the discard is reported once as
//! a warning. [`request_stop`] signals the same cut-off without joining,
//! after which [`submit`] reports [`SubmitError::ShuttingDown`].
//!
//! # Example
//!
//! ```ignore
//! use easel_runtime::executor::{RenderContext, RenderExecutor};
//! use easel_runtime::queue::CommandQueue;
//!
//! struct WindowContext { /* GL handle, swap chain, ... */ }
//!
//! impl RenderContext for WindowContext {
//!     fn make_current(&mut self) { /* bind the GL context to this thread */ }
//! }
//!
//! let executor = RenderExecutor::start(WindowContext { /* ... */ });
//!
//! let frame = CommandQueue::builder()
//!     .enqueue(|| { /* issue draw calls */ Ok(()) })
//!     .enqueue(|| { /* present */ Ok(()) })
//!     .build();
//! executor.submit(frame)?;
//!
//! // Clean shutdown; pending batches are discarded.
//! executor.shutdown();
//! ```
//!
//! [`submit`]: RenderExecutor::submit
//! [`shutdown`]: RenderExecutor::shutdown
//! [`request_stop`]: RenderExecutor::request_stop

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::frame::{DEFAULT_FRAME_PERIOD, FramePacer};
use crate::queue::{CommandError, CommandQueue};

/// Capacity of the out-of-band command-failure channel.
///
/// When the owner stops polling, older failures are dropped rather than
/// blocking the worker.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// A render target the worker thread activates before executing commands.
///
/// The executor calls [`make_current`] exactly once, on the worker thread,
/// before the first frame; it never touches the context again. Buffer
/// presentation, if any, happens through submitted commands.
///
/// [`make_current`]: RenderContext::make_current
pub trait RenderContext {
    /// Make this context current on the calling thread.
    fn make_current(&mut self);
}

/// Error returned by [`RenderExecutor::submit`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Shutdown has been signalled; the batch was not enqueued.
    #[error("executor is shutting down")]
    ShuttingDown,
}

/// State shared between the owner and the worker thread.
///
/// The pending list is the only data mutated from both sides; its mutex is
/// held across an append or a swap, never across execution.
struct Shared {
    /// Batches awaiting the next drain, in submission order.
    pending: Mutex<Vec<CommandQueue>>,
    /// Cleared exactly once, when shutdown begins.
    running: AtomicBool,
    /// Pairs with `wake` to make the frame wait cancellable.
    wake_lock: Mutex<()>,
    /// Cuts the frame wait short when shutdown is signalled.
    wake: Condvar,
}

/// Handle to a running render worker.
///
/// Dropping the handle signals stop, wakes the worker, and joins it.
pub struct RenderExecutor {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    /// Locked so the handle stays shareable across producer threads.
    error_rx: Mutex<mpsc::Receiver<CommandError>>,
}

impl RenderExecutor {
    /// Spawn the worker at the default 60 Hz cadence, transferring ownership
    /// of the context.
    pub fn start<C>(context: C) -> Self
    where
        C: RenderContext + Send + 'static,
    {
        Self::start_with_period(context, DEFAULT_FRAME_PERIOD)
    }

    /// Spawn the worker with a caller-chosen frame period.
    pub fn start_with_period<C>(context: C, frame_period: Duration) -> Self
    where
        C: RenderContext + Send + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        });
        let (err_tx, err_rx) = mpsc::sync_channel(ERROR_CHANNEL_CAPACITY);

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("easel-render".into())
            .spawn(move || render_loop(context, &worker_shared, &err_tx, frame_period))
            .expect("failed to spawn render thread");

        Self {
            shared,
            handle: Some(handle),
            error_rx: Mutex::new(err_rx),
        }
    }

    /// Append a fully built batch to the pending list.
    ///
    /// Returns immediately; never blocks on execution. The batch runs, in
    /// full and in order, during one of the worker's upcoming frames.
    ///
    /// # Errors
    ///
    /// [`SubmitError::ShuttingDown`] once shutdown has been signalled; the
    /// batch is dropped without executing.
    pub fn submit(&self, queue: CommandQueue) -> Result<(), SubmitError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.push(queue);
        Ok(())
    }

    /// Check whether the worker has reported a command failure.
    ///
    /// Non-blocking poll of the out-of-band failure channel; call it
    /// periodically (e.g. once per event-loop iteration).
    pub fn check_error(&self) -> Option<CommandError> {
        self.error_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    /// Signal shutdown without joining the worker.
    ///
    /// Subsequent [`submit`] calls report [`SubmitError::ShuttingDown`];
    /// batches already pending are discarded when the worker observes the
    /// signal. [`shutdown`] or drop still joins.
    ///
    /// [`submit`]: RenderExecutor::submit
    /// [`shutdown`]: RenderExecutor::shutdown
    pub fn request_stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        // Take the wait lock before notifying so the worker cannot re-check
        // the flag and enter its wait between the store and the notify.
        drop(
            self.shared
                .wake_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.shared.wake.notify_one();
    }

    /// Signal stop, wake the worker, and join it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderExecutor {
    fn drop(&mut self) {
        // Best-effort shutdown if the caller did not call shutdown().
        self.stop_and_join();
    }
}

/// The worker thread's frame loop.
fn render_loop<C: RenderContext>(
    mut context: C,
    shared: &Shared,
    errors: &mpsc::SyncSender<CommandError>,
    frame_period: Duration,
) {
    context.make_current();
    tracing::debug!(
        period_us = frame_period.as_micros() as u64,
        "render thread started"
    );

    let mut report = |err: CommandError| {
        tracing::error!(error = %err, "render command failed");
        // try_send keeps the worker from blocking when nobody polls.
        let _ = errors.try_send(err);
    };

    let mut pacer = FramePacer::new(frame_period);
    while shared.running.load(Ordering::Acquire) {
        let drained = {
            let mut pending = shared
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            mem::take(&mut *pending)
        };
        for queue in drained {
            queue.execute(&mut report);
        }

        let remaining = pacer.remaining();
        if !remaining.is_zero() {
            let guard = shared
                .wake_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if shared.running.load(Ordering::Acquire) {
                let _ = shared.wake.wait_timeout(guard, remaining);
            }
        }
        pacer.advance();
    }

    let abandoned = {
        let mut pending = shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *pending)
    };
    if !abandoned.is_empty() {
        let commands: usize = abandoned.iter().map(CommandQueue::len).sum();
        tracing::warn!(
            batches = abandoned.len(),
            commands,
            "discarding batches still pending at shutdown"
        );
    }
    tracing::debug!("render thread stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    const FAST_FRAME: Duration = Duration::from_millis(1);
    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    struct NullContext;

    impl RenderContext for NullContext {
        fn make_current(&mut self) {}
    }

    struct ProbeContext {
        activated: Arc<AtomicBool>,
    }

    impl RenderContext for ProbeContext {
        fn make_current(&mut self) {
            self.activated.store(true, Ordering::Release);
        }
    }

    fn fast_executor() -> RenderExecutor {
        RenderExecutor::start_with_period(NullContext, FAST_FRAME)
    }

    #[test]
    fn start_and_shutdown_without_submissions() {
        let executor = fast_executor();
        executor.shutdown();
    }

    #[test]
    fn drop_without_shutdown_joins() {
        let executor = fast_executor();
        drop(executor);
    }

    #[test]
    fn context_is_activated_before_first_command() {
        let activated = Arc::new(AtomicBool::new(false));
        let executor = RenderExecutor::start_with_period(
            ProbeContext {
                activated: Arc::clone(&activated),
            },
            FAST_FRAME,
        );

        let (done_tx, done_rx) = mpsc::channel();
        let seen = Arc::clone(&activated);
        let batch = CommandQueue::builder()
            .enqueue(move || {
                done_tx
                    .send(seen.load(Ordering::Acquire))
                    .expect("test receiver alive");
                Ok(())
            })
            .build();
        executor.submit(batch).unwrap();

        let was_active = done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert!(was_active, "make_current must precede command execution");
        executor.shutdown();
    }

    #[test]
    fn commands_execute_in_append_order() {
        let executor = fast_executor();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        let mut builder = CommandQueue::builder();
        for index in 0..8 {
            let log = Arc::clone(&log);
            builder = builder.enqueue(move || {
                log.lock().unwrap().push(index);
                Ok(())
            });
        }
        let batch = builder
            .enqueue(move || {
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();
        executor.submit(batch).unwrap();

        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(*log.lock().unwrap(), (0..8).collect::<Vec<_>>());
        executor.shutdown();
    }

    #[test]
    fn back_to_back_batches_keep_submission_order() {
        let executor = fast_executor();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        let first_a = Arc::clone(&log);
        let first_b = Arc::clone(&log);
        let batch_a = CommandQueue::builder()
            .enqueue(move || {
                first_a.lock().unwrap().push("a");
                Ok(())
            })
            .enqueue(move || {
                first_b.lock().unwrap().push("b");
                Ok(())
            })
            .build();

        let second_c = Arc::clone(&log);
        let batch_b = CommandQueue::builder()
            .enqueue(move || {
                second_c.lock().unwrap().push("c");
                Ok(())
            })
            .enqueue(move || {
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();

        executor.submit(batch_a).unwrap();
        executor.submit(batch_b).unwrap();

        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        executor.shutdown();
    }

    #[test]
    fn failing_command_surfaces_on_error_channel() {
        let executor = fast_executor();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        let after = Arc::clone(&log);
        let batch = CommandQueue::builder()
            .enqueue(|| Err(CommandError::Backend("lost device".into())))
            .enqueue(move || {
                after.lock().unwrap().push("after");
                Ok(())
            })
            .build();
        let later = Arc::clone(&log);
        let next_batch = CommandQueue::builder()
            .enqueue(move || {
                later.lock().unwrap().push("later");
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();

        executor.submit(batch).unwrap();
        executor.submit(next_batch).unwrap();

        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["after", "later"]);
        assert_eq!(
            executor.check_error(),
            Some(CommandError::Backend("lost device".into()))
        );
        executor.shutdown();
    }

    #[test]
    fn panicking_command_is_contained() {
        let executor = fast_executor();
        let (done_tx, done_rx) = mpsc::channel();

        let batch = CommandQueue::builder()
            .enqueue(|| panic!("worker must survive"))
            .enqueue(move || {
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();
        executor.submit(batch).unwrap();

        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        match executor.check_error() {
            Some(CommandError::Panicked(message)) => {
                assert!(message.contains("worker must survive"));
            }
            other => panic!("expected Panicked, got {other:?}"),
        }
        executor.shutdown();
    }

    #[test]
    fn error_channel_overflow_does_not_block_worker() {
        let executor = fast_executor();
        let (done_tx, done_rx) = mpsc::channel();

        let mut builder = CommandQueue::builder();
        for index in 0..(ERROR_CHANNEL_CAPACITY + 32) {
            builder = builder.enqueue(move || Err(CommandError::Other(format!("failure {index}"))));
        }
        let batch = builder
            .enqueue(move || {
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();
        executor.submit(batch).unwrap();

        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert!(executor.check_error().is_some());
        executor.shutdown();
    }

    #[test]
    fn check_error_is_none_on_success() {
        let executor = fast_executor();
        let (done_tx, done_rx) = mpsc::channel();
        let batch = CommandQueue::builder()
            .enqueue(move || {
                done_tx.send(()).expect("test receiver alive");
                Ok(())
            })
            .build();
        executor.submit(batch).unwrap();
        done_rx.recv_timeout(RECV_TIMEOUT).unwrap();
        assert!(executor.check_error().is_none());
        executor.shutdown();
    }

    #[test]
    fn submit_after_request_stop_is_rejected() {
        let executor = fast_executor();
        executor.request_stop();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let batch = CommandQueue::builder()
            .enqueue(move || {
                flag.store(true, Ordering::Release);
                Ok(())
            })
            .build();
        assert_eq!(executor.submit(batch), Err(SubmitError::ShuttingDown));

        executor.shutdown();
        assert!(!ran.load(Ordering::Acquire));
    }

    #[test]
    fn shutdown_discards_batches_still_pending() {
        let executor = fast_executor();

        // Keep the worker inside a command while the next batch is submitted,
        // so that batch is still pending when stop is signalled.
        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = CommandQueue::builder()
            .enqueue(move || {
                entered_tx.send(()).expect("test receiver alive");
                gate_rx.recv().expect("gate sender alive");
                Ok(())
            })
            .build();
        executor.submit(gate).unwrap();
        entered_rx.recv_timeout(RECV_TIMEOUT).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let pending = CommandQueue::builder()
            .enqueue(move || {
                flag.store(true, Ordering::Release);
                Ok(())
            })
            .build();
        executor.submit(pending).unwrap();

        // Stop is observed before the next drain, so the pending batch is
        // discarded once the gate command finishes.
        executor.request_stop();
        gate_tx.send(()).expect("worker still in gate command");
        executor.shutdown();
        assert!(!ran.load(Ordering::Acquire), "pending batch must be discarded");
    }
}
