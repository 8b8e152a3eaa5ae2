#![forbid(unsafe_code)]

//! Ordered render-command batches.
//!
//! A [`CommandQueue`] is an immutable, move-only sequence of zero-argument
//! commands, built once through [`CommandQueueBuilder`] and then handed to
//! the executor by value. Execution runs commands strictly in append order.
//!
//! # Failure Isolation
//!
//! A command that returns an error, or panics, never prevents the commands
//! after it (in the same or a later batch) from running. Failures are
//! delivered to the caller-supplied reporter at the command boundary; a
//! panic is converted to [`CommandError::Panicked`] there.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Outcome of a single render command.
pub type CommandResult = Result<(), CommandError>;

/// A single zero-argument render command. Runs exactly once, on the worker
/// thread; any state it needs is captured by value.
pub type Command = Box<dyn FnOnce() -> CommandResult + Send + 'static>;

/// Errors a render command can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The graphics backend rejected or failed the operation.
    #[error("backend failure: {0}")]
    Backend(String),
    /// The command found its target in a state it cannot operate on.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The command panicked; the panic was contained at the command boundary.
    #[error("command panicked: {0}")]
    Panicked(String),
    /// Generic failure with a message.
    #[error("{0}")]
    Other(String),
}

/// An immutable, ordered batch of commands.
///
/// Instances are move-only and consumed by execution; build them with
/// [`CommandQueue::builder`].
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Start building a new batch.
    #[must_use]
    pub fn builder() -> CommandQueueBuilder {
        CommandQueueBuilder::new()
    }

    /// Number of commands in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch holds no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run every command in append order, routing each failure to `report`.
    pub(crate) fn execute(self, report: &mut dyn FnMut(CommandError)) {
        for command in self.commands {
            match panic::catch_unwind(AssertUnwindSafe(command)) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => report(err),
                Err(payload) => report(CommandError::Panicked(panic_message(payload.as_ref()))),
            }
        }
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// Builds a [`CommandQueue`] by appending commands.
#[derive(Default)]
pub struct CommandQueueBuilder {
    commands: Vec<Command>,
}

impl CommandQueueBuilder {
    /// Start an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command to the batch.
    #[must_use]
    pub fn enqueue(mut self, command: impl FnOnce() -> CommandResult + Send + 'static) -> Self {
        self.commands.push(Box::new(command));
        self
    }

    /// Seal the batch.
    #[must_use]
    pub fn build(self) -> CommandQueue {
        CommandQueue {
            commands: self.commands,
        }
    }
}

impl fmt::Debug for CommandQueueBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueueBuilder")
            .field("commands", &self.commands.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
