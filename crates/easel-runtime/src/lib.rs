#![forbid(unsafe_code)]

//! Runtime: paced render-command execution and the application event loop.

pub mod event_loop;
pub mod executor;
pub mod frame;
pub mod queue;
