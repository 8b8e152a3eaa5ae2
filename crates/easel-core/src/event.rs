#![forbid(unsafe_code)]

//! Canonical toolkit event types.
//!
//! Translation from an OS windowing layer happens in backend crates; the
//! runtime consumes only this canonical form.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The user asked to close the window.
    Quit,
    /// The window gained input focus.
    FocusGained,
    /// The window lost input focus.
    FocusLost,
}
