#![forbid(unsafe_code)]

//! Core: rebindable callback slots and canonical toolkit events.

pub mod delegate;
pub mod event;
