//! strato edge library.
//!
//! This crate primarily ships an `edge` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod config;
pub mod error;
pub mod forward;
pub mod inflight;
pub mod intercept;
pub mod reporter;
pub mod state;
