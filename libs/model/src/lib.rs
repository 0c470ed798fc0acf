//! # strato-model
//!
//! Shared domain model for the strato control plane.
//!
//! ## Design Principles
//!
//! - Types here are plain data: no I/O, no clocks beyond timestamps on wire
//!   types, no dependency on any service crate.
//! - Identity is always the `(project, service, version)` triple. Every
//!   record that crosses a process boundary carries it.
//! - Routing targets are a closed set. Configuration that names an unknown
//!   target kind fails at deserialization, never at dispatch time.

mod forward;
mod routing;
mod sample;
mod scale;
mod target;

pub use forward::*;
pub use routing::*;
pub use sample::*;
pub use scale::*;
pub use target::*;
