//! strato runner library.
//!
//! This crate primarily ships a `runner` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod auth;
pub mod autoscale;
pub mod bridge;
pub mod config;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod state;
