//! Observability: structured logging setup for the `scim-engine` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application. This module provides the one the CLI uses.

mod tracing_init;

pub use tracing_init::*;
