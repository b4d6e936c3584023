//! SCIM 2.0 filter and PATCH engines.
//!
//! See [`scim`] for the engine itself and [`config`] for the TOML
//! configuration that drives it.

pub mod config;
#[cfg(feature = "cli")]
pub mod observability;
pub mod scim;
