#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # dbclaim
//!
//! Command-line driver for the database claim reconciler.
//!
//! Re-exports the workspace crates and provides the pieces the binary is
//! built from: configuration, manifest loading and a local requeue-aware
//! simulation loop.

pub use dbclaim_core;
pub use dbclaim_reconciler;

pub mod cli;
pub mod config;
pub mod manifest;
pub mod simulate;
