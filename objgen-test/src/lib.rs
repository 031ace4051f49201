//! Test utilities for `objgen` and its engine.
//!
//! This crate provides utilities to facilitate testing load tests without a real object store. See
//! the modules for all available utilities.

pub mod client;
pub mod tracing;
