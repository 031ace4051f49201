//! The `objgen` command line tool.
//!
//! This wires the [`objgen_engine`] into an executable: it loads the layered [`config`], sets up
//! [`observability`], sends requests through the [`http`] client and reports the summary of a
//! run. [`setup`] turns a configuration into the components of a load test.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod http;
pub mod observability;
pub mod payload;
pub mod setup;
