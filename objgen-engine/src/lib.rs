//! The engine of `objgen`, a load generator for object storage services.
//!
//! A load test admits requests through a [`Scheduler`](scheduler::Scheduler), synthesizes them
//! from a [`RequestMix`](mix::RequestMix) while the [`ObjectManager`](manager::ObjectManager)
//! guarantees that reads and deletes only target objects known to exist, and aggregates responses
//! in [`Statistics`](statistics::Statistics) until a stopping condition is met.
//!
//! The transport is abstracted behind the [`Client`](client::Client) trait, see the
//! [`load_test`] module for the operation loop tying everything together.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod error;

pub mod choice;
pub mod client;
pub mod distribution;
pub mod manager;
pub mod mix;
pub mod object;
pub mod pending;
pub mod persist;
pub mod request;
pub mod scheduler;
pub mod statistics;
pub mod stop;
pub mod summary;

pub use error::{Error, Result};
