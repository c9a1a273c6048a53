//! crpt-client - Rate-limited document submission client
//!
//! This crate submits documents to the Chestny ZNAK document-creation API
//! while keeping every request behind a fixed-window admission gate, so the
//! service never sees more than the configured number of requests per window
//! from one client, however many tasks share it.

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod ratelimit;

pub use client::DocumentClient;
pub use error::{ClientError, Result};
