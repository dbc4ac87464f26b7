//! Artifactor client
//!
//! Used by test workers to fire hooks on the master.

pub mod client;
pub mod output;

pub use client::{parse_kwarg, ArtifactorClient, DEFAULT_TIMEOUT};
