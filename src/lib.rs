//! camcast - RTSP camera to HLS relay
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod segments;
pub mod server;
pub mod supervisor;

pub use error::{Error, Result};
pub use segments::SegmentStore;
pub use supervisor::{PlaybackRef, StreamEvent, StreamState, StreamStatus, StreamSupervisor};
