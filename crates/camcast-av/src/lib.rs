//! # camcast-av
//!
//! Everything camcast knows about its external transcoder:
//!
//! - [`HlsTranscodeSettings`] builds the ffmpeg command line for an RTSP to
//!   HLS session
//! - [`TranscoderProcess`] owns the spawned process group and stops it with
//!   SIGTERM, escalating to SIGKILL
//! - [`ProcessMonitor`] drains the transcoder's output into `tracing`
//! - [`tools`] locates ffmpeg
//!
//! ## Example
//!
//! ```no_run
//! use camcast_av::{HlsTranscodeSettings, ProcessMonitor, TranscoderProcess};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> camcast_av::Result<()> {
//! let command = HlsTranscodeSettings::default().command(
//!     "ffmpeg",
//!     "rtsp://camera.local/stream",
//!     Path::new("/srv/hls/stream.m3u8"),
//!     Path::new("/srv/hls/stream_%d.ts"),
//! );
//! let (mut process, output) = TranscoderProcess::spawn(&command)?;
//! let _monitor = ProcessMonitor::spawn("camera", output, |_| {});
//! process.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod command;
pub mod monitor;
pub mod process;
pub mod tools;

// Re-exports
pub use command::{HlsTranscodeSettings, TranscoderCommand};
pub use error::{Error, Result};
pub use monitor::ProcessMonitor;
pub use process::{Termination, TranscoderOutput, TranscoderProcess};
pub use tools::{check_tools, get_tool_path, require_tool, ToolInfo};
