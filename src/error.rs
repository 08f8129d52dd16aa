//! Error taxonomy for stream supervision.
//!
//! Every failure the supervisor or segment store can report is an [`Error`];
//! the HTTP surface maps each variant to a status code via
//! [`Error::http_status`] and never lets one escape as a crash.

use std::time::Duration;

/// Errors surfaced by the stream supervisor and segment store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was missing or carried a bad input address.
    #[error("{0}")]
    Validation(String),

    /// The transcoder could not be started.
    #[error("Failed to launch transcoder: {0}")]
    Launch(String),

    /// The transcoder never produced a playlist within the warm-up window.
    #[error("Stream did not start within {}s: no playlist was produced", secs(.waited))]
    StartupTimeout { waited: Duration },

    /// The transcoder exited before producing a playlist.
    #[error("Transcoder exited during startup ({status}){}", suffix(.output))]
    TranscoderExited {
        status: String,
        output: Option<String>,
    },

    /// Stop was requested with nothing running.
    #[error("no stream running")]
    NoActiveStream,

    /// The requested file is not in the segment store.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The transcoder could not be signalled or reaped.
    #[error("Failed to terminate transcoder: {0}")]
    Termination(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NoActiveStream => 400,
            Error::NotFound(_) => 404,
            Error::Launch(_) => 500,
            Error::StartupTimeout { .. } => 500,
            Error::TranscoderExited { .. } => 500,
            Error::Termination(_) => 500,
            Error::Io(_) => 500,
        }
    }

    /// Machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Launch(_) => "launch_error",
            Error::StartupTimeout { .. } => "startup_timeout",
            Error::TranscoderExited { .. } => "transcoder_exited",
            Error::NoActiveStream => "no_active_stream",
            Error::NotFound(_) => "not_found",
            Error::Termination(_) => "termination_error",
            Error::Io(_) => "io_error",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound(name.into())
    }
}

impl From<camcast_av::Error> for Error {
    fn from(e: camcast_av::Error) -> Self {
        match e {
            camcast_av::Error::ToolNotFound { .. } | camcast_av::Error::Spawn { .. } => {
                Error::Launch(e.to_string())
            }
            camcast_av::Error::Signal { .. } => Error::Termination(e.to_string()),
            camcast_av::Error::Io(io) => Error::Io(io),
        }
    }
}

fn secs(d: &Duration) -> f32 {
    d.as_secs_f32()
}

fn suffix(output: &Option<String>) -> String {
    output
        .as_deref()
        .map(|o| format!(": {o}"))
        .unwrap_or_default()
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
