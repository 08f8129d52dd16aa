//! Error types for camcast-av.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the transcoder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The transcoder process could not be started.
    #[error("failed to spawn {tool}: {message}")]
    Spawn { tool: String, message: String },

    /// Delivering a signal to the transcoder's process group failed.
    #[error("failed to signal process group {pgid}: {message}")]
    Signal { pgid: u32, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a spawn error.
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a signal delivery error.
    pub fn signal(pgid: u32, message: impl Into<String>) -> Self {
        Self::Signal {
            pgid,
            message: message.into(),
        }
    }
}
