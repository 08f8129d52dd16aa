use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::segments::PLAYLIST_NAME;

/// Lifecycle of the single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Where clients fetch the playlist of a freshly started stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackRef {
    /// Absolute path of the playlist on the HTTP surface.
    pub path: String,
    /// Cache-busting token, unique per successful start.
    pub token: String,
}

impl PlaybackRef {
    pub(crate) fn new(token: String) -> Self {
        Self {
            path: format!("/hls/{}", PLAYLIST_NAME),
            token,
        }
    }

    /// `/hls/stream.m3u8?t=<token>`
    pub fn path_and_query(&self) -> String {
        format!("{}?t={}", self.path, self.token)
    }

    /// Full URL under `base` (scheme and authority, trailing slash optional).
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path_and_query())
    }
}

/// Acknowledgement of a completed stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAck {
    pub session_id: Uuid,
    /// Whether the transcoder had to be killed after ignoring SIGTERM.
    pub forced: bool,
    /// Playlist and segment files removed afterwards.
    pub files_removed: usize,
}

/// Point-in-time view of the supervisor, readable without waiting on an
/// in-flight start or stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub session_id: Option<Uuid>,
    pub source_uri: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// False once the transcoder's output has closed, even if no stop was
    /// requested yet.
    pub transcoder_running: bool,
    pub playback: Option<PlaybackRef>,
}

impl StreamStatus {
    pub(crate) fn idle() -> Self {
        Self {
            state: StreamState::Idle,
            session_id: None,
            source_uri: None,
            started_at: None,
            transcoder_running: false,
            playback: None,
        }
    }
}

/// Lifecycle notifications.
///
/// Nothing inside camcast reacts to [`StreamEvent::TranscoderExited`]; a
/// subscriber that wants crash recovery can call `start_stream` again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamEvent {
    Started {
        session_id: Uuid,
        source_uri: String,
        pid: u32,
        playback: PlaybackRef,
    },
    StartupFailed {
        session_id: Uuid,
        source_uri: String,
        error: String,
    },
    Stopped {
        session_id: Uuid,
        forced: bool,
    },
    /// The transcoder's output closed: it exited or was killed.
    TranscoderExited {
        session_id: Uuid,
    },
}
