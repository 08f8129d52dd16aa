use camcast_av::HlsTranscodeSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL used in `stream_url`
    /// (e.g. `https://cams.example.com`). When unset the request's Host
    /// header is used.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the playlist and its segments.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./hls")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    /// Explicit ffmpeg binary; looked up on PATH when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default = "default_rtsp_transport")]
    pub rtsp_transport: String,

    #[serde(default = "default_probe")]
    pub analyze_duration: u64,

    #[serde(default = "default_probe")]
    pub probe_size: u64,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    /// Encoder tune; an empty string disables `-tune`.
    #[serde(default = "default_video_tune")]
    pub video_tune: Option<String>,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Target segment length in seconds (default: 2)
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Segments kept in the playlist and on disk (default: 5)
    #[serde(default = "default_list_size")]
    pub list_size: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_rtsp_transport() -> String {
    "tcp".to_string()
}
fn default_probe() -> u64 {
    10_000_000
}
fn default_video_codec() -> String {
    "libx264".to_string()
}
fn default_video_preset() -> String {
    "veryfast".to_string()
}
fn default_video_tune() -> Option<String> {
    Some("zerolatency".to_string())
}
fn default_audio_codec() -> String {
    "aac".to_string()
}
fn default_segment_duration() -> u32 {
    2
}
fn default_list_size() -> u32 {
    5
}
fn default_log_level() -> String {
    "warning".to_string()
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            rtsp_transport: default_rtsp_transport(),
            analyze_duration: default_probe(),
            probe_size: default_probe(),
            video_codec: default_video_codec(),
            video_preset: default_video_preset(),
            video_tune: default_video_tune(),
            audio_codec: default_audio_codec(),
            segment_duration_secs: default_segment_duration(),
            list_size: default_list_size(),
            log_level: default_log_level(),
        }
    }
}

impl From<&TranscoderConfig> for HlsTranscodeSettings {
    fn from(tc: &TranscoderConfig) -> Self {
        Self {
            rtsp_transport: tc.rtsp_transport.clone(),
            analyze_duration: tc.analyze_duration,
            probe_size: tc.probe_size,
            video_codec: tc.video_codec.clone(),
            video_preset: tc.video_preset.clone(),
            video_tune: tc.video_tune.clone().filter(|t| !t.is_empty()),
            audio_codec: tc.audio_codec.clone(),
            segment_duration_secs: tc.segment_duration_secs,
            list_size: tc.list_size,
            log_level: tc.log_level.clone(),
        }
    }
}

/// Timing of stream transitions. All values are milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// How long a transcoder gets to exit after SIGTERM before SIGKILL.
    #[serde(default = "default_termination_timeout")]
    pub termination_timeout_ms: u64,

    /// Pause between deleting segments and trusting the directory is empty.
    /// Best-effort: the emptiness is re-checked afterwards.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Purge/settle rounds attempted before launching regardless.
    #[serde(default = "default_settle_attempts")]
    pub settle_attempts: u32,

    /// How long a new transcoder has to write its first playlist.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,

    /// How often the playlist is looked for during startup.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_termination_timeout() -> u64 {
    5_000
}
fn default_settle_delay() -> u64 {
    500
}
fn default_settle_attempts() -> u32 {
    3
}
fn default_startup_timeout() -> u64 {
    15_000
}
fn default_poll_interval() -> u64 {
    250
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            termination_timeout_ms: default_termination_timeout(),
            settle_delay_ms: default_settle_delay(),
            settle_attempts: default_settle_attempts(),
            startup_timeout_ms: default_startup_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl SupervisorConfig {
    pub fn termination_timeout(&self) -> Duration {
        Duration::from_millis(self.termination_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
