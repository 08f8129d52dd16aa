//! ffmpeg invocation for RTSP to HLS transcoding.

use std::path::{Path, PathBuf};

/// Settings baked into every transcoder invocation.
///
/// Defaults pull the camera over TCP, re-encode to H.264/AAC with low-latency
/// tuning, and write a rolling five-segment HLS window of two-second segments
/// whose expired files are deleted as soon as they leave the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct HlsTranscodeSettings {
    /// RTSP lower transport (default: tcp).
    pub rtsp_transport: String,
    /// Microseconds of input analysed before the stream starts (default: 10s).
    pub analyze_duration: u64,
    /// Bytes probed to detect input streams (default: 10 MB).
    pub probe_size: u64,
    /// Video encoder (default: libx264).
    pub video_codec: String,
    /// Encoder preset (default: veryfast).
    pub video_preset: String,
    /// Encoder tune (default: zerolatency).
    pub video_tune: Option<String>,
    /// Audio encoder (default: aac).
    pub audio_codec: String,
    /// Target segment duration in seconds (default: 2).
    pub segment_duration_secs: u32,
    /// Number of segments kept in the playlist and on disk (default: 5).
    pub list_size: u32,
    /// ffmpeg log level for diagnostic output (default: warning).
    pub log_level: String,
}

impl Default for HlsTranscodeSettings {
    fn default() -> Self {
        Self {
            rtsp_transport: "tcp".to_string(),
            analyze_duration: 10_000_000,
            probe_size: 10_000_000,
            video_codec: "libx264".to_string(),
            video_preset: "veryfast".to_string(),
            video_tune: Some("zerolatency".to_string()),
            audio_codec: "aac".to_string(),
            segment_duration_secs: 2,
            list_size: 5,
            log_level: "warning".to_string(),
        }
    }
}

impl HlsTranscodeSettings {
    /// Build the full argument list for one transcoding session.
    ///
    /// The playlist path is always the final argument.
    pub fn args(&self, source_uri: &str, playlist: &Path, segment_pattern: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
            // Input
            "-rtsp_transport".to_string(),
            self.rtsp_transport.clone(),
            "-analyzeduration".to_string(),
            self.analyze_duration.to_string(),
            "-probesize".to_string(),
            self.probe_size.to_string(),
            "-i".to_string(),
            source_uri.to_string(),
            // First video stream, first audio stream if the camera has one
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "0:a:0?".to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.video_preset.clone(),
        ];

        if let Some(ref tune) = self.video_tune {
            args.extend(["-tune".to_string(), tune.clone()]);
        }

        args.extend([
            "-c:a".to_string(),
            self.audio_codec.clone(),
            // HLS output
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_duration_secs.to_string(),
            "-hls_list_size".to_string(),
            self.list_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            "-hls_segment_filename".to_string(),
            segment_pattern.to_string_lossy().to_string(),
            playlist.to_string_lossy().to_string(),
        ]);

        args
    }

    /// Build a ready-to-spawn command for `program`.
    pub fn command(
        &self,
        program: impl Into<PathBuf>,
        source_uri: &str,
        playlist: &Path,
        segment_pattern: &Path,
    ) -> TranscoderCommand {
        TranscoderCommand {
            program: program.into(),
            args: self.args(source_uri, playlist, segment_pattern),
        }
    }
}

/// A fully-resolved transcoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscoderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TranscoderCommand {
    /// Short program name used in logs and error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}
