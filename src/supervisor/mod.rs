//! Stream supervisor.
//!
//! Owns the single transcoder process and sequences every transition so the
//! segment store never mixes files from two sessions:
//!
//! - start: terminate previous, purge, settle, launch, wait for playlist
//! - stop: terminate, clear, settle, purge
//!
//! The operation lock is held for the whole of a start or stop. A second
//! caller queues behind an in-flight startup and only sees its outcome.
//! [`StreamSupervisor::status`] reads a separate snapshot and never waits.

mod types;

pub use types::*;

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camcast_av::{HlsTranscodeSettings, ProcessMonitor, TranscoderProcess};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::segments::SegmentStore;

/// How long a failed startup waits for the monitor to capture final output.
const EXIT_OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// The live session. Dropping it kills the transcoder's process group.
#[derive(Debug)]
struct StreamSession {
    id: Uuid,
    source_uri: String,
    started_at: DateTime<Utc>,
    process: TranscoderProcess,
    monitor: ProcessMonitor,
}

/// Coordinates start, replace and stop of the one transcoder.
pub struct StreamSupervisor {
    config: SupervisorConfig,
    settings: HlsTranscodeSettings,
    program: PathBuf,
    store: SegmentStore,
    active: Mutex<Option<StreamSession>>,
    status: Arc<RwLock<StreamStatus>>,
    last_token: AtomicI64,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl StreamSupervisor {
    pub fn new(
        config: SupervisorConfig,
        settings: HlsTranscodeSettings,
        program: impl Into<PathBuf>,
        store: SegmentStore,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            config,
            settings,
            program: program.into(),
            store,
            active: Mutex::new(None),
            status: Arc::new(RwLock::new(StreamStatus::idle())),
            last_token: AtomicI64::new(0),
            event_tx,
        }
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn status(&self) -> StreamStatus {
        self.status.read().clone()
    }

    /// Start streaming `source_uri`, replacing any running session.
    ///
    /// Returns once the new transcoder has written a non-empty playlist.
    pub async fn start_stream(&self, source_uri: &str) -> Result<PlaybackRef> {
        let source_uri = source_uri.trim();
        if source_uri.is_empty() {
            return Err(Error::validation("RTSP url is required"));
        }

        let mut active = self.active.lock().await;
        let guard = TransitionGuard::new(self);

        if let Some(previous) = active.take() {
            tracing::info!(
                session_id = %previous.id,
                source = %previous.source_uri,
                "Replacing active stream"
            );
            self.set_state(StreamState::Stopping);
            self.terminate(previous).await;
        }

        let session_id = Uuid::new_v4();
        {
            let mut status = self.status.write();
            *status = StreamStatus {
                state: StreamState::Starting,
                session_id: Some(session_id),
                source_uri: Some(source_uri.to_string()),
                started_at: None,
                transcoder_running: false,
                playback: None,
            };
        }

        match self.launch(session_id, source_uri).await {
            Ok(session) => {
                let playback = PlaybackRef::new(self.next_token());
                let pid = session.process.id();

                {
                    let mut status = self.status.write();
                    status.state = StreamState::Running;
                    status.started_at = Some(session.started_at);
                    status.playback = Some(playback.clone());
                }
                *active = Some(session);
                guard.disarm();

                tracing::info!(%session_id, pid, source = %source_uri, "Stream started");
                self.broadcast(StreamEvent::Started {
                    session_id,
                    source_uri: source_uri.to_string(),
                    pid,
                    playback: playback.clone(),
                });

                Ok(playback)
            }
            Err(e) => {
                tracing::error!(%session_id, source = %source_uri, error = %e, "Stream failed to start");
                *self.status.write() = StreamStatus::idle();
                guard.disarm();
                self.broadcast(StreamEvent::StartupFailed {
                    session_id,
                    source_uri: source_uri.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Stop the running session and clear the segment store.
    pub async fn stop_stream(&self) -> Result<StopAck> {
        let mut active = self.active.lock().await;

        let session = active.take().ok_or(Error::NoActiveStream)?;
        let session_id = session.id;
        let guard = TransitionGuard::new(self);
        self.set_state(StreamState::Stopping);

        let (forced, files_removed) = self.terminate(session).await;
        guard.disarm();
        drop(active);

        Ok(StopAck {
            session_id,
            forced,
            files_removed,
        })
    }

    /// Stop whatever is running. Used on server exit; idle is not an error.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        if let Some(session) = active.take() {
            tracing::info!(session_id = %session.id, "Stopping stream for shutdown");
            let guard = TransitionGuard::new(self);
            self.set_state(StreamState::Stopping);
            self.terminate(session).await;
            guard.disarm();
        }
    }

    /// Terminate, clear, settle, purge. Always leaves the supervisor idle.
    ///
    /// Returns whether the transcoder had to be force-killed and how many
    /// files the purge removed.
    async fn terminate(&self, mut session: StreamSession) -> (bool, usize) {
        let forced = match session
            .process
            .shutdown(self.config.termination_timeout())
            .await
        {
            Ok(termination) => {
                tracing::debug!(
                    session_id = %session.id,
                    status = %termination.status(),
                    forced = termination.was_forced(),
                    "Transcoder terminated"
                );
                termination.was_forced()
            }
            Err(e) => {
                // Dropping the session below sends SIGKILL to the group
                tracing::warn!(session_id = %session.id, error = %e, "Transcoder shutdown failed, killing");
                true
            }
        };

        let session_id = session.id;
        if session.monitor.is_finished() {
            tracing::debug!(%session_id, "Transcoder output already closed");
        }
        drop(session);

        tokio::time::sleep(self.config.settle_delay()).await;
        let report = self.store.purge().await;

        *self.status.write() = StreamStatus::idle();
        tracing::info!(%session_id, forced, removed = report.removed, "Stream stopped");
        self.broadcast(StreamEvent::Stopped { session_id, forced });

        (forced, report.removed)
    }

    /// Purge, settle, spawn, and wait for the first playlist.
    async fn launch(&self, session_id: Uuid, source_uri: &str) -> Result<StreamSession> {
        let (report, clean) = self
            .store
            .purge_until_clean(self.config.settle_delay(), self.config.settle_attempts)
            .await;
        if !clean {
            tracing::warn!(
                failed = report.failed,
                "Segment store still not empty, launching anyway"
            );
        }

        let prefix = session_prefix(&session_id);
        let command = self.settings.command(
            &self.program,
            source_uri,
            &self.store.playlist_path(),
            &self.store.segment_pattern(&prefix),
        );
        let (mut process, output) = TranscoderProcess::spawn(&command)?;
        tracing::debug!(
            %session_id,
            pid = process.id(),
            program = process.program(),
            args = ?command.args,
            "Launched transcoder"
        );
        self.status.write().transcoder_running = true;

        let monitor = {
            let status = Arc::clone(&self.status);
            let event_tx = self.event_tx.clone();
            ProcessMonitor::spawn(prefix, output, move |_lines| {
                {
                    let mut status = status.write();
                    if status.session_id == Some(session_id) {
                        status.transcoder_running = false;
                    }
                }
                let _ = event_tx.send(StreamEvent::TranscoderExited { session_id });
            })
        };

        if let Err(e) = self.wait_for_playlist(&mut process, &monitor).await {
            // Whatever it managed to write must not leak into the next session
            if let Err(kill_err) = process.shutdown(self.config.termination_timeout()).await {
                tracing::warn!(%session_id, error = %kill_err, "Failed to stop transcoder after startup failure");
            }
            drop(process);
            self.store.purge().await;
            return Err(e);
        }

        Ok(StreamSession {
            id: session_id,
            source_uri: source_uri.to_string(),
            started_at: Utc::now(),
            process,
            monitor,
        })
    }

    async fn wait_for_playlist(
        &self,
        process: &mut TranscoderProcess,
        monitor: &ProcessMonitor,
    ) -> Result<()> {
        let playlist = self.store.playlist_path();
        let waited = self.config.startup_timeout();
        let deadline = Instant::now() + waited;

        loop {
            if let Ok(meta) = tokio::fs::metadata(&playlist).await {
                if meta.is_file() && meta.len() > 0 {
                    return Ok(());
                }
            }

            if let Some(status) = process.try_wait()? {
                let _ = tokio::time::timeout(EXIT_OUTPUT_GRACE, async {
                    while !monitor.is_finished() {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await;
                return Err(Error::TranscoderExited {
                    status: status.to_string(),
                    output: exit_output(&monitor.recent_output()),
                });
            }

            if Instant::now() >= deadline {
                return Err(Error::StartupTimeout { waited });
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Millisecond timestamp, strictly greater than any token handed out before.
    fn next_token(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_token
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1).to_string()
    }

    fn set_state(&self, state: StreamState) {
        self.status.write().state = state;
    }

    fn broadcast(&self, event: StreamEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("No subscribers for stream event");
        }
    }
}

/// Puts the supervisor back to idle when a transition future is dropped
/// before it finishes.
///
/// Dropping the future already kills any transcoder it owned; what is left
/// is the status snapshot and whatever the transcoder wrote. Both are reset
/// here while the operation lock is still held, so the next transition
/// starts from a clean store.
struct TransitionGuard<'a> {
    supervisor: &'a StreamSupervisor,
    armed: bool,
}

impl<'a> TransitionGuard<'a> {
    fn new(supervisor: &'a StreamSupervisor) -> Self {
        Self {
            supervisor,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session_id = self.supervisor.status.read().session_id;
        tracing::warn!(?session_id, "Stream transition abandoned, resetting to idle");
        *self.supervisor.status.write() = StreamStatus::idle();
        self.supervisor.store.purge_blocking();
    }
}

/// Up to the last three transcoder lines, joined for an error message.
fn exit_output(lines: &[String]) -> Option<String> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines[lines.len().saturating_sub(3)..].join(" | "))
}

/// First eight hex digits of the session id, used to name its segments.
fn session_prefix(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
