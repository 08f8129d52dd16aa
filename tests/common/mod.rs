//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] around a fake
//! transcoder: a shell script that accepts ffmpeg's HLS arguments and writes
//! a playlist plus rolling segments into the store. The [`with_server`]
//! constructors start Axum on a random port for HTTP-level testing.
//!
//! [`with_server`]: TestHarness::with_server

#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use camcast::config::Config;
use camcast::server::{create_router, AppContext};
use camcast::supervisor::StreamSupervisor;
use tempfile::TempDir;

/// Every launch appends `<pid> <input>` to `launches.log` next to the store.
const SCRIPT_PRELUDE: &str = r#"#!/bin/sh
input=""
pattern=""
playlist=""
while [ $# -gt 0 ]; do
    case "$1" in
        -i) shift; input="$1" ;;
        -hls_segment_filename) shift; pattern="$1" ;;
    esac
    playlist="$1"
    shift
done
echo "$$ $input" >> "$(dirname "$playlist")/../launches.log"
"#;

const SEGMENT_LOOP: &str = r#"
echo "Input #0, rtsp, from '$input':" >&2
i=0
while :; do
    seg=$(printf "$pattern" "$i")
    echo "segment $i" > "$seg"
    printf '#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:%d\n#EXTINF:2.000000,\n%s\n' "$i" "$(basename "$seg")" > "$playlist.tmp"
    mv "$playlist.tmp" "$playlist"
    i=$((i+1))
    sleep 0.2
done
"#;

/// Behaviour of the stand-in transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeTranscoder {
    /// Writes a playlist and a new segment every 200ms until signalled.
    Streaming,
    /// Runs but never produces a playlist.
    Silent,
    /// Prints an error and exits immediately.
    Crashing,
    /// Streams like [`FakeTranscoder::Streaming`] but ignores SIGTERM.
    IgnoresSigterm,
}

impl FakeTranscoder {
    fn file_name(&self) -> &'static str {
        match self {
            FakeTranscoder::Streaming => "streaming.sh",
            FakeTranscoder::Silent => "silent.sh",
            FakeTranscoder::Crashing => "crashing.sh",
            FakeTranscoder::IgnoresSigterm => "ignores_sigterm.sh",
        }
    }

    fn script(&self) -> String {
        let body = match self {
            FakeTranscoder::Streaming => SEGMENT_LOOP.to_string(),
            FakeTranscoder::Silent => "\nexec sleep 30\n".to_string(),
            FakeTranscoder::Crashing => {
                "\necho \"[rtsp @ 0x0] Connection to $input failed: Connection refused\" >&2\nexit 1\n"
                    .to_string()
            }
            FakeTranscoder::IgnoresSigterm => format!("\ntrap '' TERM\n{}", SEGMENT_LOOP),
        };
        format!("{}{}", SCRIPT_PRELUDE, body)
    }

    /// Path of the executable script, written once per test binary.
    pub fn path(&self) -> PathBuf {
        static DIR: OnceLock<PathBuf> = OnceLock::new();
        let dir = DIR.get_or_init(|| {
            let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR"))
                .join(format!("fake-transcoders-{}", std::process::id()));
            std::fs::create_dir_all(&dir).expect("failed to create script dir");
            for kind in [
                FakeTranscoder::Streaming,
                FakeTranscoder::Silent,
                FakeTranscoder::Crashing,
                FakeTranscoder::IgnoresSigterm,
            ] {
                let staged = dir.join(format!("{}.partial", kind.file_name()));
                std::fs::write(&staged, kind.script()).expect("failed to write script");
                std::fs::set_permissions(&staged, std::fs::Permissions::from_mode(0o755))
                    .expect("failed to chmod script");
                std::fs::rename(&staged, dir.join(kind.file_name()))
                    .expect("failed to install script");
            }
            dir
        });
        dir.join(self.file_name())
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] whose store lives
/// in a temporary directory.
pub struct TestHarness {
    pub ctx: AppContext,
    pub root: TempDir,
}

impl TestHarness {
    /// Harness with a streaming fake transcoder and fast timings.
    pub fn new() -> Self {
        Self::with_transcoder(FakeTranscoder::Streaming)
    }

    pub fn with_transcoder(kind: FakeTranscoder) -> Self {
        Self::build(kind.path(), |_| {})
    }

    /// Harness with a custom program and config tweaks applied on top of the
    /// fast test timings.
    pub fn build(program: PathBuf, tweak: impl FnOnce(&mut Config)) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = fast_config(&root.path().join("hls"));
        tweak(&mut config);

        std::fs::create_dir_all(&config.store.dir).expect("failed to create store dir");
        let ctx = AppContext::new(config, program);

        Self { ctx, root }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_transcoder(FakeTranscoder::Streaming).await
    }

    pub async fn with_server_transcoder(kind: FakeTranscoder) -> (Self, SocketAddr) {
        let harness = Self::with_transcoder(kind);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    pub fn supervisor(&self) -> &StreamSupervisor {
        &self.ctx.supervisor
    }

    pub fn store_dir(&self) -> &Path {
        self.ctx.store.dir()
    }

    /// `(pid, input)` of every transcoder launched so far, oldest first.
    pub fn launches(&self) -> Vec<(i32, String)> {
        let log = match std::fs::read_to_string(self.root.path().join("launches.log")) {
            Ok(log) => log,
            Err(_) => return Vec::new(),
        };
        log.lines()
            .filter_map(|line| {
                let (pid, input) = line.split_once(' ')?;
                Some((pid.parse().ok()?, input.to_string()))
            })
            .collect()
    }

    /// Names of playlist and segment files currently in the store, sorted.
    pub fn managed_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.store_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .filter(|name| camcast::SegmentStore::is_managed(name))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Segment files currently in the store.
    pub fn segments(&self) -> Vec<String> {
        self.managed_files()
            .into_iter()
            .filter(|name| name.ends_with(".ts"))
            .collect()
    }

    /// Wait until at least one segment exists.
    pub async fn wait_for_segment(&self) -> String {
        wait_until(Duration::from_secs(5), || self.segments().first().cloned())
            .await
            .expect("no segment was written")
    }
}

/// Config with the store in `store_dir` and timings short enough for tests.
pub fn fast_config(store_dir: &Path) -> Config {
    let mut config = Config::default();
    config.store.dir = store_dir.to_path_buf();
    config.supervisor.termination_timeout_ms = 1_000;
    config.supervisor.settle_delay_ms = 50;
    config.supervisor.settle_attempts = 3;
    config.supervisor.startup_timeout_ms = 5_000;
    config.supervisor.poll_interval_ms = 25;
    config
}

/// Whether a process with `pid` still exists (unreaped zombies count).
pub fn process_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Like [`process_alive`] but a zombie awaiting reaping counts as gone.
pub fn process_running(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // State is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map_or(true, |state| state != "Z"),
        Err(_) => process_alive(pid),
    }
}

/// Poll `check` every 25ms until it yields a value or `timeout` elapses.
pub async fn wait_until<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
