//! Background draining of transcoder diagnostic output.
//!
//! One task per launched process. It only observes: lines go to `tracing`
//! and a short tail is kept for error reporting. It never signals or waits on
//! the process, and dropping the monitor leaves the task to finish on its own
//! once the pipes close.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::task::JoinHandle;

use crate::process::TranscoderOutput;

/// Number of recent output lines retained.
const TAIL_LINES: usize = 20;

/// Detached output drain for one transcoder.
#[derive(Debug)]
pub struct ProcessMonitor {
    tail: Arc<Mutex<VecDeque<String>>>,
    handle: JoinHandle<u64>,
}

impl ProcessMonitor {
    /// Start draining `output`. `on_close` runs with the number of lines read
    /// once both streams reach EOF, i.e. the process exited or was killed.
    pub fn spawn<F>(label: impl Into<String>, output: TranscoderOutput, on_close: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let label = label.into();
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));
        let task_tail = Arc::clone(&tail);

        let handle = tokio::spawn(async move {
            let mut stdout = output.stdout.map(|s| BufReader::new(s).lines());
            let mut stderr = output.stderr.map(|s| BufReader::new(s).lines());
            let mut stdout_open = stdout.is_some();
            let mut stderr_open = stderr.is_some();
            let mut count = 0u64;

            while stdout_open || stderr_open {
                let line = tokio::select! {
                    res = next_line(&mut stdout), if stdout_open => match res {
                        Some(line) => line,
                        None => {
                            stdout_open = false;
                            continue;
                        }
                    },
                    res = next_line(&mut stderr), if stderr_open => match res {
                        Some(line) => line,
                        None => {
                            stderr_open = false;
                            continue;
                        }
                    },
                };

                count += 1;
                log_line(&label, &line);

                let mut tail = task_tail.lock();
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            tracing::info!(transcoder = %label, lines = count, "Transcoder output closed");
            on_close(count);
            count
        });

        Self { tail, handle }
    }

    /// Most recent output lines, oldest first.
    pub fn recent_output(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    /// Whether both output streams have closed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the drain to finish and return the number of lines read.
    pub async fn join(self) -> u64 {
        self.handle.await.unwrap_or(0)
    }
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.as_mut() {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

fn log_line(label: &str, line: &str) {
    let line = line.trim_end();
    if line.is_empty() {
        return;
    }
    if line.to_ascii_lowercase().contains("error") {
        tracing::warn!(target: "camcast_av::transcoder", transcoder = %label, "{}", line);
    } else {
        tracing::debug!(target: "camcast_av::transcoder", transcoder = %label, "{}", line);
    }
}
