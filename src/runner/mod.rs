//! Single-query runner: replay one query against the agent CLI inside an
//! ephemeral sandbox and report whether the synthetic command was invoked.
//!
//! Each run owns one subprocess and one private temp directory. Stdout is
//! pulled by a reader thread into a bounded queue; the consumer drains it
//! with a short poll timeout so the wall-clock deadline is always honored,
//! then hard-kills the subprocess when it expires.

pub mod sandbox;
pub mod stream;

use crate::runner::sandbox::Sandbox;
use crate::runner::stream::{LineAssembler, TriggerDetector};
use anyhow::{anyhow, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Upper bound on buffered stdout chunks before the reader thread blocks
const CHUNK_QUEUE_DEPTH: usize = 32;
/// Read chunk size
const CHUNK_BYTES: usize = 8192;
/// Poll slice for the consumer; reads never block longer than this
const POLL_SLICE: Duration = Duration::from_millis(100);
/// How long a finished stream's subprocess may linger before being killed
const REAP_GRACE: Duration = Duration::from_secs(2);

/// One query replayed against a candidate description.
///
/// Implementations are called concurrently from worker threads; the
/// description is a parameter so one runner serves every round of an
/// optimization loop.
pub trait QueryRunner: Send + Sync {
    fn run_query(&self, query: &str, description: &str) -> Result<bool>;
}

/// Runner backed by the external agent CLI.
pub struct AgentRunner {
    pub agent_bin: String,
    pub project_root: PathBuf,
    pub timeout: Duration,
    pub model: Option<String>,
    pub trigger_tools: Vec<String>,
    pub verbose: bool,
}

impl QueryRunner for AgentRunner {
    fn run_query(&self, query: &str, description: &str) -> Result<bool> {
        let sandbox = Sandbox::create(description)?;

        let mut cmd = Command::new(&self.agent_bin);
        cmd.arg("-p")
            .arg(query)
            .args([
                "--output-format",
                "stream-json",
                "--include-partial-messages",
                "--verbose",
            ])
            .arg("--add-dir")
            .arg(sandbox.path())
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(model) = &self.model {
            cmd.args(["--model", model]);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("agent CLI `{}` not found in PATH", self.agent_bin)
            } else {
                anyhow!("failed to spawn agent CLI `{}`: {}", self.agent_bin, e)
            }
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("agent stdout unavailable"))?;

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(CHUNK_QUEUE_DEPTH);
        let reader = thread::spawn(move || reader_loop(stdout, tx));

        let mut assembler = LineAssembler::default();
        let mut detector = TriggerDetector::new(&sandbox.marker, &self.trigger_tools);
        let deadline = Instant::now() + self.timeout;
        let mut timed_out = false;

        loop {
            if detector.finished {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                timed_out = true;
                break;
            }
            let slice = POLL_SLICE.min(deadline - now);
            match rx.recv_timeout(slice) {
                Ok(chunk) => {
                    for line in assembler.push(&chunk) {
                        detector.feed_line(&line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break, // stdout closed
            }
        }

        if timed_out {
            if self.verbose {
                eprintln!(
                    "[runner] query timed out after {}s: {}",
                    self.timeout.as_secs(),
                    preview(query)
                );
            }
            let _ = child.kill();
            let _ = child.wait();
        } else if child.wait_timeout(REAP_GRACE).ok().flatten().is_none() {
            // stream is done but the process lingers; it must not wedge the
            // worker that owns this run
            let _ = child.kill();
            let _ = child.wait();
        }

        // unblock the reader if the bounded queue is full, then reap it
        drop(rx);
        let _ = reader.join();

        Ok(detector.triggered)
    }
}

fn reader_loop(mut stdout: ChildStdout, tx: SyncSender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

fn preview(query: &str) -> &str {
    let end = query
        .char_indices()
        .nth(60)
        .map(|(i, _)| i)
        .unwrap_or(query.len());
    &query[..end]
}

/// Verify the agent CLI can be found before any work starts.
pub fn ensure_agent_available(bin: &str) -> Result<()> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(());
        }
        return Err(anyhow!("agent CLI `{}` not found", bin));
    }
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        if dir.join(bin).is_file() {
            return Ok(());
        }
    }
    Err(anyhow!(
        "agent CLI `{}` not found in PATH; install it or set agent_bin in .skillforge/config.toml",
        bin
    ))
}
