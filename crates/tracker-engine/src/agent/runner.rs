//! Agent subprocess lifecycle.
//!
//! Spawns the external coding agent, streams its stdout line-by-line into a
//! per-plan JSONL log file, and assembles the plain-text transcript needed
//! for verdict parsing. stdout and stderr are drained concurrently so a
//! chatty agent can never deadlock on a full pipe buffer.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use tracker_core::config::Config;
use tracker_core::stream::TranscriptBuilder;
use tracker_core::Result;

use crate::children;

/// How the invocation relates to an agent conversation.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Start a fresh conversation with this id (`--session-id`).
    New(String),
    /// Continue an existing conversation (`--resume`).
    Resume(String),
}

/// Result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub exit_code: i32,
    /// Concatenated text content of the agent's assistant messages.
    pub transcript: String,
    /// Session id the agent reported, if its stream carried one.
    pub session_id: Option<String>,
}

impl AgentRun {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawns and supervises the external agent binary.
#[derive(Debug, Clone)]
pub struct AgentRunner {
    binary: PathBuf,
    skip_permissions: bool,
    otel_enabled: bool,
    otel_endpoint: Option<String>,
}

impl AgentRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: PathBuf::from("claude"),
            skip_permissions: config.skip_permissions,
            otel_enabled: config.otel.enabled,
            otel_endpoint: config.otel.endpoint.clone(),
        }
    }

    /// Override the agent binary (tests point this at a stub).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Run the agent once: prompt in, `(exit_code, transcript)` out.
    ///
    /// The prompt goes to the child's stdin via an unlinked temp file, so an
    /// arbitrarily large prompt never hits argv limits and leaves nothing on
    /// disk after spawn.
    pub async fn run(
        &self,
        prompt: &str,
        session: &SessionMode,
        cwd: &Path,
        log_path: &Path,
    ) -> Result<AgentRun> {
        let mut prompt_file = tempfile::NamedTempFile::new()?;
        prompt_file.write_all(prompt.as_bytes())?;
        prompt_file.flush()?;
        let stdin_file = prompt_file.reopen()?;

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-p").arg("-");
        match session {
            SessionMode::New(id) => {
                cmd.arg("--session-id").arg(id);
            }
            SessionMode::Resume(id) => {
                cmd.arg("--resume").arg(id);
            }
        }
        if self.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        cmd.arg("--verbose").arg("--output-format").arg("stream-json");
        cmd.current_dir(cwd)
            .stdin(Stdio::from(stdin_file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if self.otel_enabled {
            cmd.env("CLAUDE_CODE_ENABLE_TELEMETRY", "1");
            if let Some(endpoint) = &self.otel_endpoint {
                cmd.env("OTEL_EXPORTER_OTLP_ENDPOINT", endpoint);
            }
        }

        // Own process group: terminal SIGINT stays with the orchestrator and
        // the agent survives it (cancellation goes through ChildTable).
        #[cfg(unix)]
        cmd.process_group(0);

        info!(
            binary = %self.binary.display(),
            cwd = %cwd.display(),
            session = ?session,
            log = %log_path.display(),
            "spawning agent"
        );
        let mut child = cmd.spawn()?;
        // Temp file already handed to the child as an fd; unlink it now.
        drop(prompt_file);

        let pid = child.id();
        if let Some(pid) = pid {
            children::register(pid);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain stderr concurrently so neither pipe can fill up.
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(agent_stderr = %line);
                }
            }
        });

        let mut builder = TranscriptBuilder::new();
        if let Some(stdout) = stdout {
            if let Some(parent) = log_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut log = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .await?;

            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                log.write_all(line.as_bytes()).await?;
                log.write_all(b"\n").await?;
                builder.feed(&line);
            }
            log.flush().await?;
        }

        let status = child.wait().await?;
        let _ = stderr_task.await;
        if let Some(pid) = pid {
            children::unregister(pid);
        }

        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, finished = builder.finished(), "agent exited");

        Ok(AgentRun {
            exit_code,
            transcript: builder.transcript(),
            session_id: builder.session_id().map(String::from),
        })
    }
}
