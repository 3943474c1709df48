use crate::caller::RemoteCaller;
use crate::envelope::parse_correlated;
use crate::error::{CallError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use slowscope_protocol::{RemoteCallRequest, RemoteCallResult};
use std::collections::BTreeMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

pub const DEFAULT_UNSUPPORTED_MARKERS: &[&str] = &[
    "unsupported tool",
    "unknown tool",
    "tool not found",
    "invalid tool name",
];

static NEXT_CORRELATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonically increasing request id.
pub fn next_correlation_id() -> u64 {
    NEXT_CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// How to launch the helper. Credentials travel in `env` and are never inspected here.
#[derive(Debug, Clone)]
pub struct HelperCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Case-insensitive stderr markers meaning "the helper does not know this tool".
    pub unsupported_markers: Vec<String>,
}

impl HelperCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            unsupported_markers: DEFAULT_UNSUPPORTED_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn unsupported_marker_line(&self, stderr: &str) -> Option<String> {
        let markers: Vec<String> = self
            .unsupported_markers
            .iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        stderr
            .lines()
            .find(|line| {
                let lower = line.to_ascii_lowercase();
                markers.iter().any(|m| lower.contains(m.as_str()))
            })
            .map(|line| line.trim().to_string())
    }
}

struct RawOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: ExitStatus,
}

/// One subprocess per call: spawn, write one request, close stdin, drain, reap.
#[derive(Debug, Clone)]
pub struct SubprocessTransport {
    command: HelperCommand,
}

impl SubprocessTransport {
    pub fn new(command: HelperCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &HelperCommand {
        &self.command
    }

    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<RemoteCallResult> {
        let request = RemoteCallRequest::new(next_correlation_id(), tool_name, arguments);
        let line = request.to_line()?;

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|source| CallError::TransportStartFailure {
                program: self.command.program.clone(),
                source,
            })?;
        log::debug!(
            "{tool_name}: spawned helper pid={:?} id={}",
            child.id(),
            request.correlation_id
        );

        let exchanged = tokio::time::timeout(timeout, exchange(&mut child, &line)).await;
        let output = match exchanged {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                terminate(&mut child, tool_name).await;
                return Err(CallError::Io {
                    tool: tool_name.to_string(),
                    source,
                });
            }
            Err(_) => {
                terminate(&mut child, tool_name).await;
                log::warn!(
                    "{tool_name}: helper killed after {}ms without completing",
                    started.elapsed().as_millis()
                );
                return Err(CallError::Timeout {
                    tool: tool_name.to_string(),
                    after: timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(detail) = self.command.unsupported_marker_line(&stderr) {
            return Err(CallError::UnsupportedTool {
                tool: tool_name.to_string(),
                detail,
            });
        }
        if !output.status.success() {
            log::warn!(
                "{tool_name}: helper exited with {} (stderr: {})",
                output.status,
                stderr_tail(&stderr)
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_correlated(&stdout, tool_name, Some(request.correlation_id))?;
        log::debug!(
            "{tool_name}: {} envelope(s) in {}ms",
            parsed.envelopes.len(),
            started.elapsed().as_millis()
        );
        Ok(parsed)
    }
}

#[async_trait]
impl RemoteCaller for SubprocessTransport {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<RemoteCallResult> {
        self.invoke(tool_name, arguments, timeout).await
    }
}

async fn exchange(child: &mut Child, request: &[u8]) -> io::Result<RawOutput> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("helper stdin unavailable"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("helper stdout unavailable"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("helper stderr unavailable"))?;

    // A helper may exit without reading its input; its output still counts.
    if let Err(err) = write_request(&mut stdin, request).await {
        if err.kind() != io::ErrorKind::BrokenPipe {
            return Err(err);
        }
        log::debug!("helper closed stdin before reading the request");
    }
    drop(stdin);

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (out_res, err_res) = tokio::join!(
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    );
    out_res?;
    err_res?;

    let status = child.wait().await?;
    Ok(RawOutput {
        stdout: out,
        stderr: err,
        status,
    })
}

async fn write_request(stdin: &mut tokio::process::ChildStdin, request: &[u8]) -> io::Result<()> {
    stdin.write_all(request).await?;
    stdin.flush().await
}

async fn terminate(child: &mut Child, tool_name: &str) {
    if let Err(err) = child.kill().await {
        log::warn!("{tool_name}: failed to kill helper: {err}");
    }
}

fn stderr_tail(stderr: &str) -> String {
    const MAX_CHARS: usize = 400;
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= MAX_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - MAX_CHARS).collect()
}
