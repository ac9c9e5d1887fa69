//! Tokio-based process runner.

use async_trait::async_trait;
use dockit_core::{
    BuildOptions, Error, ExecutionResult, LogLine, LogSink, LogStream, ProcessRunner, ProcessSpec,
    Result,
};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::sink::DiscardSink;

/// Runs processes on the tokio runtime, streaming output line by line.
///
/// Children are killed when the invocation is cancelled or when the
/// awaiting future is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        spec: &ProcessSpec,
        log: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let command_line = spec.display();
        info!(command = %command_line, "Running process");
        log.system(&format!("Running {}", command_line));

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr was not captured".to_string()))?;

        // Split on raw bytes so invalid UTF-8 is decoded lossily instead of
        // ending the stream while the child blocks on a full pipe.
        let mut stdout_reader = BufReader::new(stdout).split(b'\n');
        let mut stderr_reader = BufReader::new(stderr).split(b'\n');
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut last_line: Option<String> = None;

        // Stream output
        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(terminate(&mut child, &command_line, log).await);
                }
                line = stdout_reader.next_segment(), if stdout_open => {
                    match line {
                        Ok(Some(line)) => emit(spec, log, LogStream::Stdout, &decode(&line), &mut last_line),
                        Ok(None) => stdout_open = false,
                        Err(e) => {
                            warn!(error = %e, "Error reading stdout");
                            stdout_open = false;
                        }
                    }
                }
                line = stderr_reader.next_segment(), if stderr_open => {
                    match line {
                        Ok(Some(line)) => emit(spec, log, LogStream::Stderr, &decode(&line), &mut last_line),
                        Ok(None) => stderr_open = false,
                        Err(e) => {
                            warn!(error = %e, "Error reading stderr");
                            stderr_open = false;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(terminate(&mut child, &command_line, log).await);
            }
            status = child.wait() => status?,
        };

        match status.code() {
            Some(0) => {
                debug!(command = %command_line, "Process succeeded");
                Ok(ExecutionResult::success())
            }
            code => {
                let code = code.unwrap_or(1);
                let message = last_line
                    .unwrap_or_else(|| format!("{} exited with code {}", command_line, code));
                warn!(command = %command_line, code, "Process failed");
                log.system(&format!("{} exited with code {}", command_line, code));
                Ok(ExecutionResult::failure(code, message))
            }
        }
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn emit(
    spec: &ProcessSpec,
    log: &dyn LogSink,
    stream: LogStream,
    line: &str,
    last_line: &mut Option<String>,
) {
    let line = spec.mask(line);
    if !line.trim().is_empty() {
        *last_line = Some(line.trim().to_string());
    }
    log.write(LogLine::new(stream, line));
}

async fn terminate(child: &mut Child, command_line: &str, log: &dyn LogSink) -> Error {
    warn!(command = %command_line, "Cancelling process");
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill process");
    }
    log.system(&format!("Cancelled {}", command_line));
    Error::Cancelled
}

/// Check that the configured builder executable can be run.
///
/// Runs `docker help` or `<kaniko> --help` with output discarded. A missing
/// binary or a failing probe is a configuration error.
pub async fn check_builder(
    runner: &dyn ProcessRunner,
    options: &BuildOptions,
    log: &dyn LogSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let spec = ProcessSpec::new(options.builder_path())
        .args(options.builder.probe_args().iter().copied());
    log.system(&format!("Checking {} builder: {}", options.builder, spec.display()));

    let unavailable = |detail: String| {
        Error::Configuration(format!(
            "{} builder is not available at '{}': {}",
            options.builder,
            options.builder_path(),
            detail
        ))
    };

    match runner.run(&spec, &DiscardSink, cancel).await {
        Ok(result) if result.is_success() => Ok(()),
        Ok(result) => Err(unavailable(format!(
            "'{}' exited with code {}",
            spec.display(),
            result.code
        ))),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => Err(unavailable(e.to_string())),
    }
}
