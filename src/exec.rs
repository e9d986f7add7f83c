use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::sanitize::TempSweep;
use crate::types::DownloadError;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Best available error text for reporting.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.code)
    }
}

/// Global stop flag set from the ctrl-c handler thread.
#[derive(Debug, Default)]
pub struct StopSignal {
    flag: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set. Polled, so it works from any thread's
    /// trigger without wakeup plumbing.
    pub async fn wait(&self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// The single seam to the external binaries. Everything that shells out goes
/// through this, so tests can substitute deterministic fakes.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(
        &self,
        tool: &str,
        program: &Path,
        args: &[String],
    ) -> Result<CommandOutput, DownloadError>;
}

pub struct SystemRunner {
    stop: Arc<StopSignal>,
}

impl SystemRunner {
    pub fn new(stop: Arc<StopSignal>) -> Self {
        Self { stop }
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(
        &self,
        tool: &str,
        program: &Path,
        args: &[String],
    ) -> Result<CommandOutput, DownloadError> {
        if self.stop.is_interrupted() {
            return Err(DownloadError::Interrupted);
        }
        log::debug!("running {} {:?}", program.display(), args);
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloadError::ToolNotFound {
                    tool: tool.to_string(),
                }
            } else {
                DownloadError::Io(e)
            }
        })?;
        tokio::select! {
            result = child.wait_with_output() => {
                let out = result?;
                Ok(CommandOutput {
                    code: out.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                })
            }
            // dropping the wait future kills the child (kill_on_drop)
            _ = self.stop.wait() => Err(DownloadError::Interrupted),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Terminal result of one retried invocation.
#[derive(Debug)]
pub enum ExecResult {
    Success { output: CommandOutput, attempts: u32 },
    /// All attempts used; carries the last failure.
    Exhausted { last: CommandOutput, attempts: u32 },
    /// Not retryable: missing binary or spawn-level I/O error.
    Fatal { error: DownloadError, attempts: u32 },
    Interrupted { attempts: u32 },
}

/// Runs one external invocation with bounded retry and doubling backoff.
/// Every non-zero exit is retried the same way; only a missing binary or a
/// spawn failure short-circuits.
pub struct RetryExecutor {
    policy: RetryPolicy,
    stop: Arc<StopSignal>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, stop: Arc<StopSignal>) -> Self {
        Self { policy, stop }
    }

    pub async fn run(
        &self,
        runner: &dyn ToolRunner,
        tool: &str,
        program: &Path,
        args: &[String],
        sweep: Option<&TempSweep>,
    ) -> ExecResult {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.stop.is_interrupted() {
                return ExecResult::Interrupted {
                    attempts: attempt - 1,
                };
            }
            match runner.run(tool, program, args).await {
                Ok(output) if output.success() => {
                    return ExecResult::Success {
                        output,
                        attempts: attempt,
                    }
                }
                Ok(output) => {
                    if attempt >= max {
                        return ExecResult::Exhausted {
                            last: output,
                            attempts: attempt,
                        };
                    }
                    if let Some(sweep) = sweep {
                        if let Err(e) = sweep.sweep() {
                            log::warn!("temp sweep failed: {e}");
                        }
                    }
                    let delay = self.policy.backoff * 2u32.pow(attempt - 1);
                    log::warn!(
                        "{tool} exited with code {}; retry {}/{} in {:?}",
                        output.code,
                        attempt + 1,
                        max,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.stop.wait() => return ExecResult::Interrupted { attempts: attempt },
                    }
                }
                Err(DownloadError::Interrupted) => {
                    return ExecResult::Interrupted { attempts: attempt }
                }
                Err(error) => return ExecResult::Fatal { error, attempts: attempt },
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize};

    /// Scriptable stand-in for the external tools. On success it creates the
    /// files a real invocation would leave behind, so downstream steps that
    /// look at the filesystem keep working.
    #[derive(Default)]
    pub struct FakeRunner {
        pub calls: AtomicU32,
        /// First N invocations exit non-zero.
        pub fail_first: u32,
        /// Invocations whose args contain any of these substrings exit non-zero.
        pub fail_matching: Vec<String>,
        /// Report the binary as missing instead of running.
        pub not_found: bool,
        /// Returned as stdout on successful invocations.
        pub stdout: String,
        /// Skip the filesystem side effects of a successful invocation.
        pub skip_touch: bool,
        pub delay: Duration,
        running: AtomicUsize,
        pub max_running: AtomicUsize,
        pub invocations: Mutex<Vec<Vec<String>>>,
    }

    impl FakeRunner {
        pub fn ok() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_first: u32::MAX,
                ..Self::default()
            }
        }

        pub fn flaky(failures: u32) -> Self {
            Self {
                fail_first: failures,
                ..Self::default()
            }
        }

        pub fn failing_for(needle: &str) -> Self {
            Self {
                fail_matching: vec![needle.to_string()],
                ..Self::default()
            }
        }

        pub fn missing_binary() -> Self {
            Self {
                not_found: true,
                ..Self::default()
            }
        }

        pub fn producing_nothing() -> Self {
            Self {
                skip_touch: true,
                ..Self::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with_stdout(mut self, stdout: &str) -> Self {
            self.stdout = stdout.to_string();
            self
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn touch_outputs(args: &[String]) {
            // downloader style: -o {base}.%(ext)s
            if let Some(pos) = args.iter().position(|a| a == "-o") {
                if let Some(template) = args.get(pos + 1) {
                    if let Some(base) = template.strip_suffix(".%(ext)s") {
                        let _ = std::fs::write(format!("{base}.webm"), b"media");
                        return;
                    }
                }
            }
            // converter style: -i input ... output as the final arg
            if args.iter().any(|a| a == "-i") {
                if let Some(out) = args.last() {
                    let _ = std::fs::write(out, b"converted");
                }
            }
        }
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(
            &self,
            tool: &str,
            _program: &Path,
            args: &[String],
        ) -> Result<CommandOutput, DownloadError> {
            if self.not_found {
                return Err(DownloadError::ToolNotFound {
                    tool: tool.to_string(),
                });
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.invocations.lock().push(args.to_vec());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            let fail = n <= self.fail_first
                || args
                    .iter()
                    .any(|a| self.fail_matching.iter().any(|m| a.contains(m.as_str())));
            if fail {
                return Ok(CommandOutput {
                    code: 1,
                    stdout: String::new(),
                    stderr: "simulated failure".to_string(),
                });
            }
            if !self.skip_touch {
                Self::touch_outputs(args);
            }
            Ok(CommandOutput {
                code: 0,
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }
}
