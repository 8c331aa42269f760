//! Subprocess boundary.
//!
//! Everything that shells out (`git show`, `sops --decrypt`, registry
//! queries) goes through [`Runner::run`]. [`SystemRunner`] spawns real
//! processes and honours the caller's [`Ctx`] deadline; [`MemRunner`]
//! answers from canned stubs matched by command-line prefix.

use crate::context::Ctx;
use crate::error::{BlueprintError, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Stdio};
use std::thread::JoinHandle;
use std::sync::Mutex;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Command / CommandOutput
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Space-joined program and arguments, for logs and stub matching.
    pub fn cmd_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub cmd_line: String,
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a non-zero exit into [`BlueprintError::Subprocess`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(BlueprintError::Subprocess {
                command: self.cmd_line,
                code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub trait Runner {
    /// Run `cmd` to completion. A non-zero exit is not an error here; use
    /// [`CommandOutput::check`] when the caller requires success.
    fn run(&self, ctx: &Ctx, cmd: &Command) -> Result<CommandOutput>;
}

// ---------------------------------------------------------------------------
// SystemRunner
// ---------------------------------------------------------------------------

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Write `data` and close the pipe so the child sees EOF.
fn feed(mut pipe: ChildStdin, data: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    std::thread::spawn(move || {
        pipe.write_all(&data)?;
        drop(pipe);
        Ok(())
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Runner for SystemRunner {
    fn run(&self, ctx: &Ctx, cmd: &Command) -> Result<CommandOutput> {
        ctx.check()?;
        let cmd_line = cmd.cmd_line();
        tracing::debug!(command = %cmd_line, "running subprocess");

        let mut process = std::process::Command::new(&cmd.program);
        process.args(&cmd.args);
        for (key, value) in &cmd.env {
            process.env(key, value);
        }
        if let Some(dir) = &cmd.dir {
            process.current_dir(dir);
        }
        process.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());

        let mut child = process.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BlueprintError::ExecutableNotFound(cmd.program.clone()),
            _ => BlueprintError::Subprocess {
                command: cmd_line.clone(),
                code: -1,
                stderr: e.to_string(),
            },
        })?;

        // Both pipes are drained before stdin is fed, so a child that
        // writes while it reads cannot fill a pipe and stall the feeder.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let feeder = match (&cmd.stdin, child.stdin.take()) {
            (Some(data), Some(pipe)) => Some(feed(pipe, data.clone())),
            _ => None,
        };

        let status = loop {
            if ctx.is_cancelled() {
                kill(&mut child);
                tracing::debug!(command = %cmd_line, "subprocess cancelled");
                return Err(BlueprintError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill(&mut child);
                    return Err(BlueprintError::Subprocess {
                        command: cmd_line,
                        code: -1,
                        stderr: e.to_string(),
                    });
                }
            }
        };

        if let Some(feeder) = feeder {
            match feeder.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(BlueprintError::Subprocess {
                        command: cmd_line,
                        code: -1,
                        stderr: format!("failed to write stdin: {e}"),
                    });
                }
                _ => {}
            }
        }
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        Ok(CommandOutput {
            cmd_line,
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Output {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: String,
    },
    Missing,
}

/// Stub runner for tests. The first stub whose prefix matches the command
/// line wins; an unmatched command behaves like a missing executable.
#[derive(Debug, Default)]
pub struct MemRunner {
    stubs: Vec<(String, Reply)>,
    calls: Mutex<Vec<Command>>,
}

impl MemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(mut self, prefix: &str, exit_code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        self.stubs.push((
            prefix.to_string(),
            Reply::Output {
                exit_code,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn stub_failure(mut self, prefix: &str, exit_code: i32, stderr: &str) -> Self {
        self.stubs.push((
            prefix.to_string(),
            Reply::Output {
                exit_code,
                stdout: Vec::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn stub_missing(mut self, prefix: &str) -> Self {
        self.stubs.push((prefix.to_string(), Reply::Missing));
        self
    }

    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Runner for MemRunner {
    fn run(&self, ctx: &Ctx, cmd: &Command) -> Result<CommandOutput> {
        ctx.check()?;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(cmd.clone());
        }
        let cmd_line = cmd.cmd_line();
        let reply = self
            .stubs
            .iter()
            .find(|(prefix, _)| cmd_line.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Missing);
        match reply {
            Reply::Output {
                exit_code,
                stdout,
                stderr,
            } => Ok(CommandOutput {
                cmd_line,
                exit_code,
                stdout,
                stderr,
            }),
            Reply::Missing => Err(BlueprintError::ExecutableNotFound(cmd.program.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_line_joins_args() {
        let cmd = Command::new("git").args(["show", "HEAD~1:blueprint.json"]);
        assert_eq!(cmd.cmd_line(), "git show HEAD~1:blueprint.json");
    }

    #[test]
    fn mem_runner_matches_prefix_and_records() {
        let runner = MemRunner::new()
            .stub("git show", 0, "{}")
            .stub_failure("git", 128, "fatal: bad revision");
        let ctx = Ctx::new();

        let out = runner
            .run(&ctx, &Command::new("git").args(["show", "HEAD:x"]))
            .unwrap();
        assert_eq!(out.stdout_str(), "{}");

        let out = runner
            .run(&ctx, &Command::new("git").arg("describe"))
            .unwrap();
        assert_eq!(out.exit_code, 128);
        let err = out.check().unwrap_err();
        assert!(err.to_string().contains("bad revision"));

        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn mem_runner_unmatched_is_missing_executable() {
        let runner = MemRunner::new();
        let err = runner.run(&Ctx::new(), &Command::new("sops")).unwrap_err();
        assert!(matches!(err, BlueprintError::ExecutableNotFound(p) if p == "sops"));
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let ctx = Ctx::new();
        ctx.cancel();
        let runner = MemRunner::new().stub("git", 0, "");
        assert!(matches!(
            runner.run(&ctx, &Command::new("git")),
            Err(BlueprintError::Cancelled)
        ));
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_output() {
        let out = SystemRunner::new()
            .run(&Ctx::new(), &Command::new("sh").args(["-c", "printf hi; echo oops >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.stdout_str(), "hi");
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_honours_deadline() {
        let ctx = Ctx::new().with_timeout(Duration::from_millis(50));
        let err = SystemRunner::new()
            .run(&ctx, &Command::new("sleep").arg("5"))
            .unwrap_err();
        assert!(matches!(err, BlueprintError::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_streams_large_stdin() {
        let data = vec![b'a'; 4 << 20];
        let ctx = Ctx::new().with_timeout(Duration::from_secs(20));
        let out = SystemRunner::new()
            .run(&ctx, &Command::new("cat").stdin(data.clone()))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.len(), data.len());
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_deadline_interrupts_stdin_feed() {
        // `sleep` never reads its input, so the feeder blocks on a full pipe.
        let ctx = Ctx::new().with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = SystemRunner::new()
            .run(&ctx, &Command::new("sleep").arg("10").stdin(vec![b'a'; 1 << 20]))
            .unwrap_err();
        assert!(matches!(err, BlueprintError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn system_runner_missing_binary() {
        let err = SystemRunner::new()
            .run(&Ctx::new(), &Command::new("definitely-not-a-real-binary-xyz"))
            .unwrap_err();
        assert!(matches!(err, BlueprintError::ExecutableNotFound(_)));
    }
}
