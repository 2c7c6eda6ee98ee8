//! Child process execution with deadlines
//!
//! Output from both pipes is read on helper threads and handed back line by
//! line, so a chatty child never blocks on a full pipe while we wait for it.

use crate::error::Error;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Default deadline for account and package tooling
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a running child is checked for exit while output is idle
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep reading output once the child has exited
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// What to run and under which limits
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added to the inherited environment
    pub env: BTreeMap<String, String>,
    pub dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Mask arguments in [`CommandSpec::display`]
    pub sensitive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            dir: None,
            timeout: TOOL_TIMEOUT,
            sensitive: false,
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

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `program arg1 arg2`, for messages; sensitive arguments become `*`
    pub fn display(&self) -> String {
        let mut shown = self.program.clone();
        for arg in &self.args {
            shown.push(' ');
            if self.sensitive {
                shown.push_str(&"*".repeat(arg.chars().count()));
            } else {
                shown.push_str(arg);
            }
        }
        shown
    }
}

/// A child that ran to completion before its deadline
#[derive(Debug)]
pub struct Completed {
    pub status: ExitStatus,
    /// Combined stdout and stderr lines, in arrival order
    pub lines: Vec<String>,
}

impl Completed {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn output(&self) -> String {
        self.lines.join("\n")
    }
}

/// Run to completion, handing each output line to `on_line` as it arrives.
///
/// A child still running at the deadline is killed and reported as
/// [`Error::Timeout`]. The exit status is not checked; see [`run_checked`].
pub fn run(spec: &CommandSpec, mut on_line: impl FnMut(&str)) -> Result<Completed, Error> {
    log::debug!("Executing: {}", spec.display());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    } else {
        drop(tx);
    }

    let deadline = Instant::now() + spec.timeout;
    let mut lines = Vec::new();
    let mut pipes_open = true;
    let status = loop {
        let polled = child
            .try_wait()
            .map_err(|e| Error::io(format!("waiting for {}", spec.program), e))?;
        if let Some(status) = polled {
            break status;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(&mut child, spec));
        }

        if pipes_open {
            match rx.recv_timeout(remaining.min(POLL_INTERVAL)) {
                Ok(line) => {
                    on_line(&line);
                    lines.push(line);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => pipes_open = false,
            }
        } else {
            let waited = child
                .wait_timeout(remaining)
                .map_err(|e| Error::io(format!("waiting for {}", spec.program), e))?;
            match waited {
                Some(status) => break status,
                None => return Err(timed_out(&mut child, spec)),
            }
        }
    };

    // A background grandchild may hold the pipes open indefinitely; take
    // what arrives shortly after exit and stop there.
    let grace = Instant::now() + DRAIN_GRACE;
    while pipes_open {
        match rx.recv_timeout(grace.saturating_duration_since(Instant::now())) {
            Ok(line) => {
                on_line(&line);
                lines.push(line);
            }
            Err(RecvTimeoutError::Disconnected) => pipes_open = false,
            Err(RecvTimeoutError::Timeout) => {
                log::debug!("{} exited with its output still open", spec.program);
                break;
            }
        }
    }

    Ok(Completed { status, lines })
}

/// Like [`run`], but a non-zero exit becomes [`Error::CommandFailed`]
pub fn run_checked(spec: &CommandSpec, on_line: impl FnMut(&str)) -> Result<Completed, Error> {
    let completed = run(spec, on_line)?;
    if completed.success() {
        Ok(completed)
    } else {
        Err(Error::CommandFailed {
            program: spec.program.clone(),
            status: completed.status,
            output: completed.output(),
        })
    }
}

/// Run quietly and collect the output
pub fn run_capture(spec: &CommandSpec) -> Result<Completed, Error> {
    run(spec, |_| {})
}

/// Run a shell snippet; true when it exits 0
pub fn shell_succeeds(script: &str, timeout: Duration) -> Result<bool, Error> {
    let spec = CommandSpec::new("sh").arg("-c").arg(script).timeout(timeout);
    let completed = run(&spec, |line| log::trace!("{line}"))?;
    Ok(completed.success())
}

/// Check if a command exists on PATH
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

fn forward_lines(pipe: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.split(b'\n').map_while(Result::ok) {
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches('\r');
            if tx.send(text.to_string()).is_err() {
                break;
            }
        }
    });
}

fn timed_out(child: &mut Child, spec: &CommandSpec) -> Error {
    let _ = child.kill();
    let _ = child.wait();
    Error::Timeout {
        program: spec.program.clone(),
        timeout: spec.timeout,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_collects_both_pipes() {
        let completed = run_capture(&sh("echo out; echo err >&2")).unwrap();
        assert!(completed.success());
        let mut lines = completed.lines.clone();
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
    }

    #[test]
    fn test_streams_lines_in_order() {
        let mut seen = Vec::new();
        run(&sh("printf 'a\\nb\\nc'"), |line| seen.push(line.to_string())).unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_env_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sh("echo \"$GREETING\"; pwd");
        spec.env.insert("GREETING".into(), "hello".into());
        spec.dir = Some(dir.path().to_path_buf());

        let completed = run_capture(&spec).unwrap();
        assert_eq!(completed.lines[0], "hello");
        let pwd = PathBuf::from(&completed.lines[1]).canonicalize().unwrap();
        assert_eq!(pwd, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_non_zero_exit() {
        let spec = sh("echo bad; exit 3");
        assert!(!run_capture(&spec).unwrap().success());

        let err = run_checked(&spec, |_| {}).unwrap_err();
        match err {
            Error::CommandFailed { status, output, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(output, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_kills_child() {
        let spec = sh("sleep 5").timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = run_capture(&spec).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_background_child_does_not_hold_run() {
        let spec = sh("sleep 3 & echo started").timeout(Duration::from_secs(1));
        let started = Instant::now();

        let completed = run_capture(&spec).unwrap();

        assert!(completed.success());
        assert_eq!(completed.lines, vec!["started"]);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_spawn_failure() {
        let err = run_capture(&CommandSpec::new("/nonexistent/mincfg-tool")).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn test_shell_succeeds() {
        assert!(shell_succeeds("true", TOOL_TIMEOUT).unwrap());
        assert!(!shell_succeeds("exit 1", TOOL_TIMEOUT).unwrap());
    }

    #[test]
    fn test_display_and_lookup() {
        assert_eq!(sh("true").display(), "sh -c true");
        let mut secret = CommandSpec::new("mysql").args(["-p", "hunter2"]);
        secret.sensitive = true;
        assert_eq!(secret.display(), "mysql ** *******");
        assert!(command_exists("sh"));
        assert!(!command_exists("mincfg-no-such-tool"));
    }
}
