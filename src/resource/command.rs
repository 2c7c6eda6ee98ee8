//! Command resource - run an external program

use anyhow::Result;
use converge::{Action, ActionRunStatus, ActionTable, Base, Resource, Session, run_actions};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::runner::{self, CommandSpec};

/// Default deadline for a command resource
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// An external program run under a deadline
///
/// Running always counts as a change. Combine with `only_if`/`not_if`
/// guards to make it idempotent.
#[derive(Debug)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    /// Extra variables on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub dir: Option<PathBuf>,
    /// Log each output line as it arrives instead of after exit
    pub stream: bool,
    /// Mask the arguments in the identity and logs
    pub sensitive: bool,
    pub timeout: Duration,
    pub base: Base,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            dir: None,
            stream: false,
            sensitive: false,
            timeout: DEFAULT_TIMEOUT,
            base: Base::default(),
        }
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
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec {
            program: self.program.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            dir: self.dir.clone(),
            timeout: self.timeout,
            sensitive: self.sensitive,
        }
    }

    fn execute(&self, session: &mut Session) -> Result<bool> {
        let spec = self.spec();
        if self.stream {
            runner::run_checked(&spec, |line| session.info(line))?;
        } else {
            let completed = runner::run_checked(&spec, |_| {})?;
            let mut out = session.line_writer();
            for line in &completed.lines {
                out.line(line);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command {}", self.spec().display())
    }
}

impl Resource for Command {
    fn resource_type(&self) -> &'static str {
        "command"
    }

    fn run(&self, session: &mut Session, actions: &[Action]) -> converge::Result<ActionRunStatus> {
        let table = ActionTable::new().register(Action::Run, |s| self.execute(s));
        run_actions(session, self, &self.base, &table, actions)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use converge::CaptureReporter;

    fn sh(script: &str) -> Command {
        Command::new("sh").args(["-c", script])
    }

    #[test]
    fn test_run_logs_output_after_exit() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());

        let status = sh("echo one; echo two")
            .run(&mut session, &[Action::Run])
            .unwrap();

        assert!(status.changed(Action::Run));
        let lines = capture.lines();
        assert_eq!(lines[..2], ["one", "two"]);
        assert!(lines[2].starts_with("command sh -c echo one; echo two: run (run)"));
    }

    #[test]
    fn test_stream_logs_nested_output() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());
        let outer = converge::Func::new("outer", move |s| {
            sh("echo streamed").stream(true).run(s, &[Action::Run])?;
            Ok(false)
        });

        outer.run(&mut session, &[Action::Run]).unwrap();

        let lines = capture.lines();
        assert_eq!(lines[0], "  streamed");
        assert!(lines[1].starts_with("  command sh -c echo streamed: run (run)"));
    }

    #[test]
    fn test_env_and_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("marker");
        let cmd = sh("echo \"$WORD\" > marker")
            .env("WORD", "hello")
            .dir(tmp.path());

        cmd.run(&mut Session::with_reporter(CaptureReporter::new()), &[Action::Run])
            .unwrap();

        assert_eq!(std::fs::read_to_string(marker).unwrap(), "hello\n");
    }

    #[test]
    fn test_failure_carries_output() {
        let err = sh("echo broken >&2; exit 2")
            .run(&mut Session::with_reporter(CaptureReporter::new()), &[Action::Run])
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("command failed: sh"));
        assert!(text.contains("broken"));
    }

    #[test]
    fn test_timeout() {
        let err = sh("sleep 5")
            .timeout(Duration::from_millis(200))
            .run(&mut Session::with_reporter(CaptureReporter::new()), &[Action::Run])
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_sensitive_identity() {
        let cmd = Command::new("mysql").args(["-p", "secret"]).sensitive(true);
        assert_eq!(cmd.to_string(), "command mysql ** ******");
        assert_eq!(
            Command::new("echo").args(["hi"]).to_string(),
            "command echo hi"
        );
    }
}
