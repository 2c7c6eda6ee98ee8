//! Errors raised by providers and the process runner

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The running platform cannot perform the operation
    #[error("{operation} not supported for {platform}")]
    Unsupported {
        operation: &'static str,
        platform: &'static str,
    },

    /// The child ran past its deadline and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The child exited unsuccessfully
    #[error("command failed: {program} ({status}){}", fmt_output(.output))]
    CommandFailed {
        program: String,
        status: ExitStatus,
        output: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("no supported package manager found (tried {tried})")]
    NoPackageManager { tried: String },

    #[error("{} exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// A download failed; `status` is set for HTTP error responses
    #[error("download {url} failed: {message}")]
    Http {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn fmt_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl Error {
    pub fn http(url: impl Into<String>, err: ureq::Error) -> Self {
        let (status, message) = match err {
            ureq::Error::StatusCode(code) => (Some(code), format!("HTTP {code}")),
            other => (None, other.to_string()),
        };
        Self::Http {
            url: url.into(),
            status,
            message,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message() {
        let err = Error::Unsupported {
            operation: "useradd",
            platform: "windows",
        };
        assert_eq!(err.to_string(), "useradd not supported for windows");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failed_includes_output() {
        use std::os::unix::process::ExitStatusExt;

        let err = Error::CommandFailed {
            program: "false".into(),
            status: ExitStatus::from_raw(256),
            output: "  nope\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "command failed: false (exit status: 1): nope"
        );

        let err = Error::CommandFailed {
            program: "false".into(),
            status: ExitStatus::from_raw(256),
            output: String::new(),
        };
        assert_eq!(err.to_string(), "command failed: false (exit status: 1)");
    }

    #[test]
    fn test_http_status_kept() {
        let err = Error::http("http://example.test/a", ureq::Error::StatusCode(404));
        assert!(matches!(err, Error::Http { status: Some(404), .. }));
        assert_eq!(err.to_string(), "download http://example.test/a failed: HTTP 404");
    }
}
