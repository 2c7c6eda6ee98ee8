//! Output sinks for the run log
//!
//! The engine never prints directly. Every line goes through a [`Reporter`],
//! so the crate can be embedded without depending on a particular logger.

use crate::session::Session;
use log::Level;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives every line of the run log, already indented
pub trait Reporter: Send {
    fn line(&mut self, level: Level, line: &str);
}

/// Forwards lines to the `log` facade under the `converge` target
pub struct LogReporter;

impl Reporter for LogReporter {
    fn line(&mut self, level: Level, line: &str) {
        log::log!(target: "converge", level, "{line}");
    }
}

/// Keeps lines in memory; clones share the same buffer
#[derive(Clone, Default)]
pub struct CaptureReporter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CaptureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured lines
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All captured lines joined with newlines
    pub fn text(&self) -> String {
        self.lines().join("\n")
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Reporter for CaptureReporter {
    fn line(&mut self, _level: Level, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// `io::Write` adapter that logs free-form output line by line
///
/// Partial lines are buffered until a newline arrives or the writer is
/// flushed or dropped. Lines are indented to the session's current depth.
pub struct LineWriter<'a> {
    session: &'a mut Session,
    pending: Vec<u8>,
}

impl<'a> LineWriter<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            pending: Vec::new(),
        }
    }

    /// Log one complete line
    pub fn line(&mut self, line: &str) {
        self.session.info(line.trim_end_matches(['\r', '\n']));
    }

    fn emit_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.line(&text);
    }
}

impl io::Write for LineWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            self.pending.extend_from_slice(chunk);
            if chunk.ends_with(b"\n") {
                self.emit_pending();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_pending();
        Ok(())
    }
}

impl Drop for LineWriter<'_> {
    fn drop(&mut self) {
        self.emit_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_line_writer_splits_and_buffers() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());

        {
            let mut writer = session.line_writer();
            writer.write_all(b"first\nsec").unwrap();
            writer.write_all(b"ond\r\nthird").unwrap();
        }

        assert_eq!(capture.lines(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_capture_clones_share_buffer() {
        let capture = CaptureReporter::new();
        let mut other = capture.clone();
        other.line(Level::Info, "hello");
        assert_eq!(capture.text(), "hello");
        capture.clear();
        assert!(capture.lines().is_empty());
    }
}
