//! Per-run state: log sink, nesting depth, records and the deferred queue

use crate::action::Action;
use crate::context::{LineWriter, LogReporter, Reporter};
use crate::error::Result;
use crate::resource::Resource;
use crate::types::{Outcome, Record, RunSummary};
use log::Level;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A delayed notification waiting for the end of the run
struct Deferred {
    observer: Arc<dyn Resource>,
    action: Action,
}

/// State shared by every resource invoked during one top-level run
///
/// Passed as `&mut Session` through the whole call chain; nested calls
/// (immediate notifications, resources that drive other resources) see the
/// same queue and records.
pub struct Session {
    reporter: Box<dyn Reporter>,
    deferred: BTreeMap<String, Deferred>,
    records: Vec<Record>,
    depth: usize,
}

impl Session {
    /// Session that logs through the `log` facade
    pub fn new() -> Self {
        Self::with_reporter(LogReporter)
    }

    pub fn with_reporter(reporter: impl Reporter + 'static) -> Self {
        Self {
            reporter: Box::new(reporter),
            deferred: BTreeMap::new(),
            records: Vec::new(),
            depth: 0,
        }
    }

    /// Current nesting depth; 0 outside any resource, 1 for top-level calls
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Two spaces per level below the top
    pub fn indent(&self) -> String {
        "  ".repeat(self.depth.saturating_sub(1))
    }

    /// Log a free-form line at the current indentation
    pub fn info(&mut self, line: &str) {
        self.emit(Level::Info, line);
    }

    pub fn error(&mut self, line: &str) {
        self.emit(Level::Error, line);
    }

    /// Log a section header, never indented
    pub fn section(&mut self, title: &str) {
        self.reporter.line(Level::Info, &format!("[{title}]"));
    }

    /// Writer that logs everything written to it as indented lines
    pub fn line_writer(&mut self) -> LineWriter<'_> {
        LineWriter::new(self)
    }

    fn emit(&mut self, level: Level, line: &str) {
        let text = format!("{}{line}", self.indent());
        self.reporter.line(level, &text);
    }

    /// Run `f` one level deeper; the depth is restored on every return path
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Log and keep one action attempt
    pub(crate) fn record(
        &mut self,
        resource: String,
        action: Option<Action>,
        outcome: Outcome,
        elapsed: Duration,
    ) {
        let record = Record {
            resource,
            action,
            outcome,
            elapsed,
            depth: self.depth.max(1),
        };
        let level = if record.outcome.is_failure() {
            Level::Error
        } else {
            Level::Info
        };
        self.emit(level, &record.line());
        self.records.push(record);
    }

    /// Queue `action` on `observer` for the end of the run.
    ///
    /// Entries are deduplicated by `key`; a later entry replaces an earlier
    /// one with the same key.
    pub(crate) fn defer(&mut self, key: String, observer: Arc<dyn Resource>, action: Action) {
        log::debug!("deferring {key}");
        self.deferred.insert(key, Deferred { observer, action });
    }

    /// Keys of the queued delayed notifications, in replay order
    pub fn pending(&self) -> Vec<String> {
        self.deferred.keys().cloned().collect()
    }

    /// Replay the deferred queue until it is empty.
    ///
    /// Entries queued while draining are replayed in the same call. Returns
    /// the number of replays.
    pub fn drain_deferred(&mut self) -> Result<usize> {
        let mut replayed = 0;
        while let Some((key, entry)) = self.deferred.pop_first() {
            log::debug!("replaying {key}");
            entry.observer.run(self, &[entry.action])?;
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Every action attempt so far, in order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_records(&self.records)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("depth", &self.depth)
            .field("pending", &self.pending())
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CaptureReporter;

    #[test]
    fn test_nested_indents_lines() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());

        session.nested(|s| {
            s.info("outer");
            s.nested(|s| s.info("inner"));
        });
        session.section("done");

        assert_eq!(capture.lines(), vec!["outer", "  inner", "[done]"]);
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn test_record_is_logged_and_kept() {
        let capture = CaptureReporter::new();
        let mut session = Session::with_reporter(capture.clone());

        session.nested(|s| {
            s.record(
                "func x".into(),
                Some(Action::Run),
                Outcome::UpToDate,
                Duration::from_millis(1),
            );
        });

        assert_eq!(capture.lines(), vec!["func x: run (up to date) 1ms"]);
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.summary().up_to_date, 1);
    }

    #[test]
    fn test_drain_empty_queue() {
        let mut session = Session::with_reporter(CaptureReporter::new());
        assert_eq!(session.drain_deferred().unwrap(), 0);
        assert!(session.pending().is_empty());
    }
}
