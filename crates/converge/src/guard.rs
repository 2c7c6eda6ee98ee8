//! `only_if` / `not_if` preconditions

use anyhow::Result;
use std::fmt;

type Predicate = Box<dyn Fn() -> Result<bool> + Send + Sync>;

/// A predicate evaluated before any action of a batch runs
pub struct Guard(Predicate);

impl Guard {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<bool> + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    pub fn check(&self) -> Result<bool> {
        (self.0)()
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

/// Result of evaluating a resource's guards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// Skip the batch; carries the name of the guard that blocked it
    Skip(&'static str),
}

/// The pair of optional guards held by every resource
#[derive(Debug, Default)]
pub struct Guards {
    /// Must return true for the batch to run
    pub only_if: Option<Guard>,
    /// Must return false for the batch to run
    pub not_if: Option<Guard>,
}

impl Guards {
    /// Evaluate both guards; they must agree for the batch to proceed.
    ///
    /// `only_if` is checked first and short-circuits `not_if`.
    pub fn evaluate(&self) -> Result<Verdict> {
        if let Some(guard) = &self.only_if
            && !guard.check()?
        {
            return Ok(Verdict::Skip("only_if"));
        }
        if let Some(guard) = &self.not_if
            && guard.check()?
        {
            return Ok(Verdict::Skip("not_if"));
        }
        Ok(Verdict::Proceed)
    }

    pub fn is_empty(&self) -> bool {
        self.only_if.is_none() && self.not_if.is_none()
    }
}
