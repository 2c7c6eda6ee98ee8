//! Execution engine - dispatches actions and runs plans

use crate::action::{Action, ActionTable};
use crate::error::{Error, Result};
use crate::guard::Verdict;
use crate::planner::ExecutionPlan;
use crate::resource::{Base, Resource};
use crate::session::Session;
use crate::types::{ActionRunStatus, ErrorPolicy, Outcome, RunSummary};
use std::time::{Duration, Instant};

/// Run `actions` against one resource.
///
/// Guards are evaluated once for the whole batch. Each action is looked up
/// in `table`, timed, logged and recorded; an action that changed state
/// fires the resource's notifications before the next action starts.
/// Failures go through `base.on_error`: `Halt` returns the error, `Continue`
/// logs it and moves on.
///
/// The returned status only holds actions that completed.
pub fn run_actions(
    session: &mut Session,
    resource: &dyn Resource,
    base: &Base,
    table: &ActionTable<'_>,
    actions: &[Action],
) -> Result<ActionRunStatus> {
    let identity = resource.to_string();
    session.nested(|session| dispatch(session, &identity, base, table, actions))
}

fn dispatch(
    session: &mut Session,
    identity: &str,
    base: &Base,
    table: &ActionTable<'_>,
    actions: &[Action],
) -> Result<ActionRunStatus> {
    let mut status = ActionRunStatus::new();

    let Some(&first) = actions.first() else {
        let err = Error::NoActions {
            resource: identity.to_string(),
        };
        fail(session, identity, None, &err, Duration::ZERO);
        apply_policy(base.on_error, err)?;
        return Ok(status);
    };

    let started = Instant::now();
    match base.guards.evaluate() {
        Ok(Verdict::Proceed) => {}
        Ok(Verdict::Skip(reason)) => {
            session.record(
                identity.to_string(),
                Some(first),
                Outcome::Skipped {
                    reason: reason.to_string(),
                },
                started.elapsed(),
            );
            return Ok(status);
        }
        Err(err) => {
            let err = Error::guard(identity, &err);
            fail(session, identity, Some(first), &err, started.elapsed());
            apply_policy(base.on_error, err)?;
            return Ok(status);
        }
    }

    for &action in actions {
        let Some(func) = table.get(action) else {
            if action == Action::Nothing {
                session.record(
                    identity.to_string(),
                    Some(action),
                    Outcome::UpToDate,
                    Duration::ZERO,
                );
                status.insert(action, false);
                continue;
            }
            let err = Error::ActionNotRegistered {
                resource: identity.to_string(),
                action,
            };
            fail(session, identity, Some(action), &err, Duration::ZERO);
            apply_policy(base.on_error, err)?;
            continue;
        };

        let started = Instant::now();
        match func(session) {
            Ok(changed) => {
                let outcome = if changed {
                    Outcome::Ran
                } else {
                    Outcome::UpToDate
                };
                session.record(
                    identity.to_string(),
                    Some(action),
                    outcome,
                    started.elapsed(),
                );
                status.insert(action, changed);
                if changed {
                    base.notifications.fire(session, action)?;
                }
            }
            Err(err) => {
                let err = Error::action(identity, action, &err);
                fail(session, identity, Some(action), &err, started.elapsed());
                apply_policy(base.on_error, err)?;
            }
        }
    }

    Ok(status)
}

fn fail(
    session: &mut Session,
    identity: &str,
    action: Option<Action>,
    err: &Error,
    elapsed: Duration,
) {
    // The log line already names the resource and action
    let error = match err {
        Error::Action { message, .. } => message.clone(),
        Error::Guard { message, .. } => format!("guard failed: {message}"),
        other => other.to_string(),
    };
    session.record(
        identity.to_string(),
        action,
        Outcome::Failed { error },
        elapsed,
    );
}

fn apply_policy(policy: ErrorPolicy, err: Error) -> Result<()> {
    match policy {
        ErrorPolicy::Halt => Err(err),
        ErrorPolicy::Continue => Ok(()),
    }
}

/// Execute a plan
///
/// Runs every entry in order, then drains the deferred queue once unless
/// the plan opted out, and finally logs the top-level changes.
///
/// # Returns
/// Summary of every action attempt recorded in `session`
pub fn execute(plan: &ExecutionPlan, session: &mut Session) -> Result<RunSummary> {
    session.section(&format!("run actions for {}", plan.name));
    for entry in &plan.entries {
        entry.resource.run(session, &entry.actions)?;
    }

    if plan.run_delayed {
        session.section(&format!("run delayed tasks for {}", plan.name));
        let replayed = session.drain_deferred()?;
        log::debug!("replayed {replayed} delayed notification(s)");
    } else if !session.pending().is_empty() {
        log::warn!(
            "{} delayed notification(s) not run: {}",
            session.pending().len(),
            session.pending().join(", ")
        );
    }

    let summary = session.summary();
    session.section(&format!("summary of tasks run for {}", plan.name));
    for line in &summary.changes {
        session.info(line);
    }
    Ok(summary)
}
