//! # Converge
//!
//! Action dispatch for idempotent resources.
//!
//! A resource describes desired state. Asking it to run one or more
//! [`Action`]s converges the machine toward that state and reports, per
//! action, whether anything changed. Changes propagate to other resources
//! through notifications, either inline or deferred to the end of the run.
//!
//! ## Core Concepts
//!
//! - **Resource**: value with a stable identity that runs actions
//! - **ActionTable**: per-call mapping from action to closure
//! - **Base**: guards, error policy and notifications shared by all resources
//! - **Session**: log sink, nesting depth, run records and the deferred queue
//! - **ExecutionPlan**: ordered resources run by [`execute`]
//!
//! ## Example
//!
//! ```ignore
//! use converge::{execute, Action, Base, ExecutionPlan, Func, Session, Timing};
//! use std::sync::Arc;
//!
//! let reload = Arc::new(Func::new("reload", |_| Ok(true)));
//! let write = Func::new("write config", |_| Ok(true))
//!     .base(Base::new().notify(reload, Action::Run, Action::Run, Timing::Delayed));
//!
//! let mut plan = ExecutionPlan::new("web");
//! plan.add(Arc::new(write), vec![Action::Run]);
//!
//! let summary = execute(&plan, &mut Session::new())?;
//! assert_eq!(summary.ran, 2);
//! ```
//!
//! ## Log sinks
//!
//! The engine never prints. Lines go to a [`Reporter`]: [`LogReporter`]
//! forwards to the `log` facade, [`CaptureReporter`] keeps them in memory.

pub mod action;
pub mod context;
pub mod error;
pub mod executor;
pub mod func;
pub mod guard;
pub mod notify;
pub mod planner;
pub mod properties;
pub mod resource;
pub mod session;
pub mod types;

// Re-export main types at crate root
pub use action::{Action, ActionFn, ActionTable, UnknownAction};
pub use context::{CaptureReporter, LineWriter, LogReporter, Reporter};
pub use error::{Error, PropertyError, Result};
pub use executor::{execute, run_actions};
pub use func::Func;
pub use guard::{Guard, Guards, Verdict};
pub use notify::{Notification, Notifications};
pub use planner::{ExecutionPlan, PlanEntry};
pub use properties::Properties;
pub use resource::{Base, Resource};
pub use session::Session;
pub use types::{ActionRunStatus, ErrorPolicy, Outcome, Record, RunSummary, Timing};
