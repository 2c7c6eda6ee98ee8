//! Change propagation between resources

use crate::action::Action;
use crate::error::Result;
use crate::resource::Resource;
use crate::session::Session;
use crate::types::Timing;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One registered observer for a triggering action
#[derive(Clone)]
pub struct Notification {
    pub observer: Arc<dyn Resource>,
    pub action: Action,
    pub timing: Timing,
}

impl Notification {
    /// Deduplication key, `"<observer>:<action>"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.observer, self.action)
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("observer", &self.observer.to_string())
            .field("action", &self.action)
            .field("timing", &self.timing)
            .finish()
    }
}

/// Observers of a subject resource, grouped by triggering action
#[derive(Debug, Clone, Default)]
pub struct Notifications {
    by_trigger: BTreeMap<Action, BTreeMap<String, Notification>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` on `observer` whenever `when` changes state on the subject.
    ///
    /// Registering the same observer and action twice for one trigger keeps
    /// only the latest registration.
    pub fn register(
        &mut self,
        observer: Arc<dyn Resource>,
        action: Action,
        when: Action,
        timing: Timing,
    ) {
        let notification = Notification {
            observer,
            action,
            timing,
        };
        self.by_trigger
            .entry(when)
            .or_default()
            .insert(notification.key(), notification);
    }

    /// Observers registered for a triggering action
    pub fn for_trigger(&self, when: Action) -> impl Iterator<Item = &Notification> + '_ {
        self.by_trigger
            .get(&when)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    pub fn is_empty(&self) -> bool {
        self.by_trigger.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_trigger.values().map(BTreeMap::len).sum()
    }

    /// Fire every observer of `when`: immediate ones inline, delayed ones
    /// into the session queue.
    pub(crate) fn fire(&self, session: &mut Session, when: Action) -> Result<()> {
        for notification in self.for_trigger(when) {
            match notification.timing {
                Timing::Immediate => {
                    notification
                        .observer
                        .run(session, &[notification.action])?;
                }
                Timing::Delayed => session.defer(
                    notification.key(),
                    Arc::clone(&notification.observer),
                    notification.action,
                ),
            }
        }
        Ok(())
    }
}
