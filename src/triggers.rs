/// Document event routing.
/// Writes made through the document API become [`DocumentEvent`]s; the
/// dispatcher matches them against the trigger paths and runs the matching
/// handler, redelivering failed invocations a bounded number of times.
use crate::db::{DocPath, DocumentChange};
use crate::error::{ErrorKind, Result};
use crate::functions::{DeliveryReport, Functions};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    pub kind: EventKind,
    pub path: DocPath,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl DocumentEvent {
    /// Classify a write. A no-op delete yields no event.
    pub fn from_change(path: DocPath, change: DocumentChange) -> Option<Self> {
        let kind = match (&change.before, &change.after) {
            (None, Some(_)) => EventKind::Created,
            (Some(_), Some(_)) => EventKind::Updated,
            (Some(_), None) => EventKind::Deleted,
            (None, None) => return None,
        };
        Some(DocumentEvent {
            kind,
            path,
            before: change.before,
            after: change.after,
        })
    }
}

/// Handler selected for an event, with the wildcard ids from its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ChatMessageCreated { chat_id: String },
    GroupMessageCreated { group_chat_id: String },
    RaveCreated { rave_id: String },
    RaveUpdated { rave_id: String },
}

/// Match an event against the trigger paths.
pub fn route(event: &DocumentEvent) -> Option<Trigger> {
    let segments = event.path.segments();
    match (event.kind, segments.as_slice()) {
        (EventKind::Created, ["chats", chat_id, "messages", _]) => Some(Trigger::ChatMessageCreated {
            chat_id: chat_id.to_string(),
        }),
        (EventKind::Created, ["group_chats", group_chat_id, "messages", _]) => {
            Some(Trigger::GroupMessageCreated {
                group_chat_id: group_chat_id.to_string(),
            })
        }
        (EventKind::Created, ["raves", rave_id]) => Some(Trigger::RaveCreated {
            rave_id: rave_id.to_string(),
        }),
        (EventKind::Updated, ["raves", rave_id]) => Some(Trigger::RaveUpdated {
            rave_id: rave_id.to_string(),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct TriggerDispatcher {
    functions: Functions,
    policy: RetryPolicy,
}

impl TriggerDispatcher {
    pub fn new(functions: Functions, policy: RetryPolicy) -> Self {
        TriggerDispatcher { functions, policy }
    }

    /// Run the matching handler once. `Ok(None)` when nothing matches.
    pub async fn dispatch(&self, event: &DocumentEvent) -> Result<Option<DeliveryReport>> {
        let Some(trigger) = route(event) else {
            return Ok(None);
        };
        let empty = Value::Null;
        let after = event.after.as_ref().unwrap_or(&empty);

        let report = match &trigger {
            Trigger::ChatMessageCreated { chat_id } => {
                self.functions.on_chat_message_created(chat_id, after).await?
            }
            Trigger::GroupMessageCreated { group_chat_id } => {
                self.functions.on_group_message_created(group_chat_id, after).await?
            }
            Trigger::RaveCreated { rave_id } => self.functions.on_rave_created(rave_id, after).await,
            Trigger::RaveUpdated { rave_id } => {
                let before = event.before.as_ref().unwrap_or(&empty);
                self.functions.on_rave_updated(rave_id, before, after).await
            }
        };
        Ok(Some(report))
    }

    /// Run with redelivery. Only internal failures are retried; bad input
    /// or missing documents will not heal on their own.
    pub async fn deliver(&self, event: &DocumentEvent) -> Result<Option<DeliveryReport>> {
        let mut attempt = 1;
        loop {
            match self.dispatch(event).await {
                Err(e) if e.kind() == ErrorKind::Internal && attempt < self.policy.max_attempts => {
                    log::warn!(
                        "Trigger for {} failed (attempt {}/{}): {}",
                        event.path,
                        attempt,
                        self.policy.max_attempts,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
                other => return other,
            }
        }
    }

    /// Deliver in the background.
    pub fn spawn(&self, event: DocumentEvent) {
        if route(&event).is_none() {
            return;
        }
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.deliver(&event).await {
                Ok(Some(report)) => log::debug!("Trigger for {} finished: {:?}", event.path, report),
                Ok(None) => {}
                Err(e) => log::error!(
                    "Trigger for {} failed permanently ({}): {}",
                    event.path,
                    e.kind().code(),
                    e
                ),
            }
        });
    }
}
