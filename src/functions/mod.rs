/// Event and callable handlers.
/// Every handler runs against an explicitly constructed [`Functions`]
/// context holding the document store and the push sender, so tests can
/// substitute in-memory doubles for both.

pub mod chat;
pub mod cleanup;
pub mod rating;
pub mod raves;

use crate::db::{Database, DocumentStore};
use crate::error::{FunctionError, Result};
use crate::messaging::{PushMessage, PushSender};
use std::sync::Arc;

pub use cleanup::CleanupStats;

#[derive(Clone)]
pub struct Functions {
    store: Arc<dyn DocumentStore>,
    push: Arc<dyn PushSender>,
}

impl Functions {
    pub fn new(store: Arc<dyn DocumentStore>, push: Arc<dyn PushSender>) -> Self {
        Functions { store, push }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn push(&self) -> &dyn PushSender {
        self.push.as_ref()
    }

    /// Look up `uid`'s push token and send the message built for it.
    /// Users without a document or token are skipped.
    pub(crate) async fn deliver_to_user<F>(&self, uid: &str, build: F) -> Result<Delivery>
    where
        F: FnOnce(&str) -> PushMessage + Send,
    {
        let Some(user) = Database::get_user(self.store(), uid).await? else {
            log::debug!("No user document for {}, skipping push", uid);
            return Ok(Delivery::Skipped);
        };
        let Some(token) = user.push_token() else {
            log::debug!("User {} has no push token, skipping push", uid);
            return Ok(Delivery::Skipped);
        };

        let message = build(token);
        let message_id = self.push().send(&message).await?;
        Ok(Delivery::Sent(message_id))
    }
}

/// Identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub uid: String,
}

/// Request context passed to callable functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub auth: Option<AuthInfo>,
}

impl CallContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(uid: impl Into<String>) -> Self {
        CallContext {
            auth: Some(AuthInfo { uid: uid.into() }),
        }
    }
}

/// Outcome of one recipient's notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub recipient: String,
    pub error: String,
}

/// Aggregated outcome of a notification fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub skipped: usize,
    pub failures: Vec<DeliveryFailure>,
    /// Handler-level failure that stopped the fan-out early.
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (String, Result<Delivery>)>,
    {
        let mut report = DeliveryReport::default();
        for (recipient, outcome) in outcomes {
            match outcome {
                Ok(Delivery::Sent(_)) => report.sent += 1,
                Ok(Delivery::Skipped) => report.skipped += 1,
                Err(e) => report.failures.push(DeliveryFailure {
                    recipient,
                    error: e.to_string(),
                }),
            }
        }
        report
    }

    pub fn failed(error: &FunctionError) -> Self {
        DeliveryReport {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.error.is_none()
    }

    /// Report every failure to the log.
    pub fn log_failures(&self, handler: &str) {
        for failure in &self.failures {
            log::warn!(
                "{}: notification to {} failed: {}",
                handler,
                failure.recipient,
                failure.error
            );
        }
        if let Some(error) = &self.error {
            log::error!("{}: {}", handler, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_outcomes() {
        let report = DeliveryReport::from_outcomes(vec![
            ("a".to_string(), Ok(Delivery::Sent("m1".to_string()))),
            ("b".to_string(), Ok(Delivery::Skipped)),
            ("c".to_string(), Err(FunctionError::Internal("boom".to_string()))),
        ]);

        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.failures,
            vec![DeliveryFailure {
                recipient: "c".to_string(),
                error: "boom".to_string()
            }]
        );
        assert!(!report.is_clean());
    }

    #[test]
    fn test_call_context() {
        assert!(CallContext::anonymous().auth.is_none());
        assert_eq!(
            CallContext::authenticated("admin").auth,
            Some(AuthInfo { uid: "admin".to_string() })
        );
    }
}
