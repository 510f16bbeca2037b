/// Push sender that records every message in memory.
/// Tokens registered with [`RecordingSender::fail_token`] or
/// [`RecordingSender::fail_token_times`] are rejected, which lets tests
/// exercise per-recipient failure handling and redelivery.
use super::{PushMessage, PushSender};
use crate::error::MessagingError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Remaining rejections for a token; `None` rejects forever.
type Failures = HashMap<String, Option<usize>>;

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<PushMessage>>,
    failing: Mutex<Failures>,
    rejected: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every future message addressed to `token`.
    pub fn fail_token(&self, token: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(token.to_string(), None);
        }
    }

    /// Reject the next `times` messages addressed to `token`, then accept.
    pub fn fail_token_times(&self, token: &str, times: usize) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(token.to_string(), Some(times));
        }
    }

    /// Tokens of rejected sends, in attempt order.
    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Consume one rejection for `token` if it is failing.
    fn take_failure(&self, token: &str) -> bool {
        let Ok(mut failing) = self.failing.lock() else {
            return false;
        };
        match failing.get_mut(token) {
            Some(None) => true,
            Some(Some(0)) => {
                failing.remove(token);
                false
            }
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
            None => false,
        }
    }

    /// Messages delivered so far, in send order.
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_tokens(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.token).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError> {
        message.validate()?;

        if self.take_failure(&message.token) {
            if let Ok(mut rejected) = self.rejected.lock() {
                rejected.push(message.token.clone());
            }
            return Err(MessagingError::Rejected {
                status: 404,
                message: format!("UNREGISTERED: {}", message.token),
            });
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MessagingError::InvalidMessage("recorder poisoned".to_string()))?;
        sent.push(message.clone());
        Ok(format!("recorded/{}", sent.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_records_and_fails() {
        let sender = RecordingSender::new();
        sender.fail_token("bad");

        let ok = PushMessage::chat("good", "t", "b", BTreeMap::new());
        let bad = PushMessage::chat("bad", "t", "b", BTreeMap::new());

        assert!(sender.send(&ok).await.is_ok());
        assert!(matches!(
            sender.send(&bad).await,
            Err(MessagingError::Rejected { status: 404, .. })
        ));
        assert_eq!(sender.sent_tokens(), vec!["good".to_string()]);
        assert_eq!(sender.rejected(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_fail_token_times_recovers() {
        let sender = RecordingSender::new();
        sender.fail_token_times("flaky", 2);
        let msg = PushMessage::chat("flaky", "t", "b", BTreeMap::new());

        assert!(sender.send(&msg).await.is_err());
        assert!(sender.send(&msg).await.is_err());
        assert!(sender.send(&msg).await.is_ok());
        assert!(sender.send(&msg).await.is_ok());
        assert_eq!(sender.rejected().len(), 2);
        assert_eq!(sender.count(), 2);
    }
}
