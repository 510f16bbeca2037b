/// Push sender that only logs; used when no FCM credentials are configured.
use super::{PushMessage, PushSender};
use crate::error::MessagingError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct LogSender {
    counter: AtomicU64,
}

impl LogSender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushSender for LogSender {
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError> {
        message.validate()?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            "[push:{}] to={} title={:?} body={:?}",
            n,
            message.token,
            message.notification.title,
            message.notification.body
        );
        Ok(format!("local/messages/{}", n))
    }
}
