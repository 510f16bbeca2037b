/// Push notification delivery.
/// [`PushMessage`] serializes to the FCM message shape; [`PushSender`]
/// implementations deliver it (FCM over HTTP, log-only, or recording for tests).

pub mod fcm;
pub mod log_sender;
pub mod recording;

use crate::error::MessagingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use fcm::FcmClient;
pub use log_sender::LogSender;
pub use recording::RecordingSender;

pub const CHAT_CHANNEL: &str = "chat_channel";
pub const RAVE_CHANNEL: &str = "rave_alerts";
const RAVE_ICON: &str = "ic_notification";
// Forged gold
const RAVE_COLOR: &str = "#D4AF37";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AndroidNotification {
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aps {
    pub sound: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApnsConfig {
    pub payload: ApnsPayload,
}

/// A single-device push message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub notification: Notification,
    pub data: BTreeMap<String, String>,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
    pub token: String,
}

impl PushMessage {
    /// Chat-style message: `chat_channel`, default sound, no badge.
    pub fn chat(
        token: &str,
        title: impl Into<String>,
        body: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        PushMessage {
            notification: Notification {
                title: title.into(),
                body: body.into(),
            },
            data,
            android: AndroidConfig {
                priority: "high".to_string(),
                notification: AndroidNotification {
                    channel_id: CHAT_CHANNEL.to_string(),
                    icon: None,
                    color: None,
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        sound: "default".to_string(),
                        badge: None,
                    },
                },
            },
            token: token.to_string(),
        }
    }

    /// Rave-style message: `rave_alerts` channel with icon, accent color and badge.
    pub fn rave(
        token: &str,
        title: impl Into<String>,
        body: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        let mut message = PushMessage::chat(token, title, body, data);
        message.android.notification = AndroidNotification {
            channel_id: RAVE_CHANNEL.to_string(),
            icon: Some(RAVE_ICON.to_string()),
            color: Some(RAVE_COLOR.to_string()),
        };
        message.apns.payload.aps.badge = Some(1);
        message
    }

    pub(crate) fn validate(&self) -> Result<(), MessagingError> {
        if self.token.is_empty() {
            return Err(MessagingError::InvalidMessage("empty device token".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one message, returning the provider's message id.
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError>;
}

/// Build a data map from string pairs.
pub fn data_map<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
