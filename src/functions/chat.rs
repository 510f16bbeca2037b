/// Chat notifications for direct and group messages.
/// Failures here propagate so the trigger dispatcher redelivers the event.
use super::{Delivery, DeliveryReport, Functions};
use crate::db::collections::GROUP_CHATS;
use crate::db::models::{ChatMessage, GroupChatMessage};
use crate::db::Database;
use crate::error::{FunctionError, Result};
use crate::messaging::{data_map, PushMessage};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;

pub const CHAT_SCREEN: &str = "chat_list_screen";
const NEW_MESSAGE: &str = "new message";
/// Display name for a sender with no profile name.
const UNKNOWN_SENDER: &str = "Someone";

fn decode<T: serde::de::DeserializeOwned>(data: &Value, what: &str) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| FunctionError::InvalidArgument(format!("Malformed {}: {}", what, e)))
}

impl Functions {
    /// `chats/{chatId}/messages/{messageId}` created
    pub async fn on_chat_message_created(&self, chat_id: &str, data: &Value) -> Result<DeliveryReport> {
        let message: ChatMessage = decode(data, "chat message")?;

        let sender_name = Database::get_user(self.store(), &message.sender_id)
            .await?
            .and_then(|u| u.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

        let sender_id = message.sender_id.clone();
        let outcome = self
            .deliver_to_user(&message.receiver_id, |token| {
                PushMessage::chat(
                    token,
                    sender_name,
                    NEW_MESSAGE,
                    data_map([("senderId", sender_id), ("screen", CHAT_SCREEN.to_string())]),
                )
            })
            .await?;

        if let Delivery::Sent(id) = &outcome {
            log::info!(
                "Chat {}: notified {} of message from {} ({})",
                chat_id,
                message.receiver_id,
                message.sender_id,
                id
            );
        }

        Ok(DeliveryReport::from_outcomes([(message.receiver_id, Ok(outcome))]))
    }

    /// `group_chats/{groupChatId}/messages/{messageId}` created
    pub async fn on_group_message_created(
        &self,
        group_chat_id: &str,
        data: &Value,
    ) -> Result<DeliveryReport> {
        let message: GroupChatMessage = decode(data, "group chat message")?;

        let group = Database::get_group_chat(self.store(), GROUP_CHATS, group_chat_id)
            .await?
            .ok_or_else(|| FunctionError::NotFound(format!("Group chat {} not found", group_chat_id)))?;

        let title = group.name.clone().unwrap_or_else(|| "Group chat".to_string());
        let sender_name = message
            .sender_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_SENDER);
        let body = format!("{}: {}", sender_name, NEW_MESSAGE);

        let mut seen = HashSet::new();
        let recipients: Vec<&String> = group
            .member_ids
            .iter()
            .filter(|uid| **uid != message.sender_id)
            .filter(|uid| seen.insert(uid.as_str()))
            .collect();

        let tasks = recipients.iter().map(|uid| {
            let title = title.clone();
            let body = body.clone();
            let data = data_map([
                ("senderId", message.sender_id.clone()),
                ("groupChatId", group_chat_id.to_string()),
                ("screen", CHAT_SCREEN.to_string()),
            ]);
            async move {
                let outcome = self
                    .deliver_to_user(uid, |token| PushMessage::chat(token, title, body, data))
                    .await;
                (uid.to_string(), outcome)
            }
        });

        let report = DeliveryReport::from_outcomes(join_all(tasks).await);
        log::info!(
            "Group chat {}: {} sent, {} skipped, {} failed",
            group_chat_id,
            report.sent,
            report.skipped,
            report.failures.len()
        );

        if !report.failures.is_empty() {
            report.log_failures("group chat notification");
            return Err(FunctionError::Internal(format!(
                "{} of {} group notifications failed",
                report.failures.len(),
                recipients.len()
            )));
        }

        Ok(report)
    }
}
