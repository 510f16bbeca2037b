/// FCM HTTP v1 client.
/// Posts `{"message": ...}` to `/v1/projects/{project}/messages:send` with a
/// bearer access token supplied by configuration.
use super::{PushMessage, PushSender};
use crate::error::MessagingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";

#[derive(Serialize)]
struct SendRequest<'a> {
    message: &'a PushMessage,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

pub struct FcmClient {
    endpoint: String,
    access_token: String,
    client: reqwest::Client,
}

impl FcmClient {
    pub fn new(base_url: &str, project_id: &str, access_token: String) -> Self {
        FcmClient {
            endpoint: format!(
                "{}/v1/projects/{}/messages:send",
                base_url.trim_end_matches('/'),
                project_id
            ),
            access_token,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError> {
        message.validate()?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&SendRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("FCM rejected message with status {}: {}", status, body);
            return Err(MessagingError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let sent = response.json::<SendResponse>().await?;
        log::debug!("FCM accepted message {}", sent.name);
        Ok(sent.name)
    }
}
