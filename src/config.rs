/// Configuration management for the GigHub backend.
/// Handles command-line argument parsing and config structure.
use crate::db::{self, DocumentStore, MemoryStore, SqliteStore};
use crate::messaging::{fcm::DEFAULT_FCM_BASE_URL, FcmClient, LogSender, PushSender};
use crate::triggers::RetryPolicy;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A `uid=token` pair accepted as a callable bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub uid: String,
    pub token: String,
}

impl FromStr for AuthToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('=') {
            Some((uid, token)) if !uid.is_empty() && !token.is_empty() => Ok(AuthToken {
                uid: uid.to_string(),
                token: token.to_string(),
            }),
            _ => Err(format!("expected uid=token, got '{}'", s)),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "GigHub Server")]
#[command(about = "Notification and maintenance backend for GigHub", long_about = None)]
pub struct Config {
    /// Server port (default: 4000)
    #[arg(long, default_value = "4000")]
    pub port: u16,

    /// Address to bind (default: 127.0.0.1)
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// SQLite database file path (default: gighub.db)
    #[arg(long, default_value = "gighub.db")]
    pub database: PathBuf,

    /// Keep documents in memory only; nothing survives a restart
    #[arg(long)]
    pub in_memory: bool,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Firebase project receiving push sends
    #[arg(long, env = "FCM_PROJECT_ID")]
    pub fcm_project_id: Option<String>,

    /// OAuth access token for the FCM HTTP v1 API
    #[arg(long, env = "FCM_ACCESS_TOKEN", hide_env_values = true)]
    pub fcm_access_token: Option<String>,

    /// FCM base URL
    #[arg(long, default_value = DEFAULT_FCM_BASE_URL)]
    pub fcm_endpoint: String,

    /// Callable auth token as uid=token (repeatable)
    #[arg(
        long = "auth-token",
        env = "GIGHUB_AUTH_TOKENS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub auth_tokens: Vec<AuthToken>,

    /// UTC hour of the daily cleanup run
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u32).range(0..24))]
    pub cleanup_hour: u32,

    /// Delivery attempts per trigger event
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    pub trigger_attempts: u32,

    /// Delay between trigger redeliveries in milliseconds
    #[arg(long, default_value = "2000")]
    pub trigger_retry_delay_ms: u64,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.trigger_attempts,
            delay: Duration::from_millis(self.trigger_retry_delay_ms),
        }
    }

    /// Bearer token -> uid
    pub fn token_map(&self) -> HashMap<String, String> {
        self.auth_tokens
            .iter()
            .map(|t| (t.token.clone(), t.uid.clone()))
            .collect()
    }

    /// FCM when both project and token are configured, the logging sender otherwise.
    pub fn push_sender(&self) -> Arc<dyn PushSender> {
        match (&self.fcm_project_id, &self.fcm_access_token) {
            (Some(project), Some(token)) => {
                let client = FcmClient::new(&self.fcm_endpoint, project, token.clone());
                log::info!("Push: FCM via {}", client.endpoint());
                Arc::new(client)
            }
            _ => {
                log::warn!("Push: no FCM credentials, notifications are only logged");
                Arc::new(LogSender::new())
            }
        }
    }

    pub fn open_store(&self) -> anyhow::Result<Arc<dyn DocumentStore>> {
        if self.in_memory {
            log::warn!("Store: in-memory, documents are lost on exit");
            return Ok(Arc::new(MemoryStore::new()));
        }
        let path = self
            .database
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Database path is not valid UTF-8: {:?}", self.database))?;
        let pool = db::create_pool(path)?;
        log::info!("Store: SQLite at {}", path);
        Ok(Arc::new(SqliteStore::new(pool)))
    }
}
