/// Expired content cleanup.
/// Deletes raves that ended more than 24 hours ago, deactivates their group
/// chats and any group chat past its auto-delete time, and purges those
/// chats' messages. Everything lands in one atomic batch.
use super::{CallContext, Functions};
use crate::db::collections::{GROUP_CHATS, PUBLIC_GROUP_CHATS};
use crate::db::models::CleanupResponse;
use crate::db::{Database, DocPath, WriteBatch};
use crate::error::{FunctionError, Result, StoreResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// How long a finished rave is kept.
pub fn retention() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub deleted_raves: usize,
    pub deleted_group_chats: usize,
}

impl Functions {
    /// Queue deactivation and message purge of one group chat. Returns false
    /// when the chat was already queued or has no document.
    async fn queue_purge(
        &self,
        batch: &mut WriteBatch,
        queued: &mut HashSet<DocPath>,
        chat: DocPath,
    ) -> StoreResult<bool> {
        if queued.contains(&chat) {
            return Ok(false);
        }
        if self.store().get(&chat).await?.is_none() {
            log::warn!("Cleanup: {} is referenced but missing, skipping", chat);
            return Ok(false);
        }

        batch.update(chat.clone(), Database::deactivation());
        for message in Database::message_paths(self.store(), &chat).await? {
            batch.delete(message);
        }
        queued.insert(chat);
        Ok(true)
    }

    /// Run one cleanup pass as of `now`.
    pub async fn run_cleanup(&self, now: DateTime<Utc>) -> StoreResult<CleanupStats> {
        let cutoff = now - retention();
        let mut batch = WriteBatch::new();
        let mut queued = HashSet::new();
        let mut stats = CleanupStats::default();

        for (path, schedule) in Database::raves_started_before(self.store(), cutoff).await? {
            let ended = schedule.effective_end().is_some_and(|end| end < cutoff);
            if !ended {
                continue;
            }

            log::debug!("Cleanup: deleting rave {}", path);
            batch.delete(path);
            stats.deleted_raves += 1;

            if let Some(group_chat_id) = schedule.group_chat_id.as_deref().filter(|id| !id.is_empty()) {
                let chat = DocPath::new(GROUP_CHATS, group_chat_id);
                if self.queue_purge(&mut batch, &mut queued, chat).await? {
                    stats.deleted_group_chats += 1;
                }
            }
        }

        for collection in [GROUP_CHATS, PUBLIC_GROUP_CHATS] {
            for chat in Database::expired_group_chats(self.store(), collection, now).await? {
                if self.queue_purge(&mut batch, &mut queued, chat).await? {
                    stats.deleted_group_chats += 1;
                }
            }
        }

        if !batch.is_empty() {
            let ops = batch.len();
            self.store().commit(batch).await?;
            log::debug!("Cleanup: committed {} writes", ops);
        }

        log::info!(
            "Cleanup: deleted {} raves, {} group chats",
            stats.deleted_raves,
            stats.deleted_group_chats
        );
        Ok(stats)
    }

    /// Scheduled entry point.
    pub async fn cleanup_expired_content(&self, now: DateTime<Utc>) -> Result<CleanupResponse> {
        let stats = self
            .run_cleanup(now)
            .await
            .map_err(|e| FunctionError::Internal(format!("Cleanup failed: {}", e)))?;

        Ok(CleanupResponse {
            success: true,
            message: None,
            deleted_raves: stats.deleted_raves,
            deleted_group_chats: stats.deleted_group_chats,
        })
    }

    /// Callable `triggerCleanup`; requires an authenticated caller.
    pub async fn trigger_cleanup(&self, ctx: &CallContext, now: DateTime<Utc>) -> Result<CleanupResponse> {
        let Some(auth) = &ctx.auth else {
            return Err(FunctionError::Unauthenticated("Authentication required".to_string()));
        };
        log::info!("Manual cleanup requested by {}", auth.uid);

        let stats = self
            .run_cleanup(now)
            .await
            .map_err(|e| FunctionError::Internal(format!("Cleanup failed: {}", e)))?;

        Ok(CleanupResponse {
            success: true,
            message: Some("Cleanup completed successfully".to_string()),
            deleted_raves: stats.deleted_raves,
            deleted_group_chats: stats.deleted_group_chats,
        })
    }
}
