/// Collection names and typed accessors over a [`DocumentStore`].
use super::models::{GroupChat, Rating, RaveSchedule, UserProfile};
use super::{DocPath, Document, DocumentStore, Filter, Query};
use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

pub const USERS: &str = "users";
pub const RECEIVED_RATINGS: &str = "receivedRatings";
pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";
pub const GROUP_CHATS: &str = "group_chats";
pub const PUBLIC_GROUP_CHATS: &str = "public_group_chats";
pub const RAVES: &str = "raves";
pub const RAVE_ALERTS: &str = "rave_alerts";

pub fn user_path(uid: &str) -> DocPath {
    DocPath::new(USERS, uid)
}

pub fn ratings_collection(target_user_id: &str) -> String {
    user_path(target_user_id).sub_collection(RECEIVED_RATINGS)
}

/// Typed document operations
pub struct Database;

impl Database {
    /// Get a user profile by id
    pub async fn get_user(store: &dyn DocumentStore, uid: &str) -> StoreResult<Option<UserProfile>> {
        match store.get(&user_path(uid)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Write (or overwrite) the rating `rater_id` gave `target_user_id`
    pub async fn upsert_rating(
        store: &dyn DocumentStore,
        target_user_id: &str,
        rater_id: &str,
        rating: f64,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let doc = Rating {
            rating,
            timestamp: Some(at),
        };
        let path = DocPath::new(ratings_collection(target_user_id), rater_id);
        store.set(&path, serde_json::to_value(doc)?).await?;
        Ok(())
    }

    /// All rating values stored under a user
    pub async fn list_ratings(store: &dyn DocumentStore, target_user_id: &str) -> StoreResult<Vec<f64>> {
        store
            .list(&ratings_collection(target_user_id))
            .await?
            .iter()
            .map(|doc| doc.decode::<Rating>().map(|r| r.rating))
            .collect()
    }

    /// Merge the aggregate rating onto the user document
    pub async fn store_rating_summary(
        store: &dyn DocumentStore,
        uid: &str,
        avg_rating: f64,
        rating_count: usize,
    ) -> StoreResult<()> {
        let mut fields = Map::new();
        fields.insert("avgRating".to_string(), json!(avg_rating));
        fields.insert("ratingCount".to_string(), json!(rating_count));
        store.update(&user_path(uid), fields).await?;
        Ok(())
    }

    /// Get a group chat from `group_chats` or `public_group_chats`
    pub async fn get_group_chat(
        store: &dyn DocumentStore,
        collection: &str,
        id: &str,
    ) -> StoreResult<Option<GroupChat>> {
        match store.get(&DocPath::new(collection, id)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Raw rave alert documents with `isActive == true`
    pub async fn active_rave_alerts(store: &dyn DocumentStore) -> StoreResult<Vec<Document>> {
        store
            .query(&Query::new(RAVE_ALERTS).filter(Filter::eq("isActive", true)))
            .await
    }

    /// Schedules of raves whose start date is strictly before `cutoff`.
    /// A rave whose schedule fields do not decode is logged and left out.
    pub async fn raves_started_before(
        store: &dyn DocumentStore,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<(DocPath, RaveSchedule)>> {
        let query = Query::new(RAVES).filter(Filter::lt("startDate", cutoff.timestamp_millis()));
        Ok(store
            .query(&query)
            .await?
            .into_iter()
            .filter_map(|doc| match doc.decode::<RaveSchedule>() {
                Ok(schedule) => Some((doc.path, schedule)),
                Err(e) => {
                    log::warn!("Skipping rave {} with malformed schedule: {}", doc.path, e);
                    None
                }
            })
            .collect())
    }

    /// Active group chats in `collection` whose auto-delete time has passed
    pub async fn expired_group_chats(
        store: &dyn DocumentStore,
        collection: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<DocPath>> {
        let query = Query::new(collection)
            .filter(Filter::lt("autoDeleteAt", now.timestamp_millis()))
            .filter(Filter::eq("isActive", true));
        Ok(store
            .query(&query)
            .await?
            .into_iter()
            .map(|doc| doc.path)
            .collect())
    }

    /// Paths of every message under a chat document
    pub async fn message_paths(store: &dyn DocumentStore, chat: &DocPath) -> StoreResult<Vec<DocPath>> {
        Ok(store
            .list(&chat.sub_collection(MESSAGES))
            .await?
            .into_iter()
            .map(|doc| doc.path)
            .collect())
    }

    /// Fields that mark a group chat inactive
    pub fn deactivation() -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("isActive".to_string(), Value::Bool(false));
        fields
    }
}
