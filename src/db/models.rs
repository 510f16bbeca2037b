/// Data models for stored documents and callable payloads.
/// Field names are camelCase to match the documents written by the mobile
/// client; timestamps are epoch milliseconds.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u64>,
}

impl UserProfile {
    /// Push token, treating an empty string as absent.
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// `users/{target}/receivedRatings/{rater}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub rating: f64,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatMessage {
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub auto_delete_at: Option<DateTime<Utc>>,
}

// Rave documents are written by the client and carry many fields. Each
// handler decodes only the view it reads, so a stray field elsewhere in the
// document cannot stop it.

/// Fields cleanup reads from `raves/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaveSchedule {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_chat_id: Option<String>,
}

impl RaveSchedule {
    /// Explicit end date, or the start date for single-day events.
    pub fn effective_end(&self) -> Option<DateTime<Utc>> {
        self.end_date.or(self.start_date)
    }
}

/// Fields the alert matcher reads from a new rave.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaveListing {
    #[serde(default)]
    pub organizer_id: Option<String>,
    #[serde(default)]
    pub geo_point: Option<GeoPoint>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Fields the collaborator notifier compares across an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaveLineup {
    #[serde(default)]
    pub organizer_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub dj_ids: Vec<String>,
    #[serde(default)]
    pub collaborator_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaveAlert {
    pub user_id: String,
    pub center_point: GeoPoint,
    pub radius_km: f64,
    #[serde(default)]
    pub is_active: bool,
}

// Callable request/response DTOs
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingRequest {
    #[serde(default)]
    pub rater_id: Option<String>,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(default)]
    pub raw_rating: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingResponse {
    pub avg_rating: f64,
    pub rating_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub deleted_raves: usize,
    pub deleted_group_chats: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_rave_views_decode_from_client_document() {
        let doc = json!({
            "organizerId": "org",
            "geoPoint": {"latitude": 52.52, "longitude": 13.405},
            "name": "Warehouse",
            "startDate": 1_700_000_000_000i64,
            "djIds": ["dj1"],
        });

        let schedule: RaveSchedule = serde_json::from_value(doc.clone()).expect("Failed to decode schedule");
        assert_eq!(
            schedule.start_date,
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
        assert_eq!(schedule.effective_end(), schedule.start_date);

        let listing: RaveListing = serde_json::from_value(doc.clone()).expect("Failed to decode listing");
        assert_eq!(listing.organizer_id.as_deref(), Some("org"));
        assert!(listing.location.is_none());

        let lineup: RaveLineup = serde_json::from_value(doc).expect("Failed to decode lineup");
        assert_eq!(lineup.dj_ids, vec!["dj1".to_string()]);
        assert!(lineup.collaborator_ids.is_empty());
    }

    #[test]
    fn test_rave_views_ignore_fields_they_do_not_read() {
        let doc = json!({
            "startDate": "2026-10-15T22:00:00Z",
            "djIds": "dj1",
            "geoPoint": {"latitude": 0.0, "longitude": 0.0},
            "name": "B",
            "endDate": 5_000,
        });

        let listing: RaveListing = serde_json::from_value(doc.clone()).expect("Failed to decode listing");
        assert_eq!(listing.name.as_deref(), Some("B"));
        assert!(serde_json::from_value::<RaveSchedule>(doc.clone()).is_err());
        assert!(serde_json::from_value::<RaveLineup>(doc).is_err());
    }

    #[test]
    fn test_effective_end_prefers_end_date() {
        let start = Utc.timestamp_millis_opt(1_000).unwrap();
        let end = Utc.timestamp_millis_opt(9_000).unwrap();
        let schedule = RaveSchedule {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        };
        assert_eq!(schedule.effective_end(), Some(end));
    }

    #[test]
    fn test_push_token_ignores_empty() {
        let user = UserProfile {
            fcm_token: Some(String::new()),
            ..Default::default()
        };
        assert!(user.push_token().is_none());
    }

    #[test]
    fn test_submit_rating_response_serialization() {
        let resp = SubmitRatingResponse {
            avg_rating: 4.5,
            rating_count: 2,
        };
        let json = serde_json::to_value(&resp).expect("Serialization failed");
        assert_eq!(json, json!({"avgRating": 4.5, "ratingCount": 2}));
    }

    #[test]
    fn test_scheduled_cleanup_response_omits_message() {
        let resp = CleanupResponse {
            success: true,
            message: None,
            deleted_raves: 1,
            deleted_group_chats: 0,
        };
        let json = serde_json::to_value(&resp).expect("Serialization failed");
        assert_eq!(
            json,
            json!({"success": true, "deletedRaves": 1, "deletedGroupChats": 0})
        );
    }
}
