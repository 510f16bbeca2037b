/// Rave notifications: alert matching on creation, collaborator invites on update.
/// These handlers never fail the trigger; per-recipient and handler-level
/// failures are captured in the returned report and logged.
use super::{Delivery, DeliveryReport, Functions};
use crate::db::models::{GeoPoint, RaveAlert, RaveLineup, RaveListing};
use crate::db::{Database, Document};
use crate::error::{FunctionError, Result};
use crate::geo::distance_between;
use crate::messaging::{data_map, PushMessage};
use futures::future::join_all;
use serde_json::Value;

pub const RAVE_SCREEN: &str = "booker_profile";
const UNKNOWN_ORGANIZER: &str = "Unknown Organizer";
const UNKNOWN_LOCATION: &str = "Unknown Location";
const UNKNOWN_RAVE: &str = "Unknown Rave";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorRole {
    Dj,
    Collaborator,
}

impl CollaboratorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::Dj => "dj",
            CollaboratorRole::Collaborator => "collaborator",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            CollaboratorRole::Dj => "🎵 You've been added to a Rave!",
            CollaboratorRole::Collaborator => "🤝 You've been added to a Rave!",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CollaboratorRole::Dj => "DJ",
            CollaboratorRole::Collaborator => "collaborator",
        }
    }
}

/// Ids present in `after` but not in `before`, in `after` order.
pub fn newly_added<'a>(before: &[String], after: &'a [String]) -> Vec<&'a str> {
    after
        .iter()
        .filter(|id| !before.contains(id))
        .map(String::as_str)
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// The fields an alert match needs from a new rave.
struct RaveSummary<'a> {
    geo_point: GeoPoint,
    name: &'a str,
    organizer_id: &'a str,
    location: &'a str,
}

impl<'a> RaveSummary<'a> {
    fn from_listing(listing: &'a RaveListing) -> Option<Self> {
        Some(RaveSummary {
            geo_point: listing.geo_point?,
            name: non_empty(&listing.name)?,
            organizer_id: non_empty(&listing.organizer_id)?,
            location: non_empty(&listing.location).unwrap_or(UNKNOWN_LOCATION),
        })
    }
}

impl Functions {
    async fn organizer_name(&self, organizer_id: Option<&str>) -> Result<String> {
        let Some(organizer_id) = organizer_id else {
            return Ok(UNKNOWN_ORGANIZER.to_string());
        };
        Ok(Database::get_user(self.store(), organizer_id)
            .await?
            .and_then(|u| u.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_ORGANIZER.to_string()))
    }

    /// `raves/{raveId}` created
    pub async fn on_rave_created(&self, rave_id: &str, data: &Value) -> DeliveryReport {
        let report = match self.notify_rave_alerts(rave_id, data).await {
            Ok(report) => report,
            Err(e) => DeliveryReport::failed(&e),
        };
        report.log_failures("rave alert notification");
        report
    }

    async fn notify_rave_alerts(&self, rave_id: &str, data: &Value) -> Result<DeliveryReport> {
        let listing: RaveListing = match serde_json::from_value(data.clone()) {
            Ok(listing) => listing,
            Err(e) => {
                log::debug!("Rave {} has malformed listing fields, skipping alerts: {}", rave_id, e);
                return Ok(DeliveryReport::default());
            }
        };
        let Some(summary) = RaveSummary::from_listing(&listing) else {
            log::debug!("Rave {} lacks location, name or organizer, skipping alerts", rave_id);
            return Ok(DeliveryReport::default());
        };

        let alerts = Database::active_rave_alerts(self.store()).await?;
        if alerts.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let organizer_name = self.organizer_name(Some(summary.organizer_id)).await?;

        let tasks = alerts.iter().map(|doc| {
            let summary = &summary;
            let organizer_name = organizer_name.as_str();
            async move {
                let outcome = self.match_alert(rave_id, summary, organizer_name, doc).await;
                (doc.id().to_string(), outcome)
            }
        });

        let report = DeliveryReport::from_outcomes(join_all(tasks).await);
        log::info!(
            "Rave {}: {} alert notifications sent, {} skipped, {} failed",
            rave_id,
            report.sent,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }

    async fn match_alert(
        &self,
        rave_id: &str,
        summary: &RaveSummary<'_>,
        organizer_name: &str,
        doc: &Document,
    ) -> Result<Delivery> {
        let alert: RaveAlert = doc.decode()?;
        if alert.user_id == summary.organizer_id {
            return Ok(Delivery::Skipped);
        }

        let distance = distance_between(&summary.geo_point, &alert.center_point);
        if distance.is_nan() || distance > alert.radius_km {
            return Ok(Delivery::Skipped);
        }

        let body = format!(
            "{} by {} in {} ({}km away)",
            summary.name,
            organizer_name,
            summary.location,
            distance.round() as i64
        );
        let data = data_map([
            ("raveId", rave_id.to_string()),
            ("organizerId", summary.organizer_id.to_string()),
            ("screen", RAVE_SCREEN.to_string()),
            ("type", "rave_alert".to_string()),
            ("distance", distance.to_string()),
        ]);
        self.deliver_to_user(&alert.user_id, |token| {
            PushMessage::rave(token, "🎵 Rave Alert!", body, data)
        })
        .await
    }

    /// `raves/{raveId}` updated
    pub async fn on_rave_updated(&self, rave_id: &str, before: &Value, after: &Value) -> DeliveryReport {
        let report = match self.notify_rave_collaborators(rave_id, before, after).await {
            Ok(report) => report,
            Err(e) => DeliveryReport::failed(&e),
        };
        report.log_failures("rave collaborator notification");
        report
    }

    async fn notify_rave_collaborators(
        &self,
        rave_id: &str,
        before: &Value,
        after: &Value,
    ) -> Result<DeliveryReport> {
        let decode = |value: &Value| {
            serde_json::from_value::<RaveLineup>(value.clone())
                .map_err(|e| FunctionError::InvalidArgument(format!("Malformed rave {}: {}", rave_id, e)))
        };
        let before = decode(before)?;
        let after = decode(after)?;

        let new_djs = newly_added(&before.dj_ids, &after.dj_ids);
        let new_collaborators = newly_added(&before.collaborator_ids, &after.collaborator_ids);
        if new_djs.is_empty() && new_collaborators.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let rave_name = non_empty(&after.name).unwrap_or(UNKNOWN_RAVE);
        let location = non_empty(&after.location).unwrap_or(UNKNOWN_LOCATION);
        let organizer_id = non_empty(&after.organizer_id);

        let organizer_name = match self.organizer_name(organizer_id).await {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Rave {}: organizer lookup failed, using default name: {}", rave_id, e);
                UNKNOWN_ORGANIZER.to_string()
            }
        };

        let members = new_djs
            .into_iter()
            .map(|uid| (uid, CollaboratorRole::Dj))
            .chain(
                new_collaborators
                    .into_iter()
                    .map(|uid| (uid, CollaboratorRole::Collaborator)),
            );

        let tasks = members.map(|(uid, role)| {
            let body = format!(
                "{} added you as {} for \"{}\" in {}",
                organizer_name,
                role.label(),
                rave_name,
                location
            );
            let data = data_map([
                ("raveId", rave_id.to_string()),
                ("organizerId", organizer_id.unwrap_or_default().to_string()),
                ("screen", RAVE_SCREEN.to_string()),
                ("type", "rave_collaboration".to_string()),
                ("role", role.as_str().to_string()),
            ]);
            async move {
                let outcome = self
                    .deliver_to_user(uid, |token| PushMessage::rave(token, role.title(), body, data))
                    .await;
                (uid.to_string(), outcome)
            }
        });

        let report = DeliveryReport::from_outcomes(join_all(tasks).await);
        log::info!(
            "Rave {}: {} collaborator notifications sent, {} skipped, {} failed",
            rave_id,
            report.sent,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collections::{user_path, RAVE_ALERTS};
    use crate::db::{DocPath, DocumentStore, MemoryStore};
    use crate::geo::calculate_distance;
    use crate::messaging::RecordingSender;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (Functions, Arc<MemoryStore>, Arc<RecordingSender>) {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let functions = Functions::new(store.clone(), sender.clone());
        (functions, store, sender)
    }

    async fn seed_user(store: &MemoryStore, uid: &str, token: Option<&str>) {
        let mut data = json!({"name": uid.to_uppercase()});
        if let Some(token) = token {
            data["fcmToken"] = json!(token);
        }
        store.set(&user_path(uid), data).await.expect("Failed to seed user");
    }

    async fn seed_alert(store: &MemoryStore, id: &str, uid: &str, lat: f64, lng: f64, radius: f64, active: bool) {
        store
            .set(
                &DocPath::new(RAVE_ALERTS, id),
                json!({
                    "userId": uid,
                    "centerPoint": {"latitude": lat, "longitude": lng},
                    "radiusKm": radius,
                    "isActive": active,
                }),
            )
            .await
            .expect("Failed to seed alert");
    }

    fn rave_at(lat: f64, lng: f64) -> Value {
        json!({
            "organizerId": "org",
            "geoPoint": {"latitude": lat, "longitude": lng},
            "name": "Bunker",
            "location": "Berlin",
        })
    }

    #[test]
    fn test_newly_added() {
        let before = vec!["a".to_string(), "b".to_string()];
        let after = vec!["b".to_string(), "c".to_string(), "d".to_string()];
        assert_eq!(newly_added(&before, &after), vec!["c", "d"]);
        assert!(newly_added(&after, &after[..1]).is_empty());
    }

    #[tokio::test]
    async fn test_alert_within_radius_is_notified() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "org", Some("t-org")).await;
        seed_user(&store, "near", Some("t-near")).await;
        seed_user(&store, "far", Some("t-far")).await;
        // One degree of longitude at the equator is ~111.19 km
        seed_alert(&store, "a-near", "near", 0.0, 1.0, 120.0, true).await;
        seed_alert(&store, "a-far", "far", 0.0, 1.0, 100.0, true).await;

        let report = functions.on_rave_created("r1", &rave_at(0.0, 0.0)).await;

        assert!(report.is_clean());
        assert_eq!(report.sent, 1);
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "t-near");
        assert_eq!(sent[0].notification.title, "🎵 Rave Alert!");
        assert_eq!(sent[0].notification.body, "Bunker by ORG in Berlin (111km away)");
        assert_eq!(sent[0].data["type"], "rave_alert");
        assert_eq!(sent[0].data["raveId"], "r1");
        assert_eq!(sent[0].data["screen"], "booker_profile");
        assert_eq!(
            sent[0].data["distance"],
            calculate_distance(0.0, 0.0, 0.0, 1.0).to_string()
        );
        assert_eq!(sent[0].apns.payload.aps.badge, Some(1));
    }

    #[tokio::test]
    async fn test_alert_matches_at_exact_radius() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "edge", Some("t-edge")).await;
        let radius = calculate_distance(10.0, 10.0, 10.5, 10.5);
        seed_alert(&store, "a1", "edge", 10.5, 10.5, radius, true).await;

        functions.on_rave_created("r1", &rave_at(10.0, 10.0)).await;
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test]
    async fn test_organizer_and_inactive_alerts_are_skipped() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "org", Some("t-org")).await;
        seed_user(&store, "sleepy", Some("t-sleepy")).await;
        seed_alert(&store, "a-org", "org", 0.0, 0.0, 50.0, true).await;
        seed_alert(&store, "a-sleepy", "sleepy", 0.0, 0.0, 50.0, false).await;

        let report = functions.on_rave_created("r1", &rave_at(0.0, 0.0)).await;

        assert_eq!(sender.count(), 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_rave_missing_fields_exits_silently() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "near", Some("t-near")).await;
        seed_alert(&store, "a1", "near", 0.0, 0.0, 50.0, true).await;

        let report = functions
            .on_rave_created("r1", &json!({"organizerId": "org", "name": "No place"}))
            .await;

        assert_eq!(report, DeliveryReport::default());
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_malformed_fields_do_not_suppress_alerts() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "org", Some("t-org")).await;
        seed_user(&store, "near", Some("t-near")).await;
        seed_alert(&store, "a1", "near", 0.0, 0.05, 10.0, true).await;

        let report = functions
            .on_rave_created(
                "r1",
                &json!({
                    "organizerId": "org",
                    "geoPoint": {"latitude": 0.0, "longitude": 0.0},
                    "name": "B",
                    "startDate": "2026-10-15T22:00:00Z",
                    "djIds": "dj1",
                }),
            )
            .await;

        assert!(report.is_clean());
        assert_eq!(report.sent, 1);
        let sent = sender.sent();
        assert_eq!(sent[0].token, "t-near");
        assert_eq!(sent[0].notification.body, "B by ORG in Unknown Location (6km away)");
    }

    #[tokio::test]
    async fn test_failing_alert_does_not_abort_batch() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "ok", Some("t-ok")).await;
        seed_user(&store, "stale", Some("t-stale")).await;
        sender.fail_token("t-stale");
        seed_alert(&store, "a-ok", "ok", 0.0, 0.0, 10.0, true).await;
        seed_alert(&store, "a-stale", "stale", 0.0, 0.0, 10.0, true).await;
        // Malformed alert document
        store
            .set(&DocPath::new(RAVE_ALERTS, "a-broken"), json!({"isActive": true}))
            .await
            .expect("Failed to seed");

        let report = functions.on_rave_created("r1", &rave_at(0.0, 0.0)).await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failures.len(), 2);
        let mut failed: Vec<&str> = report.failures.iter().map(|f| f.recipient.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["a-broken", "a-stale"]);
        assert_eq!(sender.sent_tokens(), vec!["t-ok".to_string()]);
    }

    #[tokio::test]
    async fn test_collaborators_notified_by_role() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "org", None).await;
        seed_user(&store, "dj1", Some("t-dj1")).await;
        seed_user(&store, "dj2", Some("t-dj2")).await;
        seed_user(&store, "col", Some("t-col")).await;

        let before = json!({"organizerId": "org", "name": "Bunker", "location": "Berlin", "djIds": ["dj1"]});
        let after = json!({
            "organizerId": "org",
            "name": "Bunker",
            "location": "Berlin",
            "djIds": ["dj1", "dj2"],
            "collaboratorIds": ["col"],
        });

        let report = functions.on_rave_updated("r1", &before, &after).await;
        assert_eq!(report.sent, 2);

        let sent = sender.sent();
        let dj = sent.iter().find(|m| m.token == "t-dj2").expect("DJ not notified");
        assert_eq!(dj.notification.title, "🎵 You've been added to a Rave!");
        assert_eq!(dj.notification.body, "ORG added you as DJ for \"Bunker\" in Berlin");
        assert_eq!(dj.data["role"], "dj");
        assert_eq!(dj.data["type"], "rave_collaboration");

        let col = sent.iter().find(|m| m.token == "t-col").expect("Collaborator not notified");
        assert_eq!(col.notification.title, "🤝 You've been added to a Rave!");
        assert_eq!(col.notification.body, "ORG added you as collaborator for \"Bunker\" in Berlin");
        assert_eq!(col.data["role"], "collaborator");
    }

    #[tokio::test]
    async fn test_no_additions_is_noop() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "dj1", Some("t-dj1")).await;
        let before = json!({"djIds": ["dj1"], "collaboratorIds": ["c"]});
        let after = json!({"djIds": ["dj1"], "collaboratorIds": []});

        let report = functions.on_rave_updated("r1", &before, &after).await;
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn test_collaborator_defaults_and_isolation() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "dj1", Some("bad")).await;
        seed_user(&store, "dj2", Some("t-dj2")).await;
        sender.fail_token("bad");

        let report = functions
            .on_rave_updated("r1", &json!({}), &json!({"djIds": ["dj1", "dj2", "ghost"]}))
            .await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient, "dj1");

        let sent = sender.sent();
        assert_eq!(
            sent[0].notification.body,
            "Unknown Organizer added you as DJ for \"Unknown Rave\" in Unknown Location"
        );
    }

    #[tokio::test]
    async fn test_update_ignores_malformed_schedule() {
        let (functions, store, sender) = setup().await;
        seed_user(&store, "dj1", Some("t-dj1")).await;

        let before = json!({"name": "Bunker", "startDate": "soon"});
        let after = json!({"name": "Bunker", "startDate": "soon", "djIds": ["dj1"]});
        let report = functions.on_rave_updated("r1", &before, &after).await;

        assert!(report.is_clean());
        assert_eq!(sender.sent_tokens(), vec!["t-dj1".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_update_is_reported_not_raised() {
        let (functions, _, sender) = setup().await;
        let report = functions
            .on_rave_updated("r1", &json!({"djIds": "not-a-list"}), &json!({}))
            .await;
        assert!(report.error.is_some());
        assert_eq!(sender.count(), 0);
    }
}
