/// Rating submission: validate, upsert the rater's rating, recompute the
/// target's mean over every stored rating.
use super::Functions;
use crate::db::models::{SubmitRatingRequest, SubmitRatingResponse};
use crate::db::{collections::user_path, Database};
use crate::error::{FunctionError, Result};
use chrono::Utc;
use serde_json::Value;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// Coerce a raw rating into a number. Numeric strings are accepted.
pub fn parse_rating(raw: Option<&Value>) -> Result<f64> {
    let rating = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let rating = match rating {
        Some(r) if !r.is_nan() => r,
        _ => return Err(FunctionError::InvalidArgument("Rating is not a number".to_string())),
    };

    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(FunctionError::InvalidArgument("Rating out of bounds".to_string()));
    }

    Ok(rating)
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FunctionError::InvalidArgument(format!("Missing {}", name)))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

impl Functions {
    /// Callable `submitRating`
    pub async fn submit_rating(&self, request: SubmitRatingRequest) -> Result<SubmitRatingResponse> {
        let rater_id = required(&request.rater_id, "raterId")?;
        let target_user_id = required(&request.target_user_id, "targetUserId")?;
        let rating = parse_rating(request.raw_rating.as_ref())?;

        if self.store().get(&user_path(target_user_id)).await?.is_none() {
            return Err(FunctionError::NotFound(format!(
                "User {} does not exist",
                target_user_id
            )));
        }

        Database::upsert_rating(self.store(), target_user_id, rater_id, rating, Utc::now()).await?;

        let ratings = Database::list_ratings(self.store(), target_user_id).await?;
        let avg_rating = mean(&ratings);
        let rating_count = ratings.len();

        Database::store_rating_summary(self.store(), target_user_id, avg_rating, rating_count).await?;

        log::info!(
            "Rating {} from {} for {}: avg {:.2} over {}",
            rating,
            rater_id,
            target_user_id,
            avg_rating,
            rating_count
        );

        Ok(SubmitRatingResponse {
            avg_rating,
            rating_count,
        })
    }
}
