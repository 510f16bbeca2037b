/// Daily cleanup timer.
/// Runs the cleanup pass once a day at a fixed UTC hour for as long as the
/// service is up.
use crate::functions::Functions;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::task::JoinHandle;

/// Time left until the next `hour:00` UTC strictly after `now`.
pub fn until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    let next = if today > now {
        today
    } else {
        today + Duration::days(1)
    };
    next - now
}

/// Spawn the scheduler loop on the current runtime.
pub fn spawn_daily_cleanup(functions: Functions, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_run(Utc::now(), hour);
            log::info!("Next cleanup in {}m", wait.num_minutes());
            // A negative duration cannot come out of until_next_run
            tokio::time::sleep(wait.to_std().unwrap_or_default()).await;

            match functions.cleanup_expired_content(Utc::now()).await {
                Ok(resp) => log::info!(
                    "Scheduled cleanup done: {} raves, {} group chats",
                    resp.deleted_raves,
                    resp.deleted_group_chats
                ),
                Err(e) => log::error!("Scheduled cleanup failed: {}", e),
            }
        }
    })
}
