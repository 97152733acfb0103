//! Local-midnight reset scheduler.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::HabitLoopController;

/// Shortest sleep between resets.
const MIN_WAIT: Duration = Duration::from_secs(1);

/// Time from `now` until the next midnight in `offset`.
pub fn until_next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> Duration {
    let local = now.with_timezone(&offset);
    local
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .and_then(|midnight| (midnight.with_timezone(&Utc) - now).to_std().ok())
        .unwrap_or(MIN_WAIT)
        .max(MIN_WAIT)
}

/// Time until the first midnight among the controller's timezones.
fn until_next_boundary(controller: &HabitLoopController) -> Duration {
    let now = controller.clock().now();
    controller
        .known_offsets()
        .into_iter()
        .map(|offset| until_next_midnight(now, offset))
        .min()
        .unwrap_or(MIN_WAIT)
}

/// Runs [`HabitLoopController::daily_reset_all`] at each local midnight of
/// every user's timezone.
pub struct DayBoundaryScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DayBoundaryScheduler {
    pub fn spawn(controller: Arc<HabitLoopController>) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Day boundary scheduler started");
            loop {
                let wait = until_next_boundary(&controller);
                debug!(wait_secs = wait.as_secs(), "Sleeping until local midnight");
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(wait) => controller.daily_reset_all().await,
                }
            }
            info!("Day boundary scheduler stopped");
        });

        Self { shutdown, handle }
    }

    /// Cancel the scheduler and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
