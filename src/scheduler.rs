/// Minute trigger
/// Invokes the checkpoint evaluation at the top of every minute until cancelled

use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const TICK_INTERVAL_SECS: u64 = 60;

/// Time left until the next minute boundary
pub fn time_until_next_minute() -> Duration {
    let now = Utc::now();
    time_until_next_minute_at(now.second(), now.nanosecond())
}

/// Testable version: wait from a given second/nanosecond within the minute.
/// Always in `(0, 60s]`, so a tick never fires twice in the same minute.
pub fn time_until_next_minute_at(second: u32, nanos: u32) -> Duration {
    // Leap seconds report nanos >= 1e9; clamp them into the last second
    let second = second.min(59);
    let nanos = nanos.min(999_999_999);
    let elapsed = Duration::from_secs(u64::from(second)) + Duration::from_nanos(u64::from(nanos));
    Duration::from_secs(TICK_INTERVAL_SECS) - elapsed
}

/// Format duration for logging
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let mins = secs / 60;
    let rem = secs % 60;

    if mins > 0 {
        format!("{}m {}s", mins, rem)
    } else {
        format!("{}s", rem)
    }
}

/// Run the scheduler loop, calling `tick` with the trigger instant
pub async fn run_scheduler<F>(cancel_token: CancellationToken, mut tick: F)
where
    F: FnMut(DateTime<Utc>),
{
    info!("Scheduler started (one evaluation per minute)");

    loop {
        let wait = time_until_next_minute();
        debug!("Next tick in {}", format_duration(wait));

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("Scheduler shutting down");
                break;
            }
            _ = sleep(wait) => {}
        }

        tick(Utc::now());
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn wait_time_within_interval() {
        let second: u32 = kani::any();
        let nanos: u32 = kani::any();

        let wait = time_until_next_minute_at(second, nanos);

        kani::assert(wait > Duration::ZERO, "wait must be positive");
        kani::assert(wait <= Duration::from_secs(TICK_INTERVAL_SECS), "wait must be <= 60s");
    }
}
