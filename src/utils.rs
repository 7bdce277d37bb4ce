use std::time::{Duration, Instant};

/// Logs the time spent in `l_step` since the previous checkpoint and returns the new checkpoint.
pub(crate) fn trace(l_type: &str, l_step: &str, start: Instant, previous: Duration) -> Duration {
    let elapsed = start.elapsed();
    log::debug!("{} | Total={:.2?} | {}={:.2?}", l_type, elapsed, l_step, elapsed.saturating_sub(previous));
    elapsed
}
