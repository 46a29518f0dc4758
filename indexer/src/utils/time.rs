use chrono::{DateTime, Utc};
use std::time::Duration;

/// `at + duration`, clamped to the latest representable time instead of overflowing.
pub fn saturating_add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| at.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left until `min_delay` has passed since `last_call`, zero when it already has.
pub fn remaining_delay(last_call: DateTime<Utc>, now: DateTime<Utc>, min_delay: Duration) -> Duration {
    let elapsed = (now - last_call).to_std().unwrap_or(Duration::ZERO);
    min_delay.saturating_sub(elapsed)
}
