//! Resource-count driven scan interval.

use std::time::Duration;

/// Minimum count movement before the interval is reconsidered.
pub const COUNT_HYSTERESIS: usize = 2;

/// Ideal interval for a resource count: busier trees are scanned more often.
pub fn interval_for_count(count: usize) -> Duration {
    let ms = match count {
        0..=5 => 2000,
        6..=15 => 1000,
        16..=30 => 500,
        _ => 250,
    };
    Duration::from_millis(ms)
}

/// True when `proposed` differs from `current` by more than 10%.
fn outside_band(current: Duration, proposed: Duration) -> bool {
    let current_ms = current.as_millis();
    current_ms.abs_diff(proposed.as_millis()) * 10 > current_ms
}

#[derive(Debug, Default, Clone)]
pub struct AdaptiveTuner {
    last_count: Option<usize>,
}

impl AdaptiveTuner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the reference count so the next observation is evaluated.
    pub fn reset(&mut self) {
        self.last_count = None;
    }

    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    /// New interval for `count`, or `None` if the current one should stay.
    pub fn propose(&mut self, count: usize, current: Duration) -> Option<Duration> {
        if let Some(last) = self.last_count {
            if count.abs_diff(last) <= COUNT_HYSTERESIS {
                return None;
            }
        }
        self.last_count = Some(count);
        let proposed = interval_for_count(count);
        outside_band(current, proposed).then_some(proposed)
    }
}
