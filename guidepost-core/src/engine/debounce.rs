//! Shared announcement cooldown.
//!
//! One timestamp gates every class of utterance: an object announcement
//! postpones a pending traffic-light or clear-path announcement and vice
//! versa. This keeps utterances from overlapping at the cost of possibly
//! delaying a more urgent one.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct DebounceClock {
    last_spoken_at: Instant,
}

impl DebounceClock {
    /// Start the clock as if something was spoken at `started_at`, so nothing
    /// is announced during the first cooldown window.
    pub fn new(started_at: Instant) -> Self {
        Self {
            last_spoken_at: started_at,
        }
    }

    /// `true` when strictly more than `cooldown` has elapsed since the last
    /// utterance. A `now` before the last utterance counts as zero elapsed.
    pub fn may_announce(&self, now: Instant, cooldown: Duration) -> bool {
        now.saturating_duration_since(self.last_spoken_at) > cooldown
    }

    pub fn record(&mut self, now: Instant) {
        self.last_spoken_at = now;
    }

    pub fn last_spoken_at(&self) -> Instant {
        self.last_spoken_at
    }
}
