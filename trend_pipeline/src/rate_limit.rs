//! Sliding-window request limiting.
//!
//! [`SlidingWindowLimiter`] keeps the instants of recent admissions and never
//! lets more than `max_per_minute` of them fall inside any rolling 60-second
//! window. Callers over budget are delayed, never rejected. Waiters queue on a
//! fair async mutex, so admissions happen in arrival order.
//!
//! The calendar client and the market-data client each own one instance; they
//! share nothing.

use std::{collections::VecDeque, num::NonZeroU32, time::Duration};

use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Length of the rolling window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    label: String,
    max_per_minute: NonZeroU32,
    margin: Duration,
    stamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// `label` only shows up in logs; `margin` is added to every computed wait.
    pub fn new(label: impl Into<String>, max_per_minute: NonZeroU32, margin: Duration) -> Self {
        Self {
            label: label.into(),
            max_per_minute,
            margin,
            stamps: Mutex::new(VecDeque::with_capacity(max_per_minute.get() as usize)),
        }
    }

    /// Builds a limiter from a raw config value; zero is clamped to one.
    pub fn per_minute(label: impl Into<String>, max_per_minute: u32, margin: Duration) -> Self {
        let max = NonZeroU32::new(max_per_minute).unwrap_or(NonZeroU32::MIN);
        Self::new(label, max, margin)
    }

    pub fn max_per_minute(&self) -> u32 {
        self.max_per_minute.get()
    }

    /// Waits until another request fits in the window, then records it.
    ///
    /// The wait is `60s - (now - oldest) + margin`; the window is re-checked
    /// after sleeping before the admission is recorded.
    pub async fn admit(&self) {
        let max = self.max_per_minute.get() as usize;
        // Held across the sleep: later callers queue behind this one.
        let mut stamps = self.stamps.lock().await;
        loop {
            let now = Instant::now();
            prune(&mut stamps, now);
            if stamps.len() < max {
                stamps.push_back(now);
                return;
            }
            let Some(&oldest) = stamps.front() else {
                stamps.push_back(now);
                return;
            };
            let wait = WINDOW.saturating_sub(now.duration_since(oldest)) + self.margin;
            debug!(
                limiter = %self.label,
                retained = stamps.len(),
                wait_ms = wait.as_millis() as u64,
                "request budget exhausted, delaying admission"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Admissions currently inside the window.
    pub async fn retained(&self) -> usize {
        let mut stamps = self.stamps.lock().await;
        prune(&mut stamps, Instant::now());
        stamps.len()
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = stamps.front() {
        if now.duration_since(*oldest) >= WINDOW {
            stamps.pop_front();
        } else {
            break;
        }
    }
}
