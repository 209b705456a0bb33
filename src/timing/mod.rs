//! Clocks and elapsed-time formatting
//!
//! `PTSClock` gives capture producers a shared timebase for frame
//! timestamps. `Clock` abstracts "now" for the session controller so the
//! elapsed timer can be driven deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic clock for presentation timestamps
///
/// Video and audio producers of one capture source share a single instance,
/// so their timestamps are comparable.
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Presentation timestamp in seconds since the clock was created
    #[inline]
    pub fn pts(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Presentation timestamp for a given instant
    ///
    /// Instants before the clock start map to zero.
    #[inline]
    pub fn pts_at(&self, instant: Instant) -> f64 {
        instant
            .checked_duration_since(*self.start)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of the current time for the session controller.
pub trait Clock: Send + Sync {
    /// Monotonic now, used for elapsed-time accounting.
    fn now(&self) -> Instant;
    /// Wall-clock now, used for record timestamps and ids.
    fn wall_now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same offset, so a test can keep a handle and advance
/// time while the controller owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_us
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Total time advanced since creation
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        let elapsed =
            chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

/// Format an elapsed duration as `mm:ss` from whole seconds.
///
/// Minutes are not wrapped, so an hour-long take reads `60:00`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Label shown by the timer for a recording that started at `start`.
pub fn elapsed_label(start: Instant, now: Instant) -> String {
    format_elapsed(now.saturating_duration_since(start))
}
