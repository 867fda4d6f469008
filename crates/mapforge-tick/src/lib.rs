//! Fixed-interval tick scheduler for the Mapforge session loop.
//!
//! The engine does all session work on tick boundaries: drain the
//! transport queues, dispatch packets, emit keep-alive pings, autosave.
//! The scheduler provides those boundaries; [`Cadence`] divides them into
//! the slower periodic duties.
//!
//! # Integration
//!
//! The scheduler sits inside the engine's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         tick = scheduler.wait_for_tick() => {
//!             engine.pump(tick);
//!         }
//!         _ = shutdown.cancelled() => break,
//!     }
//! }
//! ```
//!
//! When `tick_rate_hz` is 0 the scheduler is event-driven:
//! [`TickScheduler::wait_for_tick`] pends forever and only the other
//! `select!` branches run. Overruns skip ahead rather than replaying
//! missed ticks, so a stall cannot death-spiral.

use std::time::Duration;

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// Configuration for the tick scheduler.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 = event-driven (the tick never fires).
    pub tick_rate_hz: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 10 }
    }
}

impl TickConfig {
    /// Maximum supported tick rate. The session loop is coarse; anything
    /// faster than this is a configuration mistake.
    pub const MAX_TICK_RATE_HZ: u32 = 60;

    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self
    }

    /// Duration of a single tick. `None` for event-driven mode.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.tick_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz)))
        }
    }
}

/// Information about a fired tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// The fixed tick interval.
    pub dt: Duration,
    /// `true` if this tick fired significantly late.
    pub overrun: bool,
}

/// Fixed-interval tick scheduler. One per engine.
pub struct TickScheduler {
    config: TickConfig,
    tick_duration: Option<Duration>,
    tick_count: u64,
    next_tick: Option<TokioInstant>,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();
        let next_tick = tick_duration.map(|d| TokioInstant::now() + d);
        if config.tick_rate_hz == 0 {
            debug!("tick scheduler created in event-driven mode");
        } else {
            debug!(rate_hz = config.tick_rate_hz, "tick scheduler created");
        }
        Self { config, tick_duration, tick_count: 0, next_tick }
    }

    /// A scheduler at the given rate with default settings.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig { tick_rate_hz })
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Waits until the next tick is due.
    ///
    /// In event-driven mode this pends forever; `tokio::select!` still
    /// drives its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, dt) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(dt)) => (next, dt),
            _ => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        };

        time::sleep_until(next).await;
        let now = TokioInstant::now();
        self.tick_count += 1;

        // Late by more than a tenth of a tick counts as an overrun; the
        // schedule restarts from now so missed ticks are skipped, not
        // replayed.
        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > dt / 10;
        self.next_tick = Some(if overrun {
            let skipped = late_by.as_nanos() / dt.as_nanos().max(1);
            if skipped > 0 {
                warn!(
                    tick = self.tick_count,
                    skipped = skipped as u64,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun, skipping ahead"
                );
            }
            now + dt
        } else {
            next + dt
        });

        trace!(tick = self.tick_count, overrun, "tick fired");
        TickInfo { tick: self.tick_count, dt, overrun }
    }
}

/// A duty that fires every N ticks: keep-alive pings, autosaves.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    every: u64,
}

impl Cadence {
    /// Fires every `every` ticks. 0 disables the cadence entirely.
    pub fn every_ticks(every: u64) -> Self {
        Self { every }
    }

    /// Fires roughly every `period`, given the tick rate. Disabled when
    /// the scheduler is event-driven or the period is zero.
    pub fn every_period(period: Duration, tick_rate_hz: u32) -> Self {
        if tick_rate_hz == 0 || period.is_zero() {
            return Self { every: 0 };
        }
        let ticks =
            (period.as_secs_f64() * f64::from(tick_rate_hz)).round() as u64;
        Self { every: ticks.max(1) }
    }

    /// Whether the duty is due on this tick.
    pub fn due(&self, tick: u64) -> bool {
        self.every != 0 && tick % self.every == 0
    }

    pub fn is_disabled(&self) -> bool {
        self.every == 0
    }
}
