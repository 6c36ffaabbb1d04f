//! Per-(symbol, source) refresh bookkeeping
//!
//! [`RefreshState`] decides when a real network fetch is allowed. It holds no
//! timers itself; the feed worker owns those and feeds the state machine with
//! selection changes, ticks and fetch completions.

use crate::core::health::FetchOutcome;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Issue a real fetch now.
    Fetch,
    /// The tick lands inside the cooldown; re-render from held data only.
    CoolingDown { remaining: Duration },
    /// A fetch for this selection is still outstanding.
    InFlight,
    /// The source is suspended; report it unavailable instead of calling out.
    Suspended,
    /// Ticking is not active for this selection.
    Inactive,
}

#[derive(Debug, Clone)]
pub struct RefreshState {
    pub phase: Phase,
    pub ticking: bool,
    pub last_real_fetch_at: Option<Instant>,
    pub cooldown: Duration,
    pub consecutive_failures: u32,
    pub suspended: bool,
}

impl RefreshState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            ticking: false,
            last_real_fetch_at: None,
            cooldown,
            consecutive_failures: 0,
            suspended: false,
        }
    }

    /// Symbol or range changed. Ticking stops and a fetch is due immediately,
    /// whatever the cooldown says. Failures are counted per symbol, so a new
    /// symbol starts from zero.
    pub fn on_selection(&mut self, now: Instant, suspended: bool, new_symbol: bool) -> Decision {
        self.ticking = false;
        if new_symbol {
            self.consecutive_failures = 0;
        }
        self.suspended = suspended;
        if suspended {
            self.phase = Phase::Settled;
            return Decision::Suspended;
        }
        self.start_fetch(now)
    }

    pub fn on_tick(&mut self, now: Instant, suspended: bool) -> Decision {
        if !self.ticking {
            return Decision::Inactive;
        }
        self.suspended = suspended;
        if suspended {
            self.ticking = false;
            return Decision::Suspended;
        }
        if self.phase == Phase::Fetching {
            return Decision::InFlight;
        }

        let elapsed = self
            .last_real_fetch_at
            .map(|at| now.saturating_duration_since(at));
        match elapsed {
            Some(elapsed) if elapsed < self.cooldown => Decision::CoolingDown {
                remaining: self.cooldown - elapsed,
            },
            _ => self.start_fetch(now),
        }
    }

    /// Records the completion of the fetch issued for the current selection.
    pub fn on_fetch_finished(&mut self, outcome: FetchOutcome, intraday: bool) {
        self.phase = Phase::Settled;
        match outcome {
            FetchOutcome::Success => self.consecutive_failures = 0,
            FetchOutcome::RateLimited | FetchOutcome::Forbidden => {
                self.consecutive_failures += 1;
                self.suspended = true;
            }
            FetchOutcome::Failed => self.consecutive_failures += 1,
        }
        self.ticking = intraday && !self.suspended;
    }

    fn start_fetch(&mut self, now: Instant) -> Decision {
        self.phase = Phase::Fetching;
        self.last_real_fetch_at = Some(now);
        Decision::Fetch
    }
}
