//! Trace-level phase timing and wall-clock budget warnings for ticks.

use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Brackets one evolution phase with `trace!` records. The clock is only
/// read when trace logging is on.
pub struct ScopedTimer {
    phase: &'static str,
    start: Option<Instant>,
}

impl ScopedTimer {
    pub fn new(phase: &'static str) -> Self {
        let start = log_enabled!(Level::Trace).then(|| {
            log::trace!("[{phase}] begin");
            Instant::now()
        });
        Self { phase, start }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            log::trace!("[{}] end after {} µs", self.phase, start.elapsed().as_micros());
        }
    }
}

/// Warns when advancing `dt` seconds of simulation took longer than `dt` of
/// wall-clock time. Returns whether the budget was exceeded.
pub fn warn_if_tick_budget_exceeded(elapsed: Duration, dt: f32, num_steps: u32) -> bool {
    let budget = Duration::from_secs_f32(dt.max(0.0));
    if elapsed <= budget {
        return false;
    }
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    warn!(
        "advancing {:.2} ms took {:.2} ms ({} substeps, {:.2} ms each)",
        dt * 1000.0,
        elapsed_ms,
        num_steps,
        elapsed_ms / f64::from(num_steps.max(1))
    );
    true
}
