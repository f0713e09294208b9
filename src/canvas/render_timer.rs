//! Wall-clock budget for cooperative, resumable rendering.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTimerKind {
    /// Interactive paint: give up after 0.1 s (soft) / 0.2 s (hard).
    FastRender,
    /// Background fill: 0.2 s / 0.4 s.
    SlowRender,
    NoTimeout,
}

#[cfg(all(feature = "web", target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
struct Clock(f64);

#[cfg(all(feature = "web", target_arch = "wasm32"))]
impl Clock {
    fn start() -> Self {
        Clock(js_sys::Date::now())
    }

    fn elapsed_secs(&self) -> f64 {
        (js_sys::Date::now() - self.0) / 1000.0
    }
}

#[cfg(not(all(feature = "web", target_arch = "wasm32")))]
#[derive(Debug, Clone, Copy)]
struct Clock(std::time::Instant);

#[cfg(not(all(feature = "web", target_arch = "wasm32")))]
impl Clock {
    fn start() -> Self {
        Clock(std::time::Instant::now())
    }

    fn elapsed_secs(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// Started on construction. The renderer asks `out_of_time` between
/// columns with the fraction of the job done so far.
///
/// Nothing is cut short before `min_fraction` of the work is done. Past the
/// hard limit the answer is always yes. Past the soft limit the answer is yes
/// unless the job is projected to finish inside the hard limit, in which case
/// the soft limit is waived for the rest of the job.
#[derive(Debug, Clone)]
pub struct RenderTimer {
    kind: RenderTimerKind,
    clock: Clock,
    soft_limit: f64,
    hard_limit: f64,
    min_fraction: f64,
    soft_limit_waived: bool,
}

impl RenderTimer {
    pub fn new(kind: RenderTimerKind) -> Self {
        let (soft, hard, min_fraction) = match kind {
            RenderTimerKind::FastRender => (0.1, 0.2, 0.2),
            RenderTimerKind::SlowRender => (0.2, 0.4, 0.3),
            RenderTimerKind::NoTimeout => (f64::INFINITY, f64::INFINITY, 1.0),
        };
        Self {
            kind,
            clock: Clock::start(),
            soft_limit: soft,
            hard_limit: hard,
            min_fraction,
            soft_limit_waived: false,
        }
    }

    /// Custom limits in seconds.
    pub fn with_limits(soft_limit: f64, hard_limit: f64, min_fraction: f64) -> Self {
        Self {
            soft_limit,
            hard_limit,
            min_fraction,
            ..Self::new(RenderTimerKind::FastRender)
        }
    }

    pub fn kind(&self) -> RenderTimerKind {
        self.kind
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.clock.elapsed_secs()
    }

    pub fn out_of_time(&mut self, fraction_complete: f64) -> bool {
        if self.kind == RenderTimerKind::NoTimeout || fraction_complete < self.min_fraction {
            return false;
        }
        let elapsed = self.elapsed_secs();
        if elapsed >= self.hard_limit {
            return true;
        }
        if !self.soft_limit_waived && elapsed >= self.soft_limit {
            if fraction_complete <= 0.0 || elapsed / fraction_complete > self.hard_limit {
                return true;
            }
            self.soft_limit_waived = true;
        }
        false
    }

    /// Average seconds per item for `count` items done since construction.
    pub fn seconds_per_item(&self, count: usize) -> f64 {
        if count == 0 {
            return 0.0;
        }
        self.elapsed_secs() / count as f64
    }
}
