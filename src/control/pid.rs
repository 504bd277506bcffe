//! pid.rs
//! Time-aware PID loop shared by every control task.
//!
//! The scheduler is priority-preemptive, so steps arrive at irregular intervals.
//! Elapsed time is measured on every update instead of assuming a fixed `dt`.

use crate::hal::Clock;

/// PID gains.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

pub struct Pid<C: Clock> {
    gains: PidGains,
    clock: C,
    integral: f64,
    /// Error and timestamp of the last update. `None` after construction or reset, so
    /// the next update has nothing to differentiate against.
    last: Option<(f64, u64)>,
}

impl<C: Clock> Pid<C> {
    pub fn new(gains: PidGains, clock: C) -> Self {
        Self {
            gains,
            clock,
            integral: 0.0,
            last: None,
        }
    }

    /// Feed one error sample and return the control output.
    ///
    /// The first call after construction or [`Pid::reset`] only records the error and
    /// a timestamp and returns 0.
    pub fn update(&mut self, error: f64) -> f64 {
        let now = self.clock.now_us();

        let Some((last_error, last_us)) = self.last.replace((error, now)) else {
            return 0.0;
        };

        let dt = now.saturating_sub(last_us) as f64 / 1_000_000.0;

        // dt == 0 happens when two steps land in the same clock tick
        let derivative = if dt > 0.0 {
            (error - last_error) / dt
        } else {
            0.0
        };

        self.integral += error * dt;

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    /// Clear integral and derivative history. Gains are kept.
    ///
    /// No derivative kick follows: the next update only records its error.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last = None;
    }

    #[inline]
    pub fn integral(&self) -> f64 {
        self.integral
    }

    #[inline]
    pub fn gains(&self) -> PidGains {
        self.gains
    }
}
