//! motor.rs
//! Effort actuator: signed effort in percent → direction line + PWM duty.

use crate::hal::MotorPins;

pub struct Motor<P: MotorPins> {
    pins: P,
    effort: f64,
    enabled: bool,
}

impl<P: MotorPins> Motor<P> {
    /// Starts asleep with zero duty.
    pub fn new(mut pins: P) -> Self {
        pins.set_duty_percent(0.0);
        pins.set_sleep(true);
        Self {
            pins,
            effort: 0.0,
            enabled: false,
        }
    }

    /// Effort in `[-100, 100]`; the sign picks the direction, the magnitude the duty.
    pub fn set_effort(&mut self, effort: f64) {
        let effort = effort.clamp(-100.0, 100.0);
        self.pins.set_direction(effort < 0.0);
        self.pins.set_duty_percent(effort.abs());
        self.effort = effort;
    }

    /// Wake the driver. Output is forced to zero first so it never wakes into a stale duty.
    pub fn enable(&mut self) {
        self.pins.set_duty_percent(0.0);
        self.effort = 0.0;
        self.pins.set_sleep(false);
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.pins.set_sleep(true);
        self.enabled = false;
    }

    #[inline]
    pub fn effort(&self) -> f64 {
        self.effort
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }
}
