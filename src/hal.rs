//! hal.rs
//! Hardware seams.
//!
//! The control core never touches a peripheral directly. Each driver is generic over one of
//! these traits; the simulation and the tests plug in their own implementations.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use crate::error::BusError;

/// Monotonic microsecond time source.
pub trait Clock {
    fn now_us(&self) -> u64;
}

/// Wall clock backed by `Instant`, zeroed at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Shared, manually advanced clock. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_us(&self, us: u64) {
        self.us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn set_us(&self, us: u64) {
        self.us.store(us, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.us.load(Ordering::Relaxed)
    }
}

/// Free-running hardware counter in quadrature mode.
pub trait CounterSource {
    /// Current raw count in `0..modulus()`.
    fn count(&self) -> u32;

    /// Number of distinct counter values (auto-reload + 1).
    fn modulus(&self) -> u32 {
        1 << 16
    }
}

/// Direction, PWM and sleep lines of an H-bridge.
pub trait MotorPins {
    /// `true` drives the motor in reverse.
    fn set_direction(&mut self, reverse: bool);
    fn set_duty_percent(&mut self, duty: f64);
    /// `true` puts the driver to sleep.
    fn set_sleep(&mut self, asleep: bool);
}

/// Register-addressed I2C controller.
pub trait I2cBus {
    fn mem_write(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), BusError>;
    fn mem_read(&mut self, device: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError>;
}

/// One analog input.
pub trait AdcChannel {
    fn read_raw(&mut self) -> i32;
}

/// IR emitters of the reflectance array.
pub trait EmitterPins {
    fn set_emitters(&mut self, on: bool);
}

/// Hobby-servo PWM output, pulse width in timer counts.
pub trait ServoPwm {
    fn set_pulse_width(&mut self, width: u32);
}

/// Current battery voltage for feed-forward effort scaling.
pub trait BatteryMonitor {
    fn volts(&mut self) -> f64;
}
