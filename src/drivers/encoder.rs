//! encoder.rs
//! Quadrature decoding on top of a wrapping 16-bit hardware counter.
//!
//! The counter free-runs modulo `2^16`. A raw delta larger than half the modulus in
//! either direction is a wraparound, not real motion.

use crate::hal::{Clock, CounterSource};

pub struct Encoder<S: CounterSource, C: Clock> {
    source: S,
    clock: C,
    /// Accumulated position [ticks].
    position: i64,
    prev_count: u32,
    /// Corrected change between the last two updates [ticks].
    delta: i64,
    prev_us: u64,
    /// Time between the last two updates [µs].
    dt_us: u64,
}

impl<S: CounterSource, C: Clock> Encoder<S, C> {
    pub fn new(source: S, clock: C) -> Self {
        let prev_count = source.count();
        let prev_us = clock.now_us();
        Self {
            source,
            clock,
            position: 0,
            prev_count,
            delta: 0,
            prev_us,
            dt_us: 0,
        }
    }

    /// Sample the counter and fold the corrected delta into the position.
    pub fn update(&mut self) {
        let count = self.source.count();
        let now = self.clock.now_us();

        self.delta = unwrap_delta(self.prev_count, count, self.source.modulus());
        self.position += self.delta;
        self.prev_count = count;

        self.dt_us = now.saturating_sub(self.prev_us);
        self.prev_us = now;
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    #[inline]
    pub fn delta(&self) -> i64 {
        self.delta
    }

    #[inline]
    pub fn dt_us(&self) -> u64 {
        self.dt_us
    }

    /// Velocity over the last update [ticks/s]. Zero when no time elapsed.
    pub fn velocity(&self) -> f64 {
        if self.dt_us == 0 {
            return 0.0;
        }
        self.delta as f64 / self.dt_us as f64 * 1_000_000.0
    }

    /// Capture any in-flight motion, then make the current position zero.
    pub fn zero(&mut self) {
        self.update();
        self.position = 0;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

/// Counter delta corrected for a single wraparound of a counter with `modulus` states.
pub fn unwrap_delta(prev: u32, current: u32, modulus: u32) -> i64 {
    let modulus = i64::from(modulus);
    let half = modulus / 2;
    let mut delta = i64::from(current) - i64::from(prev);
    if delta > half {
        delta -= modulus;
    } else if delta < -half {
        delta += modulus;
    }
    delta
}
