//! wheel_loop.rs
//! Per-wheel velocity loop: encoder feedback → PID + feed-forward → motor effort.
//!
//! INIT wakes the motor and primes the encoder, then the loop alternates ACTUATE and
//! SENSE once per scheduler invocation.

use std::{f64::consts::PI, sync::Arc};

use log::{debug, info, warn};

use crate::{
    config::WheelConfig,
    control::pid::Pid,
    drivers::{encoder::Encoder, motor::Motor},
    error::TaskError,
    hal::{BatteryMonitor, Clock, CounterSource, MotorPins},
    scheduler::Task,
    shares::{Shares, WheelShares},
    utils::metrics::{Event, EventRecorder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Right,
    Left,
}

impl Side {
    pub const fn name(self) -> &'static str {
        match self {
            Side::Right => "DriveR",
            Side::Left => "DriveL",
        }
    }

    pub fn cells(self, shares: &Shares) -> &WheelShares {
        match self {
            Side::Right => &shares.right,
            Side::Left => &shares.left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelState {
    Init,
    Actuate,
    Sense,
}

impl WheelState {
    const fn name(self) -> &'static str {
        match self {
            WheelState::Init => "Init",
            WheelState::Actuate => "Actuate",
            WheelState::Sense => "Sense",
        }
    }
}

/// Voltage needed to hold `velocity` [rad/s] in steady state.
pub fn feed_forward_volts(velocity: f64, config: &WheelConfig) -> f64 {
    let sign = if velocity < 0.0 { -1.0 } else { 1.0 };
    velocity / config.motor_gain + config.friction_offset * sign
}

/// Convert a voltage request to a saturated effort percentage for the current battery.
pub fn effort_from_volts(volts: f64, battery_volts: f64, max_effort: f64) -> f64 {
    if battery_volts <= 0.0 {
        return 0.0;
    }
    (volts / battery_volts * 100.0).clamp(-max_effort, max_effort)
}

pub struct WheelLoop<P, S, C, B>
where
    P: MotorPins,
    S: CounterSource,
    C: Clock + Clone,
    B: BatteryMonitor,
{
    side: Side,
    motor: Motor<P>,
    encoder: Encoder<S, C>,
    pid: Pid<C>,
    battery: B,
    config: WheelConfig,
    state: WheelState,
    /// Velocity error from the last SENSE [rad/s].
    error: f64,
    clock: C,
    recorder: Arc<EventRecorder>,
}

impl<P, S, C, B> WheelLoop<P, S, C, B>
where
    P: MotorPins,
    S: CounterSource,
    C: Clock + Clone,
    B: BatteryMonitor,
{
    pub fn new(
        side: Side,
        pins: P,
        counter: S,
        battery: B,
        clock: C,
        config: WheelConfig,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        Self {
            side,
            motor: Motor::new(pins),
            encoder: Encoder::new(counter, clock.clone()),
            pid: Pid::new(config.gains, clock.clone()),
            battery,
            config,
            state: WheelState::Init,
            error: 0.0,
            clock,
            recorder,
        }
    }

    pub fn state(&self) -> WheelState {
        self.state
    }

    pub fn motor(&self) -> &Motor<P> {
        &self.motor
    }

    pub fn encoder(&self) -> &Encoder<S, C> {
        &self.encoder
    }

    /// Wheel speed from the last encoder update [rad/s].
    pub fn velocity(&self) -> f64 {
        self.encoder.velocity() * 2.0 * PI / self.config.ticks_per_revolution
    }

    fn transition(&mut self, to: WheelState) {
        if self.state == WheelState::Init {
            info!("[{}] {} -> {}", self.side.name(), self.state.name(), to.name());
            self.recorder.record(Event::Transition {
                ts_us: self.clock.now_us(),
                task: self.side.name(),
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
    }

    fn actuate(&mut self, shares: &Shares) {
        let setpoint = self.side.cells(shares).velocity.get();

        // enable may have been cleared by an interrupt since the Controller last ran
        if setpoint == 0.0 || !shares.enable.get() {
            self.motor.set_effort(0.0);
            self.pid.reset();
        } else {
            let volts = self.pid.update(self.error) + feed_forward_volts(setpoint, &self.config);
            let battery = self.battery.volts();
            if battery <= 0.0 {
                warn!("[{}] battery reads {:.2} V, holding zero effort", self.side.name(), battery);
            }
            self.motor
                .set_effort(effort_from_volts(volts, battery, self.config.max_effort));
        }

        self.recorder.record(Event::WheelEffort {
            ts_us: self.clock.now_us(),
            wheel: self.side.name(),
            effort: self.motor.effort(),
            velocity: self.velocity(),
        });
    }

    fn sense(&mut self, shares: &Shares) {
        let cells = self.side.cells(shares);

        if cells.reset.get() {
            self.encoder.zero();
            cells.reset.put(false);
            debug!("[{}] odometry zeroed", self.side.name());
        } else {
            self.encoder.update();
        }

        self.error = cells.velocity.get() - self.velocity();
        // wrapping on purpose: reverse travel reads as counts below u32::MAX
        cells.position.put(self.encoder.position() as u32);
    }
}

impl<P, S, C, B> Task for WheelLoop<P, S, C, B>
where
    P: MotorPins,
    S: CounterSource,
    C: Clock + Clone,
    B: BatteryMonitor,
{
    fn step(&mut self, shares: &Shares) -> Result<(), TaskError> {
        match self.state {
            WheelState::Init => {
                self.motor.enable();
                self.encoder.update();
                self.transition(WheelState::Actuate);
            }
            WheelState::Actuate => {
                self.actuate(shares);
                self.transition(WheelState::Sense);
            }
            WheelState::Sense => {
                self.sense(shares);
                self.transition(WheelState::Actuate);
            }
        }
        Ok(())
    }
}
