//! Physics of the simulated robot: wheel dynamics, counters, pose and sensors.

use std::{f64::consts::PI, sync::Arc};

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config::{CalibrationConfig, RobotConfig},
    control::wheel_loop::Side,
    drivers::imu::{CalibrationCoefficients, COEFFICIENT_LEN, UNITS_PER_REVOLUTION},
    sim::{
        course::{Course, Point},
        SimConfig,
    },
};

pub type SharedWorld = Arc<Mutex<World>>;

/// One wheel with a first-order velocity response.
#[derive(Debug, Clone, Default)]
pub struct Wheel {
    /// Commanded duty [%], signed.
    pub duty: f64,
    pub reverse: bool,
    pub asleep: bool,
    /// [rad/s]
    pub omega: f64,
    /// Accumulated ticks since power-up.
    pub ticks: f64,
}

impl Wheel {
    fn applied_volts(&self, battery: f64) -> f64 {
        if self.asleep {
            return 0.0;
        }
        let sign = if self.reverse { -1.0 } else { 1.0 };
        sign * self.duty / 100.0 * battery
    }

    /// Raw 16-bit counter value.
    pub fn counter(&self) -> u32 {
        (self.ticks.round() as i64).rem_euclid(1 << 16) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Counter-clockwise from east [rad].
    pub theta: f64,
}

/// Register-visible state of the simulated IMU.
#[derive(Debug, Clone)]
pub struct ImuState {
    pub mode: u8,
    pub coefficients: CalibrationCoefficients,
    /// Heading reported while facing east.
    pub yaw_offset: i32,
}

pub struct World {
    pub config: SimConfig,
    pub course: Course,
    pub pose: Pose,
    /// Body yaw rate, counter-clockwise [rad/s].
    pub yaw_rate: f64,
    pub right: Wheel,
    pub left: Wheel,
    pub emitters: bool,
    pub servo_pulse: u32,
    pub imu: ImuState,
    /// Per-channel (white, black) raw levels of the simulated array.
    levels: Vec<(i32, i32)>,
    wheel_gain: f64,
    friction_volts: f64,
    ticks_per_revolution: f64,
    center_index: f64,
    rng: StdRng,
}

impl World {
    pub fn new(config: SimConfig, robot: &RobotConfig) -> Self {
        let levels = channel_levels(&robot.calibration);
        Self {
            course: Course::standard(),
            pose: config.start,
            yaw_rate: 0.0,
            right: Wheel { asleep: true, ..Wheel::default() },
            left: Wheel { asleep: true, ..Wheel::default() },
            emitters: false,
            servo_pulse: 0,
            imu: ImuState {
                mode: 0,
                coefficients: [0; COEFFICIENT_LEN],
                yaw_offset: config.yaw_offset,
            },
            levels,
            wheel_gain: robot.wheel.motor_gain,
            friction_volts: robot.wheel.friction_offset,
            ticks_per_revolution: robot.wheel.ticks_per_revolution,
            center_index: robot.line.center_index,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn shared(self) -> SharedWorld {
        Arc::new(Mutex::new(self))
    }

    pub fn wheel(&self, side: Side) -> &Wheel {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }

    pub fn wheel_mut(&mut self, side: Side) -> &mut Wheel {
        match side {
            Side::Right => &mut self.right,
            Side::Left => &mut self.left,
        }
    }

    /// Steady-state speed for `volts`, with a static friction dead zone.
    fn target_omega(&self, volts: f64) -> f64 {
        if volts.abs() <= self.friction_volts {
            0.0
        } else {
            (volts - self.friction_volts * volts.signum()) * self.wheel_gain
        }
    }

    /// Advance the physics by `dt_s`.
    pub fn advance(&mut self, dt_s: f64) {
        let battery = self.config.battery_volts;
        let alpha = (dt_s / self.config.wheel_time_constant_s).min(1.0);
        let ticks_per_rad = self.ticks_per_revolution / (2.0 * PI);

        for side in [Side::Right, Side::Left] {
            let target = self.target_omega(self.wheel(side).applied_volts(battery));
            let wheel = self.wheel_mut(side);
            wheel.omega += (target - wheel.omega) * alpha;
            wheel.ticks += wheel.omega * dt_s * ticks_per_rad;
        }

        let r = self.config.wheel_radius_mm;
        let v = r * (self.right.omega + self.left.omega) / 2.0;
        self.yaw_rate = r * (self.right.omega - self.left.omega) / self.config.track_width_mm;

        self.pose.theta = (self.pose.theta + self.yaw_rate * dt_s).rem_euclid(2.0 * PI);
        self.pose.x += v * self.pose.theta.cos() * dt_s;
        self.pose.y += v * self.pose.theta.sin() * dt_s;

        // the wall stops the body; the wheels slip instead
        if let Some(depth) = self.course.wall_penetration(self.bumper_point()) {
            self.pose.y -= depth;
        }
    }

    fn body_point(&self, forward: f64, left: f64) -> Point {
        let (s, c) = self.pose.theta.sin_cos();
        Point::new(
            self.pose.x + forward * c - left * s,
            self.pose.y + forward * s + left * c,
        )
    }

    /// Raw ADC value of array channel `index`. Higher indices sit further right.
    pub fn read_channel(&mut self, index: usize) -> i32 {
        let (white, black) = self.levels.get(index).copied().unwrap_or((0, 0));
        let left = ((self.center_index - 1.0) - index as f64) * self.config.sensor_pitch_mm;
        let p = self.body_point(self.config.sensor_offset_mm, left);

        let dark = if self.emitters {
            self.course.darkness(p, self.config.sensor_footprint_mm)
        } else {
            0.0
        };

        let span = f64::from(black - white);
        let noise = if self.config.noise > 0.0 {
            self.rng.random_range(-self.config.noise..self.config.noise) * span
        } else {
            0.0
        };
        (f64::from(white) + dark * span + noise).round() as i32
    }

    fn bumper_point(&self) -> Point {
        self.body_point(self.config.bumper_offset_mm, 0.0)
    }

    pub fn bumper_pressed(&self) -> bool {
        self.course.wall_contact(self.bumper_point())
    }

    /// Heading in IMU units, clockwise positive.
    pub fn yaw_units(&self) -> i16 {
        let units = UNITS_PER_REVOLUTION as f64;
        let yaw = (-self.pose.theta * units / (2.0 * PI)).round() as i32 + self.imu.yaw_offset;
        yaw.rem_euclid(UNITS_PER_REVOLUTION) as i16
    }

    /// Yaw rate in IMU units (1/16 °/s), clockwise positive.
    pub fn yaw_rate_units(&self) -> i16 {
        let rate = -self.yaw_rate.to_degrees() * 16.0;
        rate.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }

    /// Move the robot without simulating the motion in between.
    pub fn place(&mut self, pose: Pose) {
        self.pose = pose;
    }
}

fn channel_levels(calibration: &CalibrationConfig) -> Vec<(i32, i32)> {
    calibration
        .white
        .iter()
        .zip(&calibration.black)
        .map(|(&w, &b)| (w, b))
        .collect()
}
