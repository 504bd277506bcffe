//! # Course Simulation
//! Runs the full control stack against a simulated robot on a manual clock.
//!
//! Controller, Tracker and both wheel loops are built over the devices in [`devices`] and
//! driven by the cooperative [`Scheduler`]. Each simulation tick advances the physics,
//! fires the bump switch as an asynchronous enable clear, and runs one scheduler pass.

pub mod course;
pub mod devices;
pub mod world;

use std::{sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    config::RobotConfig,
    control::{
        controller::{prepare_imu, Controller},
        tracker::Tracker,
        wheel_loop::{Side, WheelLoop},
    },
    drivers::{
        battery::AdcBattery,
        imu::{load_coefficients, Imu},
        sensor_array::SensorArray,
    },
    error::SetupError,
    hal::{Clock, ManualClock},
    scheduler::Scheduler,
    shares::{Section, Shares},
    utils::metrics::{EventRecorder, SharedMetrics},
};

use devices::{SimAdc, SimBatteryAdc, SimCounter, SimEmitters, SimImuBus, SimMotorPins, SimServo};
use world::{Pose, SharedWorld, World};

/// Physical parameters of the simulated robot and run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: u64,
    /// Uniform sensor noise as a fraction of the white-to-black span.
    pub noise: f64,
    pub battery_volts: f64,
    pub wheel_radius_mm: f64,
    pub track_width_mm: f64,
    pub wheel_time_constant_s: f64,
    /// Array distance ahead of the axle.
    pub sensor_offset_mm: f64,
    pub sensor_pitch_mm: f64,
    pub sensor_footprint_mm: f64,
    pub bumper_offset_mm: f64,
    /// IMU heading while facing east.
    pub yaw_offset: i32,
    pub start: Pose,
    pub tick_us: u64,
    /// Start button press.
    pub start_after_us: u64,
    pub max_duration: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            noise: 0.01,
            battery_volts: 7.4,
            wheel_radius_mm: 35.0,
            track_width_mm: 141.0,
            wheel_time_constant_s: 0.1,
            sensor_offset_mm: 60.0,
            sensor_pitch_mm: 8.0,
            sensor_footprint_mm: 4.0,
            bumper_offset_mm: 80.0,
            yaw_offset: 1_000,
            start: Pose { x: 0.0, y: 0.0, theta: 0.0 },
            tick_us: 1_000,
            start_after_us: 50_000,
            max_duration: Duration::from_secs(90),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub finished: bool,
    pub sim_time: Duration,
    /// Section values in the order they appeared.
    pub sections: Vec<Section>,
    pub bumps: u32,
    pub final_pose: Pose,
}

impl RunOutcome {
    pub fn reached(&self, section: Section) -> bool {
        self.sections.contains(&section)
    }
}

pub struct Simulation {
    world: SharedWorld,
    clock: ManualClock,
    shares: Shares,
    scheduler: Scheduler<ManualClock>,
    config: SimConfig,
}

impl Simulation {
    /// Check the battery, bring up the IMU and array, and register the four tasks.
    pub fn new(
        robot: &RobotConfig,
        config: SimConfig,
        metrics: SharedMetrics,
        recorder: Arc<EventRecorder>,
    ) -> Result<Self, SetupError> {
        let world = World::new(config.clone(), robot).shared();
        let clock = ManualClock::new();

        let battery = || {
            AdcBattery::new(
                SimBatteryAdc {
                    world: world.clone(),
                    config: robot.battery,
                },
                robot.battery,
            )
        };
        battery().startup_check()?;

        let mut imu = Imu::new(SimImuBus { world: world.clone() });
        let coefficients = match &robot.imu.coefficients_path {
            Some(path) => Some(load_coefficients(path)?),
            None => None,
        };
        prepare_imu(
            &mut imu,
            coefficients.as_ref().map(|c| c.as_slice()),
            robot.imu.operating_mode()?,
            Duration::ZERO,
        )?;

        let calibration = &robot.calibration;
        let channels = (0..calibration.channel_count())
            .map(|channel| {
                calibration
                    .is_populated(channel)
                    .then(|| SimAdc { world: world.clone(), channel })
            })
            .collect();
        let mut array = SensorArray::new(
            channels,
            SimEmitters { world: world.clone() },
            robot.line.thresholds,
        );
        array.config_all(&calibration.white, &calibration.black)?;

        let controller = Controller::new(
            imu,
            array,
            robot.line.clone(),
            robot.heading.clone(),
            clock.clone(),
            recorder.clone(),
        );
        let tracker = Tracker::new(
            SimServo { world: world.clone() },
            robot.course.clone(),
            clock.clone(),
            recorder.clone(),
        );

        let mut scheduler = Scheduler::new(clock.clone(), metrics, recorder.clone());
        let timing = &robot.scheduler;
        for side in [Side::Right, Side::Left] {
            let wheel = WheelLoop::new(
                side,
                SimMotorPins { world: world.clone(), side },
                SimCounter { world: world.clone(), side },
                battery(),
                clock.clone(),
                robot.wheel.clone(),
                recorder.clone(),
            );
            scheduler.add(side.name(), timing.wheels.priority, timing.wheels.period_ms * 1_000, Box::new(wheel));
        }
        scheduler.add(
            "Controller",
            timing.controller.priority,
            timing.controller.period_ms * 1_000,
            Box::new(controller),
        );
        scheduler.add(
            "Tracker",
            timing.tracker.priority,
            timing.tracker.period_ms * 1_000,
            Box::new(tracker),
        );

        info!("[Sim] {} tasks ready", scheduler.len());
        Ok(Self {
            world,
            clock,
            shares: Shares::new(),
            scheduler,
            config,
        })
    }

    pub fn shares(&self) -> &Shares {
        &self.shares
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// Run until the Tracker reports the finish or the time limit passes.
    pub fn run(&mut self) -> RunOutcome {
        let limit_us = self.config.max_duration.as_micros() as u64;
        let dt_s = self.config.tick_us as f64 / 1_000_000.0;
        let mut started = false;
        let mut finished = false;
        let mut bumps = 0;
        let mut bumper_was_pressed = false;
        let mut sections = vec![self.shares.section.get()];

        while self.clock.now_us() < limit_us {
            if !started && self.clock.now_us() >= self.config.start_after_us {
                info!("[Sim] start button");
                self.shares.toggle_enable();
                started = true;
            }

            let pressed = {
                let mut world = self.world.lock();
                world.advance(dt_s);
                world.bumper_pressed()
            };
            if pressed && !bumper_was_pressed {
                bumps += 1;
                info!("[Sim] bump at {} us", self.clock.now_us());
                self.shares.emergency_stop();
            }
            bumper_was_pressed = pressed;

            self.scheduler.run_pass(&self.shares);

            let section = self.shares.section.get();
            if sections.last() != Some(&section) {
                sections.push(section);
            }
            if section == Section::Finish {
                finished = true;
                break;
            }

            self.clock.advance_us(self.config.tick_us);
        }

        let final_pose = self.world.lock().pose;
        let outcome = RunOutcome {
            finished,
            sim_time: Duration::from_micros(self.clock.now_us()),
            sections,
            bumps,
            final_pose,
        };
        if finished {
            info!("[Sim] course finished in {:.2} s", outcome.sim_time.as_secs_f64());
        } else {
            warn!(
                "[Sim] stopped after {:.2} s without finishing, last section {:?}",
                outcome.sim_time.as_secs_f64(),
                outcome.sections.last()
            );
        }
        outcome
    }
}
