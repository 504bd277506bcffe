//! controller.rs
//! Top-level controller: line-centroid or heading error → PID → wheel velocity setpoints.
//!
//! ```text
//! INIT ──enable──► LINE (ACTUATE ⇄ SENSE) ──thick line on HeadingSearch──► HEADING (ACTUATE ⇄ SENSE)
//!   ▲                  │ disabled                                              │ Finish, or disabled after the wall turn
//!   └──────────────────┴───────────────────────────────────────────────────────┘
//! ```
//!
//! All mutable FSM memory lives in [`ControlContext`]; each state function takes the
//! context, the owned devices and the shared cells explicitly.

use std::{sync::Arc, time::Duration};

use log::{debug, info};

use crate::{
    config::{HeadingConfig, LineConfig},
    control::pid::Pid,
    drivers::{
        imu::{Imu, OperatingMode},
        sensor_array::{SensorArray, Thickness},
    },
    error::{ImuError, TaskError},
    hal::{AdcChannel, Clock, EmitterPins, I2cBus},
    scheduler::Task,
    shares::{Section, Shares},
    utils::metrics::{Event, EventRecorder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Init,
    Actuate,
    Sense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Steer on the reflectance array centroid.
    Line,
    /// Hold or turn to an IMU heading.
    Heading,
}

impl Phase {
    const fn name(self) -> &'static str {
        match self {
            Phase::Line => "Line",
            Phase::Heading => "Heading",
        }
    }
}

/// Controller FSM memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlContext {
    pub state: ControlState,
    pub phase: Phase,
    /// Last usable centroid; the center index when no line is seen.
    pub centroid: f64,
    /// Thickness that marks the next landmark, `None` while nothing is searched for.
    pub search: Option<Thickness>,
    /// Drive on the fixed bias instead of the line error.
    pub ignore_line: bool,
    /// Always in `[0, period)`.
    pub target_heading: i32,
    pub heading: i32,
    /// +1 forward, -1 after the wall bump.
    pub direction: f64,
    pub turn_one: bool,
    pub turn_two: bool,
    pub wall_turn_one: bool,
    pub wall_turn_two: bool,
    /// Set once the heading PID was reset inside the deadband for the current target.
    pub heading_pid_reset: bool,
}

impl ControlContext {
    pub fn new(line: &LineConfig) -> Self {
        Self {
            state: ControlState::Init,
            phase: Phase::Line,
            centroid: line.center_index,
            search: Some(Thickness::Thick),
            ignore_line: false,
            target_heading: 0,
            heading: 0,
            direction: 1.0,
            turn_one: false,
            turn_two: false,
            wall_turn_one: false,
            wall_turn_two: false,
            heading_pid_reset: false,
        }
    }

    fn clear_turn_flags(&mut self) {
        self.turn_one = false;
        self.turn_two = false;
        self.wall_turn_one = false;
        self.wall_turn_two = false;
        self.heading_pid_reset = false;
    }
}

/// Devices and inner loops owned by the controller.
pub struct ControllerIo<B, A, E, C>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    pub imu: Imu<B>,
    pub array: SensorArray<A, E>,
    pub pid_line: Pid<C>,
    pub pid_heading: Pid<C>,
}

/// Put `heading` back into `[0, period)`.
#[inline]
pub fn wrap_heading(heading: i32, period: i32) -> i32 {
    heading.rem_euclid(period)
}

/// Shortest signed distance from `current` to `target` on a circle of `period` units.
///
/// Candidates are `target - current`, then that plus and minus one period. The first
/// candidate with the smallest magnitude wins.
pub fn circular_error(target: i32, current: i32, period: i32) -> i32 {
    let direct = target - current;
    [direct, direct + period, direct - period]
        .into_iter()
        .fold(direct, |best, e| if e.abs() < best.abs() { e } else { best })
}

/// Sequence the IMU from power-up to `mode`: config mode, coefficient write, target mode.
pub fn prepare_imu<B: I2cBus>(
    imu: &mut Imu<B>,
    coefficients: Option<&[u8]>,
    mode: OperatingMode,
    settle: Duration,
) -> Result<(), ImuError> {
    imu.change_mode(OperatingMode::Config)?;
    spin_sleep::sleep(settle);
    if let Some(coefficients) = coefficients {
        imu.write_coefficients(coefficients)?;
    }
    imu.change_mode(mode)?;
    spin_sleep::sleep(settle);
    Ok(())
}

/// Wait for enable, then arm both phases from the current heading.
pub fn init_step<B, A, E, C>(
    ctx: &mut ControlContext,
    io: &mut ControllerIo<B, A, E, C>,
    line: &LineConfig,
    heading: &HeadingConfig,
    shares: &Shares,
) -> Result<(), TaskError>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    if !shares.enable.get() {
        return Ok(());
    }

    let yaw = i32::from(io.imu.read_euler()?.yaw);

    io.pid_line.reset();
    io.pid_heading.reset();
    io.array.enable();

    ctx.search = Some(Thickness::Thick);
    ctx.target_heading = wrap_heading(yaw + heading.half_turn(), heading.period);
    ctx.heading = ctx.target_heading;
    ctx.centroid = line.center_index;
    ctx.ignore_line = false;
    ctx.clear_turn_flags();
    ctx.direction = 1.0;
    ctx.phase = Phase::Line;
    ctx.state = ControlState::Actuate;
    Ok(())
}

/// Returns the published `(right, left)` setpoints, or `None` when the step stopped the robot.
pub fn line_actuate<B, A, E, C>(
    ctx: &mut ControlContext,
    io: &mut ControllerIo<B, A, E, C>,
    line: &LineConfig,
    shares: &Shares,
) -> Option<(f64, f64)>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    if !shares.enable.get() {
        shares.set_wheel_velocities(0.0, 0.0);
        io.array.disable();
        ctx.state = ControlState::Init;
        return None;
    }

    match shares.section.get() {
        Section::LineResume => {
            ctx.ignore_line = false;
            ctx.search = None;
        }
        Section::HeadingSearch => ctx.search = Some(Thickness::Thick),
        _ => {}
    }

    let (right, left) = if ctx.ignore_line {
        (line.feed_forward - line.ignore_bias, line.feed_forward + line.ignore_bias)
    } else {
        let control = io.pid_line.update(line.center_index - ctx.centroid);
        let max = line.max_velocity;
        (
            (line.feed_forward + control).clamp(-max, max),
            (line.feed_forward - control).clamp(-max, max),
        )
    };

    shares.set_wheel_velocities(right, left);
    ctx.state = ControlState::Sense;
    Some((right, left))
}

/// Sample the array and react to a landmark of the searched thickness.
pub fn line_sense<B, A, E, C>(
    ctx: &mut ControlContext,
    io: &mut ControllerIo<B, A, E, C>,
    line: &LineConfig,
    shares: &Shares,
) where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    let reading = io.array.read_line();

    if ctx.search == Some(reading.thickness()) {
        match shares.section.get() {
            Section::Start => {
                ctx.ignore_line = true;
                io.pid_line.reset();
                shares.section.put(Section::DiamondAck);
            }
            Section::HeadingSearch => {
                ctx.phase = Phase::Heading;
                shares.section.put(Section::HeadingAck);
            }
            Section::Finish => shares.enable.put(false),
            _ => {}
        }
    }

    // no line: hold the setpoint so the next actuation does not steer
    ctx.centroid = reading.centroid().unwrap_or(line.center_index);
    ctx.state = ControlState::Actuate;
}

/// Returns the published `(right, left)` setpoints and the heading error, or `None` once stopped.
pub fn heading_actuate<B, A, E, C>(
    ctx: &mut ControlContext,
    io: &mut ControllerIo<B, A, E, C>,
    cfg: &HeadingConfig,
    shares: &Shares,
) -> Option<((f64, f64), i32)>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    let section = shares.section.get();
    let enabled = shares.enable.get();

    // the wall turn is used once; any later clear is a stop, like the finish
    if section == Section::Finish || (!enabled && ctx.turn_two) {
        shares.set_wheel_velocities(0.0, 0.0);
        io.array.disable();
        ctx.state = ControlState::Init;
        return None;
    }

    // in this phase a first cleared enable is the wall bump: turn, reverse, and re-enable
    if !enabled {
        shares.section.put(Section::WallAck);
        ctx.target_heading = wrap_heading(ctx.target_heading - cfg.quarter_turn, cfg.period);
        ctx.turn_two = true;
        ctx.heading_pid_reset = false;
        ctx.direction = -1.0;
        shares.enable.put(true);
    } else if section == Section::HeadingTurn && !ctx.turn_one {
        ctx.target_heading = wrap_heading(ctx.target_heading + cfg.quarter_turn, cfg.period);
        ctx.turn_one = true;
        ctx.heading_pid_reset = false;
    } else if section == Section::WallTurnOne && !ctx.wall_turn_one {
        ctx.target_heading = wrap_heading(ctx.target_heading - cfg.quarter_turn, cfg.period);
        ctx.wall_turn_one = true;
        ctx.heading_pid_reset = false;
    } else if section == Section::WallTurnTwo && !ctx.wall_turn_two {
        ctx.target_heading = wrap_heading(ctx.target_heading - cfg.quarter_turn, cfg.period);
        ctx.wall_turn_two = true;
        ctx.heading_pid_reset = false;
    }

    let error = circular_error(ctx.target_heading, ctx.heading, cfg.period);

    // drop windup collected while far off target, once per target
    if error.abs() <= cfg.deadband && !ctx.heading_pid_reset {
        ctx.heading_pid_reset = true;
        io.pid_heading.reset();
    }

    let control = io.pid_heading.update(f64::from(error));
    let base = cfg.base_velocity * ctx.direction;
    let max = cfg.max_velocity;
    let right = (base - control).clamp(-max, max);
    let left = (base + control).clamp(-max, max);

    shares.set_wheel_velocities(right, left);
    ctx.state = ControlState::Sense;
    Some(((right, left), error))
}

pub fn heading_sense<B, A, E, C>(
    ctx: &mut ControlContext,
    io: &mut ControllerIo<B, A, E, C>,
) -> Result<(), TaskError>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock,
{
    ctx.heading = i32::from(io.imu.read_euler()?.yaw);
    ctx.state = ControlState::Actuate;
    Ok(())
}

pub struct Controller<B, A, E, C>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock + Clone,
{
    ctx: ControlContext,
    io: ControllerIo<B, A, E, C>,
    line: LineConfig,
    heading: HeadingConfig,
    clock: C,
    recorder: Arc<EventRecorder>,
}

impl<B, A, E, C> Controller<B, A, E, C>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock + Clone,
{
    pub fn new(
        imu: Imu<B>,
        array: SensorArray<A, E>,
        line: LineConfig,
        heading: HeadingConfig,
        clock: C,
        recorder: Arc<EventRecorder>,
    ) -> Self {
        let io = ControllerIo {
            imu,
            array,
            pid_line: Pid::new(line.gains, clock.clone()),
            pid_heading: Pid::new(heading.gains, clock.clone()),
        };
        Self {
            ctx: ControlContext::new(&line),
            io,
            line,
            heading,
            clock,
            recorder,
        }
    }

    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ControlContext {
        &mut self.ctx
    }

    pub fn io(&self) -> &ControllerIo<B, A, E, C> {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut ControllerIo<B, A, E, C> {
        &mut self.io
    }

    fn mode_name(&self) -> &'static str {
        match self.ctx.state {
            ControlState::Init => "Init",
            _ => self.ctx.phase.name(),
        }
    }
}

impl<B, A, E, C> Task for Controller<B, A, E, C>
where
    B: I2cBus,
    A: AdcChannel,
    E: EmitterPins,
    C: Clock + Clone,
{
    fn step(&mut self, shares: &Shares) -> Result<(), TaskError> {
        let mode_before = self.mode_name();
        let section_before = shares.section.get();

        let result = match (self.ctx.state, self.ctx.phase) {
            (ControlState::Init, _) => init_step(&mut self.ctx, &mut self.io, &self.line, &self.heading, shares),
            (ControlState::Actuate, Phase::Line) => {
                if let Some((right, left)) = line_actuate(&mut self.ctx, &mut self.io, &self.line, shares) {
                    self.recorder.record(Event::WheelSetpoints {
                        ts_us: self.clock.now_us(),
                        right,
                        left,
                    });
                }
                Ok(())
            }
            (ControlState::Sense, Phase::Line) => {
                line_sense(&mut self.ctx, &mut self.io, &self.line, shares);
                Ok(())
            }
            (ControlState::Actuate, Phase::Heading) => {
                if let Some(((right, left), error)) =
                    heading_actuate(&mut self.ctx, &mut self.io, &self.heading, shares)
                {
                    let ts_us = self.clock.now_us();
                    self.recorder.record(Event::WheelSetpoints { ts_us, right, left });
                    self.recorder.record(Event::HeadingError {
                        ts_us,
                        target: self.ctx.target_heading,
                        error,
                    });
                    debug!("[Controller] heading {} target {} error {}", self.ctx.heading, self.ctx.target_heading, error);
                }
                Ok(())
            }
            (ControlState::Sense, Phase::Heading) => heading_sense(&mut self.ctx, &mut self.io),
        };

        let ts_us = self.clock.now_us();
        let section_after = shares.section.get();
        if section_after != section_before {
            info!("[Controller] section {:?} -> {:?}", section_before, section_after);
            self.recorder.record(Event::SectionWritten {
                ts_us,
                writer: "Controller",
                code: section_after.code(),
            });
        }

        let mode_after = self.mode_name();
        if mode_after != mode_before {
            info!("[Controller] {} -> {}", mode_before, mode_after);
            self.recorder.record(Event::Transition {
                ts_us,
                task: "Controller",
                from: mode_before,
                to: mode_after,
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::{imu::DEVICE_ADDRESS, sensor_array::ThicknessThresholds},
        error::BusError,
        hal::ManualClock,
    };
    use std::{cell::Cell, rc::Rc};

    /// Answers Euler reads with a settable yaw.
    #[derive(Clone, Default)]
    struct YawBus {
        yaw: Rc<Cell<i16>>,
        fail: Rc<Cell<bool>>,
        mode: Rc<Cell<u8>>,
    }

    impl I2cBus for YawBus {
        fn mem_write(&mut self, _device: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
            if register == 0x3D {
                self.mode.set(data[0]);
            }
            Ok(())
        }

        fn mem_read(&mut self, device: u8, _register: u8, buf: &mut [u8]) -> Result<(), BusError> {
            if self.fail.get() {
                return Err(BusError::Nack { device });
            }
            let yaw = self.yaw.get().to_le_bytes();
            buf.fill(0);
            buf[0] = yaw[0];
            buf[1] = yaw[1];
            Ok(())
        }
    }

    #[derive(Clone)]
    struct Adc(Rc<Cell<i32>>);

    impl AdcChannel for Adc {
        fn read_raw(&mut self) -> i32 {
            self.0.get()
        }
    }

    #[derive(Clone, Default)]
    struct Emitters(Rc<Cell<bool>>);

    impl EmitterPins for Emitters {
        fn set_emitters(&mut self, on: bool) {
            self.0.set(on);
        }
    }

    type TestController = Controller<YawBus, Adc, Emitters, ManualClock>;

    struct Rig {
        ctl: TestController,
        bus: YawBus,
        adcs: Vec<Rc<Cell<i32>>>,
        emitters: Emitters,
        clock: ManualClock,
        shares: Shares,
    }

    impl Rig {
        /// Five channels calibrated 0..1000 so raw/1000 is the normalized reading.
        fn new() -> Self {
            let adcs: Vec<Rc<Cell<i32>>> = (0..5).map(|_| Rc::new(Cell::new(0))).collect();
            let emitters = Emitters::default();
            let mut array = SensorArray::new(
                adcs.iter().map(|c| Some(Adc(c.clone()))).collect(),
                emitters.clone(),
                ThicknessThresholds { no_line_max: 1.0, thick_min: 3.5 },
            );
            array.config_all(&[0; 5], &[1000; 5]).unwrap();
            let bus = YawBus::default();
            let clock = ManualClock::new();
            let line = LineConfig { center_index: 3.0, ..LineConfig::default() };
            let ctl = Controller::new(
                Imu::new(bus.clone()),
                array,
                line,
                HeadingConfig::default(),
                clock.clone(),
                Arc::new(EventRecorder::new()),
            );
            Self { ctl, bus, adcs, emitters, clock, shares: Shares::new() }
        }

        fn set_line(&self, readings: [i32; 5]) {
            for (adc, raw) in self.adcs.iter().zip(readings) {
                adc.set(raw);
            }
        }

        fn step(&mut self) {
            self.clock.advance_us(10_000);
            self.ctl.step(&self.shares).unwrap();
        }

        fn velocities(&self) -> (f64, f64) {
            (self.shares.right.velocity.get(), self.shares.left.velocity.get())
        }
    }

    #[test]
    fn circular_error_takes_the_short_way_round() {
        assert_eq!(circular_error(5319, 0, 5760), -441);
        assert_eq!(circular_error(0, 5759, 5760), 1);
        assert_eq!(circular_error(100, 40, 5760), 60);
        // equal magnitudes keep the direct candidate
        assert_eq!(circular_error(2880, 0, 5760), 2880);
    }

    #[test]
    fn wrap_heading_stays_in_range() {
        assert_eq!(wrap_heading(5760 + 10, 5760), 10);
        assert_eq!(wrap_heading(-1440, 5760), 4320);
        assert_eq!(wrap_heading(5760, 5760), 0);
    }

    #[test]
    fn init_waits_for_enable() {
        let mut rig = Rig::new();
        rig.step();
        assert_eq!(rig.ctl.context().state, ControlState::Init);
        assert!(!rig.emitters.0.get());
    }

    #[test]
    fn init_targets_half_turn_from_current_heading() {
        let mut rig = Rig::new();
        rig.bus.yaw.set(4000);
        rig.shares.enable.put(true);
        rig.step();
        let ctx = rig.ctl.context();
        assert_eq!(ctx.state, ControlState::Actuate);
        assert_eq!(ctx.phase, Phase::Line);
        assert_eq!(ctx.target_heading, (4000 + 2880) % 5760);
        assert_eq!(ctx.heading, ctx.target_heading);
        assert!(rig.emitters.0.get());
    }

    #[test]
    fn imu_failure_keeps_init_and_reports() {
        let mut rig = Rig::new();
        rig.bus.fail.set(true);
        rig.shares.enable.put(true);
        let err = rig.ctl.step(&rig.shares).unwrap_err();
        assert!(matches!(err, TaskError::Imu(_)));
        assert_eq!(rig.ctl.context().state, ControlState::Init);
    }

    #[test]
    fn centered_line_drives_straight_at_feed_forward() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.set_line([0, 0, 1000, 500, 0]);
        rig.step(); // init
        rig.step(); // actuate, first PID call returns 0
        assert_eq!(rig.velocities(), (7.0, 7.0));
    }

    #[test]
    fn off_center_line_steers_toward_it() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.set_line([0, 0, 0, 1000, 1000]);
        rig.step(); // init
        rig.step(); // actuate
        rig.step(); // sense: centroid 4.5
        rig.step(); // actuate
        let (right, left) = rig.velocities();
        // error = 3 - 4.5 < 0, so the right wheel slows
        assert!(right < left);
        assert!(right.abs() <= 19.0 && left.abs() <= 19.0);
    }

    #[test]
    fn line_setpoints_saturate() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.step(); // init
        rig.step(); // actuate
        rig.ctl.context_mut().centroid = -1.0e6;
        rig.ctl.context_mut().state = ControlState::Actuate;
        rig.step();
        assert_eq!(rig.velocities(), (19.0, -19.0));
    }

    #[test]
    fn no_line_holds_center() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.set_line([0, 0, 0, 0, 900]);
        rig.step(); // init
        rig.step(); // actuate
        rig.ctl.context_mut().centroid = 5.0;
        rig.step(); // sense
        assert_eq!(rig.ctl.context().centroid, 3.0);
    }

    #[test]
    fn disable_in_line_phase_stops_and_returns_to_init() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.step();
        rig.step();
        rig.step();
        rig.shares.emergency_stop();
        rig.step();
        assert_eq!(rig.velocities(), (0.0, 0.0));
        assert_eq!(rig.ctl.context().state, ControlState::Init);
        assert!(!rig.emitters.0.get());
    }

    #[test]
    fn thick_line_on_start_acknowledges_diamond() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.shares.section.put(Section::Start);
        rig.set_line([1000, 1000, 1000, 1000, 0]);
        rig.step(); // init
        rig.step(); // actuate
        rig.step(); // sense
        assert!(rig.ctl.context().ignore_line);
        assert_eq!(rig.shares.section.get(), Section::DiamondAck);

        rig.step(); // actuate on the bias
        assert_eq!(rig.velocities(), (6.0, 8.0));
    }

    #[test]
    fn line_resume_clears_ignore_and_search() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.step();
        rig.ctl.context_mut().ignore_line = true;
        rig.shares.section.put(Section::LineResume);
        rig.step();
        let ctx = rig.ctl.context();
        assert!(!ctx.ignore_line);
        assert_eq!(ctx.search, None);
    }

    #[test]
    fn thick_line_on_heading_search_switches_phase() {
        let mut rig = Rig::new();
        rig.shares.enable.put(true);
        rig.step();
        rig.shares.section.put(Section::HeadingSearch);
        rig.set_line([1000, 1000, 1000, 1000, 1000]);
        rig.step();
        rig.step();
        assert_eq!(rig.ctl.context().phase, Phase::Heading);
        assert_eq!(rig.shares.section.get(), Section::HeadingAck);
    }

    fn heading_rig(yaw: i16) -> Rig {
        let mut rig = Rig::new();
        rig.bus.yaw.set(yaw);
        rig.shares.enable.put(true);
        rig.step();
        rig.ctl.context_mut().phase = Phase::Heading;
        rig
    }

    #[test]
    fn heading_turn_adds_a_quarter_once() {
        let mut rig = heading_rig(0);
        rig.shares.section.put(Section::HeadingTurn);
        rig.step();
        assert_eq!(rig.ctl.context().target_heading, 2880 + 1440);
        rig.step();
        rig.step();
        assert_eq!(rig.ctl.context().target_heading, 2880 + 1440);
        assert!(rig.ctl.context().turn_one);
    }

    #[test]
    fn disable_in_heading_phase_is_the_wall_turn() {
        let mut rig = heading_rig(0);
        rig.shares.emergency_stop();
        rig.step();
        let ctx = rig.ctl.context();
        assert!(rig.shares.enable.get());
        assert_eq!(rig.shares.section.get(), Section::WallAck);
        assert_eq!(ctx.direction, -1.0);
        assert_eq!(ctx.target_heading, 2880 - 1440);
        assert!(ctx.turn_two);
    }

    #[test]
    fn heading_setpoints_use_the_heading_limit() {
        let mut rig = heading_rig(0);
        rig.step(); // actuate, first PID call
        assert_eq!(rig.velocities(), (6.0, 6.0));
        rig.step(); // sense
        rig.ctl.context_mut().heading = 0;
        rig.step(); // actuate, error 2880
        let (right, left) = rig.velocities();
        assert!(right.abs() <= 7.5 && left.abs() <= 7.5);
        assert_eq!(left, 7.5);
    }

    #[test]
    fn deadband_resets_heading_pid_once() {
        let mut rig = heading_rig(0);
        let target = rig.ctl.context().target_heading;
        rig.bus.yaw.set((target - 20) as i16);
        rig.step(); // actuate, heading still on target -> reset
        assert!(rig.ctl.context().heading_pid_reset);
        assert_eq!(rig.ctl.io().pid_heading.integral(), 0.0);
        rig.step(); // sense, 20 units short
        rig.step(); // actuate, still in band
        assert!((rig.ctl.io().pid_heading.integral() - 0.4).abs() < 1e-9);
        rig.step();
        rig.step();
        // 20 units for two 20 ms intervals, not wiped by a second reset
        assert!(rig.ctl.context().heading_pid_reset);
        assert!((rig.ctl.io().pid_heading.integral() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn disable_after_the_wall_turn_stops_and_reinitializes() {
        let mut rig = heading_rig(0);
        rig.shares.emergency_stop();
        rig.step(); // wall turn, re-enabled
        assert!(rig.ctl.context().turn_two);
        assert!(rig.velocities().0 < 0.0);
        rig.step(); // sense

        rig.shares.section.put(Section::WallTurnOne);
        rig.shares.emergency_stop();
        rig.step();
        assert_eq!(rig.velocities(), (0.0, 0.0));
        assert_eq!(rig.ctl.context().state, ControlState::Init);
        assert!(!rig.shares.enable.get());
        assert_eq!(rig.shares.section.get(), Section::WallTurnOne);
        assert!(!rig.emitters.0.get());

        rig.step();
        assert_eq!(rig.ctl.context().state, ControlState::Init);
    }

    #[test]
    fn finish_in_heading_phase_stops_and_reinitializes() {
        let mut rig = heading_rig(0);
        rig.shares.section.put(Section::Finish);
        rig.ctl.context_mut().turn_two = true;
        rig.shares.set_wheel_velocities(3.0, 3.0);
        rig.shares.emergency_stop();
        rig.step();
        assert_eq!(rig.velocities(), (0.0, 0.0));
        assert_eq!(rig.ctl.context().state, ControlState::Init);
    }

    #[test]
    fn prepare_imu_ends_in_requested_mode() {
        let bus = YawBus::default();
        let mut imu = Imu::new(bus.clone());
        prepare_imu(&mut imu, Some(&[0; 22]), OperatingMode::Imu, Duration::ZERO).unwrap();
        assert_eq!(bus.mode.get(), OperatingMode::Imu.register_value());
        assert_eq!(DEVICE_ADDRESS, 0x28);
    }
}
