//! tracker.rs
//! Landmark tracker: wheel odometry → arm moves and section proposals.
//!
//! The tracker measures straight-line progress as the average of both wheel
//! accumulators and compares it against a per-state table of distance bands.
//! It only advances to the next state once the Controller acknowledges a landmark,
//! and zeroes odometry at that moment.

use std::sync::Arc;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::{
    drivers::servo::{Arm, ArmPosition, ArmPulseWidths},
    error::TaskError,
    hal::{Clock, ServoPwm},
    scheduler::Task,
    shares::{Section, Shares},
    utils::metrics::{Event, EventRecorder},
};

/// What to do when the average distance falls in a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandAction {
    /// Beyond the plausible range for this state; do nothing.
    Hold,
    Arm(ArmPosition),
    /// Propose a section to the Controller.
    Signal(Section),
    /// Course complete: stop the robot.
    Finish,
}

/// Applies from `min_ticks` up to the next larger band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min_ticks: f64,
    pub action: BandAction,
}

impl Band {
    pub const fn new(min_ticks: f64, action: BandAction) -> Self {
        Self { min_ticks, action }
    }
}

/// First band, largest threshold first, that `distance` reaches.
pub fn select_band(bands: &[Band], distance: f64) -> Option<BandAction> {
    bands
        .iter()
        .find(|band| distance >= band.min_ticks)
        .map(|band| band.action)
}

/// Distance bands for each course stage, in encoder ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    pub start: Vec<Band>,
    pub post_landmark: Vec<Band>,
    pub heading: Vec<Band>,
    /// Measured in reverse after the wall bump.
    pub wall: Vec<Band>,
    pub arm: ArmPulseWidths,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            start: vec![
                Band::new(100_000.0, BandAction::Hold),
                Band::new(4_100.0, BandAction::Arm(ArmPosition::Stowed)),
                Band::new(500.0, BandAction::Arm(ArmPosition::Deployed)),
            ],
            post_landmark: vec![
                Band::new(100_000.0, BandAction::Hold),
                Band::new(17_000.0, BandAction::Signal(Section::HeadingSearch)),
                Band::new(5_250.0, BandAction::Arm(ArmPosition::Stowed)),
                Band::new(4_000.0, BandAction::Arm(ArmPosition::Deployed)),
                Band::new(850.0, BandAction::Signal(Section::LineResume)),
            ],
            heading: vec![
                Band::new(8_500.0, BandAction::Hold),
                Band::new(4_475.0, BandAction::Signal(Section::HeadingTurn)),
            ],
            wall: vec![
                Band::new(8_000.0, BandAction::Hold),
                Band::new(4_850.0, BandAction::Finish),
                Band::new(2_950.0, BandAction::Signal(Section::WallTurnTwo)),
                Band::new(1_500.0, BandAction::Signal(Section::WallTurnOne)),
            ],
            arm: ArmPulseWidths::default(),
        }
    }
}

impl CourseConfig {
    /// Sort every table largest threshold first.
    pub fn normalized(mut self) -> Self {
        for bands in [&mut self.start, &mut self.post_landmark, &mut self.heading, &mut self.wall] {
            bands.sort_by(|a, b| b.min_ticks.total_cmp(&a.min_ticks));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Init,
    /// Start line up to the diamond.
    Start,
    /// Diamond to the start of the heading section.
    PostLandmark,
    /// Heading section up to the wall.
    HeadingPhase,
    /// Reversing away from the wall to the finish.
    WallApproach,
}

impl TrackerState {
    pub const fn name(self) -> &'static str {
        match self {
            TrackerState::Init => "Init",
            TrackerState::Start => "Start",
            TrackerState::PostLandmark => "PostLandmark",
            TrackerState::HeadingPhase => "HeadingPhase",
            TrackerState::WallApproach => "WallApproach",
        }
    }

    /// Acknowledgment that ends this state, and the state it leads to.
    pub const fn exit(self) -> Option<(Section, TrackerState)> {
        match self {
            TrackerState::Start => Some((Section::DiamondAck, TrackerState::PostLandmark)),
            TrackerState::PostLandmark => Some((Section::HeadingAck, TrackerState::HeadingPhase)),
            TrackerState::HeadingPhase => Some((Section::WallAck, TrackerState::WallApproach)),
            TrackerState::Init | TrackerState::WallApproach => None,
        }
    }

    /// States in which a cleared enable is part of the maneuver, not a stop.
    const fn survives_disable(self) -> bool {
        matches!(self, TrackerState::HeadingPhase | TrackerState::WallApproach)
    }
}

/// Average travel of both wheels. In reverse, counts are read down from `u32::MAX`.
pub fn average_distance(right: u32, left: u32, reverse: bool) -> f64 {
    let (right, left) = if reverse {
        (u32::MAX - right, u32::MAX - left)
    } else {
        (right, left)
    };
    (f64::from(right) + f64::from(left)) / 2.0
}

pub struct Tracker<P: ServoPwm, C: Clock> {
    state: TrackerState,
    arm: Arm<P>,
    course: CourseConfig,
    clock: C,
    recorder: Arc<EventRecorder>,
}

impl<P: ServoPwm, C: Clock> Tracker<P, C> {
    pub fn new(servo: P, course: CourseConfig, clock: C, recorder: Arc<EventRecorder>) -> Self {
        let course = course.normalized();
        Self {
            state: TrackerState::Init,
            arm: Arm::new(servo, course.arm),
            course,
            clock,
            recorder,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn arm(&self) -> &Arm<P> {
        &self.arm
    }

    fn transition(&mut self, to: TrackerState) {
        if to != self.state {
            info!("[Tracker] {} -> {}", self.state.name(), to.name());
            self.recorder.record(Event::Transition {
                ts_us: self.clock.now_us(),
                task: "Tracker",
                from: self.state.name(),
                to: to.name(),
            });
        }
        self.state = to;
    }

    fn write_section(&self, shares: &Shares, section: Section) {
        if shares.section.get() != section {
            debug!("[Tracker] section {:?}", section);
            self.recorder.record(Event::SectionWritten {
                ts_us: self.clock.now_us(),
                writer: "Tracker",
                code: section.code(),
            });
        }
        shares.section.put(section);
    }

    fn init(&mut self, shares: &Shares) {
        self.arm.move_to(ArmPosition::Stowed);
        shares.request_encoder_reset();
        self.write_section(shares, Section::Start);
        self.transition(TrackerState::Start);
    }

    fn bands(&self) -> &[Band] {
        match self.state {
            TrackerState::Start => &self.course.start,
            TrackerState::PostLandmark => &self.course.post_landmark,
            TrackerState::HeadingPhase => &self.course.heading,
            TrackerState::WallApproach => &self.course.wall,
            TrackerState::Init => &[],
        }
    }

    fn track(&mut self, shares: &Shares) {
        if let Some((ack, next)) = self.state.exit() {
            if shares.section.get() == ack {
                shares.request_encoder_reset();
                self.transition(next);
                return;
            }
        }

        let distance = average_distance(
            shares.right.position.get(),
            shares.left.position.get(),
            self.state == TrackerState::WallApproach,
        );
        trace!("[Tracker] {} distance {:.1}", self.state.name(), distance);
        self.recorder.record(Event::Distance {
            ts_us: self.clock.now_us(),
            state: self.state.name(),
            average: distance,
        });

        match select_band(self.bands(), distance) {
            None | Some(BandAction::Hold) => {}
            Some(BandAction::Arm(position)) => self.arm.move_to(position),
            Some(BandAction::Signal(section)) => self.write_section(shares, section),
            Some(BandAction::Finish) => {
                info!("[Tracker] course complete at {:.0} ticks", distance);
                shares.enable.put(false);
                self.write_section(shares, Section::Finish);
                self.transition(TrackerState::Init);
            }
        }
    }
}

impl<P: ServoPwm, C: Clock> Task for Tracker<P, C> {
    fn step(&mut self, shares: &Shares) -> Result<(), TaskError> {
        let idle = !shares.enable.get() && !self.state.survives_disable();
        if idle || self.state == TrackerState::Init {
            self.init(shares);
        }
        self.track(shares);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ManualClock;
    use std::{cell::Cell, rc::Rc};

    #[derive(Clone, Default)]
    struct Pwm(Rc<Cell<u32>>);

    impl ServoPwm for Pwm {
        fn set_pulse_width(&mut self, width: u32) {
            self.0.set(width);
        }
    }

    fn tracker() -> (Tracker<Pwm, ManualClock>, Pwm, Shares) {
        let pwm = Pwm::default();
        let t = Tracker::new(
            pwm.clone(),
            CourseConfig::default(),
            ManualClock::new(),
            Arc::new(EventRecorder::new()),
        );
        let shares = Shares::new();
        shares.enable.put(true);
        (t, pwm, shares)
    }

    fn drive(shares: &Shares, ticks: u32) {
        shares.right.reset.put(false);
        shares.left.reset.put(false);
        shares.right.position.put(ticks);
        shares.left.position.put(ticks);
    }

    #[test]
    fn bands_are_checked_largest_first() {
        let bands = CourseConfig::default().post_landmark;
        assert_eq!(select_band(&bands, 200_000.0), Some(BandAction::Hold));
        assert_eq!(select_band(&bands, 17_000.0), Some(BandAction::Signal(Section::HeadingSearch)));
        assert_eq!(select_band(&bands, 4_500.0), Some(BandAction::Arm(ArmPosition::Deployed)));
        assert_eq!(select_band(&bands, 849.0), None);
    }

    #[test]
    fn unsorted_tables_are_normalized() {
        let mut course = CourseConfig::default();
        course.start.reverse();
        let course = course.normalized();
        assert_eq!(course.start[0].action, BandAction::Hold);
    }

    #[test]
    fn reverse_distance_counts_down_from_max() {
        assert_eq!(average_distance(10, 20, false), 15.0);
        assert_eq!(average_distance(u32::MAX - 1_000, u32::MAX - 3_000, true), 2_000.0);
        assert!(average_distance(0, 0, true) > 8_000.0);
    }

    #[test]
    fn init_stows_arm_resets_and_proposes_start() {
        let (mut t, pwm, shares) = tracker();
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::Start);
        assert_eq!(pwm.0.get(), 10_000);
        assert!(shares.right.reset.get() && shares.left.reset.get());
        assert_eq!(shares.section.get(), Section::Start);
    }

    #[test]
    fn start_deploys_then_stows_the_arm() {
        let (mut t, pwm, shares) = tracker();
        t.step(&shares).unwrap();
        drive(&shares, 600);
        t.step(&shares).unwrap();
        assert_eq!(pwm.0.get(), 14_500);
        drive(&shares, 4_200);
        t.step(&shares).unwrap();
        assert_eq!(pwm.0.get(), 10_000);
    }

    #[test]
    fn diamond_ack_resets_encoders_and_advances() {
        let (mut t, _pwm, shares) = tracker();
        t.step(&shares).unwrap();
        drive(&shares, 3_000);
        shares.section.put(Section::DiamondAck);
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::PostLandmark);
        assert!(shares.right.reset.get() && shares.left.reset.get());
    }

    #[test]
    fn post_landmark_proposes_resume_then_heading_search() {
        let (mut t, _pwm, shares) = tracker();
        t.step(&shares).unwrap();
        shares.section.put(Section::DiamondAck);
        t.step(&shares).unwrap();

        drive(&shares, 900);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::LineResume);

        drive(&shares, 17_500);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::HeadingSearch);

        shares.section.put(Section::HeadingAck);
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::HeadingPhase);
    }

    #[test]
    fn disable_reinitializes_only_before_the_heading_phase() {
        let (mut t, _pwm, shares) = tracker();
        t.step(&shares).unwrap();
        shares.section.put(Section::DiamondAck);
        t.step(&shares).unwrap();
        shares.emergency_stop();
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::Start);

        shares.enable.put(true);
        shares.section.put(Section::DiamondAck);
        t.step(&shares).unwrap();
        shares.section.put(Section::HeadingAck);
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::HeadingPhase);
        shares.emergency_stop();
        t.step(&shares).unwrap();
        assert_eq!(t.state(), TrackerState::HeadingPhase);
    }

    #[test]
    fn wall_distance_finishes_the_course() {
        let (mut t, _pwm, shares) = tracker();
        t.step(&shares).unwrap();
        for ack in [Section::DiamondAck, Section::HeadingAck, Section::WallAck] {
            shares.section.put(ack);
            t.step(&shares).unwrap();
        }
        assert_eq!(t.state(), TrackerState::WallApproach);

        drive(&shares, 0);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::WallAck);

        drive(&shares, u32::MAX - 1_600);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::WallTurnOne);

        drive(&shares, u32::MAX - 3_000);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::WallTurnTwo);

        drive(&shares, u32::MAX - 5_000);
        t.step(&shares).unwrap();
        assert_eq!(shares.section.get(), Section::Finish);
        assert!(!shares.enable.get());
        assert_eq!(t.state(), TrackerState::Init);
    }
}
