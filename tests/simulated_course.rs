//! The full task set against the simulated robot and course.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use trackbot::{
    config::RobotConfig,
    error::{SetupError, StartupError},
    shares::Section,
    sim::{SimConfig, Simulation},
    utils::metrics::{with_metrics, EventRecorder, Metrics, SharedMetrics},
};

fn simulation(config: SimConfig) -> Result<(Simulation, SharedMetrics, Arc<EventRecorder>), SetupError> {
    let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
    let recorder = Arc::new(EventRecorder::new());
    let sim = Simulation::new(&RobotConfig::default(), config, metrics.clone(), recorder.clone())?;
    Ok((sim, metrics, recorder))
}

#[test]
fn robot_follows_the_line_to_the_diamond() {
    let config = SimConfig {
        max_duration: Duration::from_secs(5),
        ..SimConfig::default()
    };
    let (mut sim, metrics, recorder) = simulation(config).unwrap();
    let outcome = sim.run();

    assert!(outcome.reached(Section::Start));
    assert!(outcome.reached(Section::DiamondAck));
    assert_eq!(outcome.bumps, 0);
    // still on the outbound leg, close to the tape
    assert!(outcome.final_pose.x > 700.0);
    assert!(outcome.final_pose.y.abs() < 100.0);

    let events = recorder.drain();
    with_metrics(&metrics, |m| {
        m.absorb(&events);
        assert!(m.passes > 4_000);
        assert!(!m.setpoint_right.is_empty());
        assert!(m.step_errors.is_empty());
    });
}

#[test]
fn full_course_finishes() {
    let (mut sim, _, _) = simulation(SimConfig::default()).unwrap();
    let outcome = sim.run();

    assert!(outcome.finished, "stopped with sections {:?}", outcome.sections);
    assert_eq!(
        &outcome.sections[1..],
        &[
            Section::Start,
            Section::DiamondAck,
            Section::LineResume,
            Section::HeadingSearch,
            Section::HeadingAck,
            Section::HeadingTurn,
            Section::WallAck,
            Section::WallTurnOne,
            Section::WallTurnTwo,
            Section::Finish,
        ]
    );
    assert_eq!(outcome.bumps, 1);
    assert!(!sim.shares().enable.get());
    // backed around the east end of the wall and ended behind it
    assert!(outcome.final_pose.y > 1_360.0);
    assert!(outcome.final_pose.x < -100.0);
}

#[test]
fn other_seeds_finish_with_a_single_bump() {
    for seed in [1, 13] {
        let (mut sim, _, _) = simulation(SimConfig { seed, ..SimConfig::default() }).unwrap();
        let outcome = sim.run();
        assert!(outcome.finished, "seed {}: sections {:?}", seed, outcome.sections);
        assert_eq!(outcome.bumps, 1, "seed {}", seed);
    }
}

#[test]
fn same_seed_gives_the_same_run() {
    let config = || SimConfig {
        max_duration: Duration::from_secs(2),
        ..SimConfig::default()
    };
    let (mut a, _, _) = simulation(config()).unwrap();
    let (mut b, _, _) = simulation(config()).unwrap();
    assert_eq!(a.run().final_pose, b.run().final_pose);
}

#[test]
fn low_battery_stops_setup() {
    let config = SimConfig {
        battery_volts: 6.0,
        ..SimConfig::default()
    };
    match simulation(config) {
        Err(SetupError::Startup(StartupError::LowBattery { volts, .. })) => assert!(volts < 6.65),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("setup accepted a low battery"),
    }
}
