/*
Two simulated seconds of the full robot: 2000 physics ticks, each followed by a scheduler
pass over both wheel loops, the Controller and the Tracker. Setup (battery check, IMU
bring-up, array calibration) is part of every iteration.
*/

use criterion::{criterion_group, criterion_main, Criterion};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use trackbot::{
    config::RobotConfig,
    sim::{SimConfig, Simulation},
    utils::metrics::{EventRecorder, Metrics, SharedMetrics},
};

fn scheduler_pass_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulated_course");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    group.bench_function("first_two_seconds", |b| {
        b.iter(|| {
            let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
            let recorder = Arc::new(EventRecorder::new());
            let config = SimConfig {
                max_duration: Duration::from_secs(2),
                ..SimConfig::default()
            };
            let mut sim = match Simulation::new(&RobotConfig::default(), config, metrics, recorder) {
                Ok(sim) => sim,
                Err(e) => panic!("setup failed: {}", e),
            };
            sim.run()
        })
    });

    group.finish();
}

criterion_group!(benches, scheduler_pass_bench);
criterion_main!(benches);
