/*
Centroid and thickness estimate over a 13-channel array, for a narrow line, a thick
landmark, and no line at all. This runs once per Controller sense step.
*/

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use trackbot::drivers::sensor_array::{locate_line, ThicknessThresholds};

const CHANNELS: usize = 13;
const ABSENT: usize = 6;

fn profile(name: &str) -> Vec<(usize, f64)> {
    (0..CHANNELS)
        .filter(|&i| i != ABSENT)
        .map(|i| {
            let value = match name {
                "narrow" => (1.0 - (i as f64 - 5.3).abs() / 1.5).max(0.0),
                "thick" => 0.9,
                _ => 0.02,
            };
            (i, value)
        })
        .collect()
}

fn bench_locate_line(c: &mut Criterion) {
    let thresholds = ThicknessThresholds::default();
    let mut group = c.benchmark_group("locate_line");

    for name in ["narrow", "thick", "none"] {
        let readings = profile(name);
        group.bench_with_input(BenchmarkId::from_parameter(name), &readings, |b, readings| {
            b.iter(|| black_box(locate_line(readings.iter().copied(), black_box(&thresholds))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_locate_line);
criterion_main!(benches);
