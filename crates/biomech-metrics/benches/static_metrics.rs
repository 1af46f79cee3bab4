//! Benchmarks for angle extraction and static metrics recomputation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use biomech_core::{names, CameraView, FrameSize, Keypoint, PoseFrame, Timestamp};
use biomech_metrics::{AngleComputer, RawMetricsAggregator, StaticMetricsCalculator};

fn create_test_frame(i: usize) -> PoseFrame {
    let sway = (i as f64 * 0.3).sin() * 4.0;
    PoseFrame::new(
        Timestamp::from_millis(i as f64 * 50.0),
        vec![
            Keypoint::new(names::LEFT_SHOULDER, 380.0 + sway, 180.0, 0.95),
            Keypoint::new(names::RIGHT_SHOULDER, 260.0 + sway, 181.0, 0.95),
            Keypoint::new(names::LEFT_HIP, 360.0 + sway, 380.0, 0.94),
            Keypoint::new(names::RIGHT_HIP, 280.0 + sway, 383.0, 0.94),
            Keypoint::new(names::LEFT_KNEE, 362.0, 520.0, 0.93),
            Keypoint::new(names::RIGHT_KNEE, 278.0, 520.0, 0.93),
            Keypoint::new(names::LEFT_ANKLE, 360.0, 650.0, 0.91),
            Keypoint::new(names::RIGHT_ANKLE, 280.0, 650.0, 0.91),
            Keypoint::new(names::LEFT_FOOT_INDEX, 385.0, 680.0, 0.82),
            Keypoint::new(names::RIGHT_FOOT_INDEX, 255.0, 680.0, 0.82),
        ],
    )
}

fn benchmark_angles(c: &mut Criterion) {
    let computer = AngleComputer::default();
    let frame = create_test_frame(0);

    c.bench_function("compute_angles", |b| b.iter(|| computer.compute(black_box(&frame))));
}

fn benchmark_static_metrics(c: &mut Criterion) {
    let computer = AngleComputer::default();
    let calculator = StaticMetricsCalculator::default();
    let size = FrameSize::new(640.0, 720.0);

    for n in [100usize, 900] {
        let mut aggregator = RawMetricsAggregator::new(n, 0.5);
        for i in 0..n {
            let frame = create_test_frame(i);
            let angles = computer.compute(&frame);
            let _ = aggregator.push_frame(&frame, size, &angles);
        }

        c.bench_function(&format!("static_metrics_{n}_samples"), |b| {
            b.iter(|| calculator.calculate(black_box(aggregator.history()), None, CameraView::Side))
        });
    }
}

criterion_group!(benches, benchmark_angles, benchmark_static_metrics);
criterion_main!(benches);
