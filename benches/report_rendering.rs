//! Benchmarks for the end-of-session path
//!
//! Rendering the session report and rotating preview frames both run on
//! the console task, so they must stay well under a preview interval.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use duocam::camera::Frame;
use duocam::session::render_report;
use duocam::test_utils::finished_session;
use duocam::{Resolution, Rotation};
use std::hint::black_box;

fn bench_report(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    let (session, rooms) = finished_session(dir.path());

    c.bench_function("render_session_report", |b| {
        b.iter(|| black_box(render_report(black_box(&session), black_box(&rooms))))
    });
}

fn bench_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("preview_rotation");
    for size in [Resolution::PREVIEW_DEFAULT, Resolution::new(1280, 720)] {
        let frame = Frame::solid(size.width, size.height, [40, 128, 200]);
        group.throughput(Throughput::Bytes(frame.data().len() as u64));
        for rotation in [Rotation::None, Rotation::Cw90, Rotation::Cw180] {
            group.bench_with_input(
                BenchmarkId::new(format!("{}deg", rotation.degrees()), size),
                &frame,
                |b, frame| b.iter(|| black_box(frame.rotate(black_box(rotation)))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_report, bench_rotation);
criterion_main!(benches);
