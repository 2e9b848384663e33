use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use parallax_core::Point2f;
use parallax_stereo::{MatchingCost, StereoSparseMatcher};

fn synthetic_pair(width: u32, height: u32) -> (GrayImage, GrayImage) {
    let mut left = GrayImage::new(width, height);
    let mut right = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = |t: f32| {
                ((t * 0.17).sin() * 60.0 + (y as f32 * 0.11).cos() * 55.0 + 128.0) as u8
            };
            left.put_pixel(x, y, Luma([v(x as f32)]));
            right.put_pixel(x, y, Luma([v(x as f32 + 5.0)]));
        }
    }
    (left, right)
}

fn grid_points(width: u32, height: u32, step: u32) -> Vec<Point2f> {
    let mut points = Vec::new();
    let mut y = 24;
    while y < height - 24 {
        let mut x = 24;
        while x < width - 24 {
            points.push(Point2f::new(x as f32, y as f32));
            x += step;
        }
        y += step;
    }
    points
}

fn benchmark_sparse_matcher(c: &mut Criterion) {
    let (left, right) = synthetic_pair(256, 256);
    let points = grid_points(256, 256, 16);

    c.bench_function("sparse_matcher_ssd_256", |b| {
        let matcher = StereoSparseMatcher::new();
        b.iter(|| {
            let matches = matcher
                .compute(black_box(&left), black_box(&right), black_box(&points))
                .unwrap();
            black_box(matches)
        })
    });

    c.bench_function("sparse_matcher_sad_256", |b| {
        let matcher = StereoSparseMatcher::new().with_cost(MatchingCost::Sad);
        b.iter(|| {
            let matches = matcher
                .compute(black_box(&left), black_box(&right), black_box(&points))
                .unwrap();
            black_box(matches)
        })
    });
}

criterion_group!(benches, benchmark_sparse_matcher);
criterion_main!(benches);
