//! Cross-engine checks: the block-matching search and the constrained flow
//! tracker must agree on synthetic rectified pairs.

use image::{GrayImage, Luma};
use parallax::core::Point2f;
use parallax::flow::HorizontalFlowTracker;
use parallax::stereo::{disparity_from_correspondences, StereoSparseMatcher};

fn shifted_pair(width: u32, height: u32, shift: f32) -> (GrayImage, GrayImage) {
    let mut left = GrayImage::new(width, height);
    let mut right = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = |t: f32| ((t * 0.29).sin() * 75.0 + (y as f32 * 0.23).cos() * 45.0 + 128.0) as u8;
            left.put_pixel(x, y, Luma([v(x as f32)]));
            right.put_pixel(x, y, Luma([v(x as f32 + shift)]));
        }
    }
    (left, right)
}

#[test]
fn test_both_engines_recover_three_pixel_shift() {
    let (left, right) = shifted_pair(128, 128, 3.0);
    let points = vec![
        Point2f::new(50.0, 50.0),
        Point2f::new(70.0, 44.0),
        Point2f::new(64.0, 80.0),
    ];

    let matched = StereoSparseMatcher::new()
        .compute(&left, &right, &points)
        .unwrap();
    let tracked = HorizontalFlowTracker::new()
        .track(&left, &right, &points, None)
        .unwrap();

    assert_eq!(matched.len(), points.len());
    assert_eq!(tracked.len(), points.len());

    for (i, p) in points.iter().enumerate() {
        assert!(matched.status[i], "matcher lost point {i}");
        assert!(tracked.status[i], "tracker lost point {i}");

        let d_matched = matched.points[i].x - p.x;
        let d_tracked = tracked.points[i].x - p.x;
        assert!(
            (d_matched + 3.0).abs() < 0.1,
            "matcher point {i}: {d_matched}"
        );
        assert!(
            (d_tracked + 3.0).abs() < 0.1,
            "tracker point {i}: {d_tracked}"
        );
        assert!((d_matched - d_tracked).abs() < 0.2);
    }
}

#[test]
fn test_both_engines_reject_origin_point() {
    let (left, right) = shifted_pair(96, 96, 3.0);
    let points = vec![Point2f::new(0.0, 0.0)];

    let matched = StereoSparseMatcher::new()
        .compute(&left, &right, &points)
        .unwrap();
    let tracked = HorizontalFlowTracker::new()
        .track(&left, &right, &points, None)
        .unwrap();

    assert!(!matched.status[0]);
    assert!(!tracked.status[0]);
}

#[test]
fn test_disparity_image_from_either_engine() {
    let (left, right) = shifted_pair(96, 96, 3.0);
    let points = vec![Point2f::new(48.0, 48.0)];

    let matched = StereoSparseMatcher::new()
        .compute(&left, &right, &points)
        .unwrap();
    let from_matcher = disparity_from_correspondences((96, 96), &points, &matched).unwrap();

    let tracked = HorizontalFlowTracker::new()
        .track(&left, &right, &points, None)
        .unwrap();
    let from_tracker = disparity_from_correspondences(
        (96, 96),
        &points,
        &parallax::core::Correspondences {
            points: tracked.points.clone(),
            status: tracked.status.clone(),
        },
    )
    .unwrap();

    assert!((from_matcher.get(48, 48) - 3.0).abs() < 0.1);
    assert!((from_tracker.get(48, 48) - 3.0).abs() < 0.1);
}
