use common::CorruptionDetector;
use image::{GrayImage, Luma};

fn base_threshold() -> f64 {
    CorruptionDetector::default().threshold()
}

fn smooth_frame(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([((x + y) / 2 % 256) as u8]))
}

/// Every other row saturated: the pattern a torn serial frame produces.
fn striped_frame(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |_, y| if y % 2 == 0 { Luma([0]) } else { Luma([255]) })
}

#[test]
fn test_metric_is_zero_for_flat_and_tiny_frames() {
    assert_eq!(CorruptionDetector::row_pattern_metric(&GrayImage::from_pixel(8, 8, Luma([90]))), 0.0);
    assert_eq!(CorruptionDetector::row_pattern_metric(&GrayImage::new(8, 1)), 0.0);
    assert_eq!(CorruptionDetector::row_pattern_metric(&GrayImage::new(0, 0)), 0.0);
}

#[test]
fn test_smooth_frame_passes() {
    let mut detector = CorruptionDetector::default();
    let (corrupted, metric, threshold) = detector.check(&smooth_frame(64, 64));
    assert!(!corrupted, "metric {} threshold {}", metric, threshold);
}

#[test]
fn test_striped_frame_is_flagged() {
    let mut detector = CorruptionDetector::new(base_threshold(), false);
    let (corrupted, metric, _) = detector.check(&striped_frame(64, 64));
    assert!(corrupted, "metric {}", metric);
    assert!(metric > 0.9, "alternating rows swing by a full step: {}", metric);
}

#[test]
fn test_fixed_threshold_does_not_move() {
    let mut detector = CorruptionDetector::new(0.05, false);
    for _ in 0..50 {
        detector.check(&smooth_frame(32, 32));
    }
    assert_eq!(detector.threshold(), 0.05);
}

#[test]
fn test_adaptive_threshold_stays_within_bounds() {
    let base = base_threshold();
    let mut detector = CorruptionDetector::new(base, true);
    for _ in 0..30 {
        detector.check(&smooth_frame(32, 32));
    }
    let low = detector.threshold();
    assert!(low >= base * 0.5 - 1e-12 && low <= base * 3.0 + 1e-12, "{}", low);

    for _ in 0..200 {
        detector.check(&striped_frame(32, 32));
    }
    assert!((detector.threshold() - base * 3.0).abs() < 1e-12, "{}", detector.threshold());
}
