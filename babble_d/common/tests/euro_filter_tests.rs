use common::{EuroFilter, OneEuroFilter};

#[test]
fn test_euro_filter_first_sample_starts_from_initial_value() {
    let mut filter = EuroFilter::new(0.5, 1.0, 0.5);
    assert_eq!(filter.value(), 0.5);

    // Same timestamp as construction: dt == 0, nothing changes.
    let filtered = filter.filter(0.0, 1.0);
    assert_eq!(filtered, 0.5, "dt == 0 must return the previous value");
}

#[test]
fn test_euro_filter_zero_and_negative_dt() {
    let mut filter = EuroFilter::new(0.0, 1.0, 0.5);
    let first = filter.filter(0.1, 1.0);
    assert!(first.is_finite());

    assert_eq!(filter.filter(0.1, 5.0), first, "repeated timestamp");
    assert_eq!(filter.filter(0.05, 5.0), first, "timestamp going backwards");
    assert!(filter.filter(0.2, 1.0).is_finite());
}

#[test]
fn test_euro_filter_nan_handling() {
    let mut filter = EuroFilter::new(0.25, 1.0, 0.5);
    let res = filter.filter(0.1, f32::NAN);
    assert_eq!(res, 0.25);

    // NaN must not poison later samples.
    let next = filter.filter(0.2, 0.25);
    assert!((next - 0.25).abs() < 1e-6);
}

#[test]
fn test_euro_filter_converges_on_constant_input() {
    let mut filter = EuroFilter::new(0.0, 1.0, 0.5);
    let mut out = 0.0;
    for i in 1..=500 {
        out = filter.filter(i as f64 * 0.01, 0.8);
    }
    assert!((out - 0.8).abs() < 1e-3, "expected ~0.8, got {}", out);
}

#[test]
fn test_euro_filter_smooths_a_step() {
    let mut filter = EuroFilter::new(0.0, 1.0, 0.0);
    let filtered = filter.filter(0.01, 1.0);
    assert!(filtered > 0.0 && filtered < 1.0, "step should be partially followed, got {}", filtered);
}

#[test]
fn test_euro_filter_beta_follows_fast_motion() {
    let mut slow = EuroFilter::new(0.0, 1.0, 0.0);
    let mut fast = EuroFilter::new(0.0, 1.0, 10.0);
    let mut slow_out = 0.0;
    let mut fast_out = 0.0;
    for i in 1..=5 {
        let t = i as f64 * 0.01;
        let x = i as f32 * 0.2;
        slow_out = slow.filter(t, x);
        fast_out = fast.filter(t, x);
    }
    assert!(
        fast_out > slow_out,
        "higher beta should lag less: fast {} vs slow {}",
        fast_out,
        slow_out
    );
}

mod vector {
    use super::*;

    #[test]
    fn test_channel_count_fixed_by_initial_values() {
        let filter = OneEuroFilter::new(&[0.0; 6], 1.0, 0.5);
        assert_eq!(filter.len(), 6);
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_channels_are_independent() {
        let mut filter = OneEuroFilter::new(&[0.0, 1.0], 1.0, 0.5);
        let mut out = Vec::new();
        for i in 1..=500 {
            out = filter.filter(i as f64 * 0.01, &[0.0, 1.0]);
        }
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_extra_values_pass_through() {
        let mut filter = OneEuroFilter::new(&[0.0], 1.0, 0.5);
        let out = filter.filter(0.01, &[1.0, 0.7]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], 0.7);
    }
}
