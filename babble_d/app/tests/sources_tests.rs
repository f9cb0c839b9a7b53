use api::{ColorType, VideoSource};
use babble_d::setup::{eye_source_factory, face_source_factory, load_config};
use babble_d::sources::{stitch, DualCameraSource, MirroredSource};
use common::BabbleConfig;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct SolidSource {
    value: Option<u8>,
    size: (u32, u32),
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl SolidSource {
    fn new(value: Option<u8>, size: (u32, u32)) -> Self {
        Self {
            value,
            size,
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl VideoSource for SolidSource {
    fn start(&mut self) -> bool {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.value.is_some()
    }

    fn stop(&mut self) -> bool {
        self.stops.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn get_frame(&mut self, _color: ColorType) -> Option<DynamicImage> {
        let value = self.value?;
        Some(DynamicImage::ImageLuma8(GrayImage::from_pixel(self.size.0, self.size.1, Luma([value]))))
    }
}

mod stitching {
    use super::*;

    #[test]
    fn test_side_by_side() {
        let left = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, Luma([10])));
        let right = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 3, Luma([200])));
        let out = stitch(&left, &right, ColorType::Gray8).to_luma8();
        assert_eq!(out.dimensions(), (8, 3));
        assert_eq!(out.get_pixel(1, 1)[0], 10);
        assert_eq!(out.get_pixel(6, 1)[0], 200);
    }

    #[test]
    fn test_right_is_scaled_to_left() {
        let left = DynamicImage::ImageLuma8(GrayImage::new(6, 4));
        let right = DynamicImage::ImageLuma8(GrayImage::from_pixel(12, 8, Luma([90])));
        let out = stitch(&left, &right, ColorType::Gray8);
        assert_eq!((out.width(), out.height()), (12, 4));
    }

    #[test]
    fn test_rgb_output() {
        let left = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
        let right = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 255])));
        let out = stitch(&left, &right, ColorType::Rgb24);
        let rgb = out.as_rgb8().expect("rgb");
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rgb.get_pixel(3, 1), &Rgb([0, 0, 255]));
    }
}

mod dual {
    use super::*;

    #[test]
    fn test_two_cameras_make_one_wide_frame() {
        let mut source = DualCameraSource::new(
            Box::new(SolidSource::new(Some(10), (8, 8))),
            Box::new(SolidSource::new(Some(200), (8, 8))),
        );
        assert!(source.start());
        let frame = source.get_frame(ColorType::Gray8).unwrap().to_luma8();
        assert_eq!(frame.dimensions(), (16, 8));
        assert_eq!(frame.get_pixel(2, 2)[0], 10);
        assert_eq!(frame.get_pixel(12, 2)[0], 200);
    }

    #[test]
    fn test_missing_side_is_duplicated() {
        let mut source = DualCameraSource::new(
            Box::new(SolidSource::new(None, (8, 8))),
            Box::new(SolidSource::new(Some(77), (8, 8))),
        );
        assert!(source.start(), "one working camera is enough");
        let frame = source.get_frame(ColorType::Gray8).unwrap().to_luma8();
        assert_eq!(frame.get_pixel(2, 2)[0], 77);
        assert_eq!(frame.get_pixel(12, 2)[0], 77);
    }

    #[test]
    fn test_no_frames_yet() {
        let mut source = DualCameraSource::new(
            Box::new(SolidSource::new(None, (8, 8))),
            Box::new(SolidSource::new(None, (8, 8))),
        );
        assert!(!source.start());
        assert!(source.get_frame(ColorType::Gray8).is_none());
    }

    #[test]
    fn test_start_and_stop_reach_both_cameras() {
        let left = SolidSource::new(Some(1), (4, 4));
        let right = SolidSource::new(Some(2), (4, 4));
        let (left_starts, left_stops) = (left.starts.clone(), left.stops.clone());
        let (right_starts, right_stops) = (right.starts.clone(), right.stops.clone());

        let mut source = DualCameraSource::new(Box::new(left), Box::new(right));
        source.start();
        assert_eq!(left_starts.load(Ordering::SeqCst), 1);
        assert_eq!(right_starts.load(Ordering::SeqCst), 1);
        assert_eq!(left_stops.load(Ordering::SeqCst), 0, "start must not stop anything");

        source.stop();
        assert_eq!(left_stops.load(Ordering::SeqCst), 1);
        assert_eq!(right_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mirrored_source() {
        let mut source = MirroredSource::new(Box::new(SolidSource::new(Some(33), (5, 4))));
        assert!(source.start());
        let frame = source.get_frame(ColorType::Gray8).unwrap();
        assert_eq!((frame.width(), frame.height()), (10, 4));
        assert_eq!(frame.to_luma8().get_pixel(7, 1)[0], 33);
    }
}

mod setup {
    use super::*;

    fn config(face: &str, left: &str, right: &str) -> BabbleConfig {
        let mut config = BabbleConfig::default();
        config.face.address = face.to_string();
        config.left_eye.address = left.to_string();
        config.right_eye.address = right.to_string();
        config
    }

    #[test]
    fn test_empty_addresses_disable_sources() {
        let config = config("", "", " ");
        assert!(face_source_factory(&config).is_none());
        assert!(eye_source_factory(&config).is_none());
    }

    #[test]
    fn test_factories_build_sources() {
        // Building a source does not open the device.
        for config in [
            config("/dev/video9", "/dev/video8", "/dev/video8"),
            config("", "/dev/video8", "/dev/video7"),
            config("", "", "/dev/video7"),
        ] {
            let mut factory = eye_source_factory(&config).expect("eye factory");
            assert!(factory().is_some(), "{:?}", config.left_eye.address);
        }

        let mut face = face_source_factory(&config("http://127.0.0.1:1/", "", "")).expect("face factory");
        assert!(face().is_some());
    }

    #[test]
    fn test_load_config_writes_default() {
        let path = std::env::temp_dir().join(format!("babble_config_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let created = load_config(&path).unwrap();
        assert_eq!(created, BabbleConfig::default());
        assert!(path.exists());

        std::fs::write(&path, r#"{"face": {"address": "COM4"}, "stabilize_eyes": true}"#).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.face.address, "COM4");
        assert!(loaded.stabilize_eyes);
        assert_eq!(loaded.osc, BabbleConfig::default().osc);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
