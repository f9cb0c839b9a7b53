use anyhow::Result;
use api::{CaptureKind, ColorType, VideoSource};
use babble_d::capture::activation::{
    register_payload, sensor_registers, stream_payload, wake_payload, ControlTransport,
    DeviceActivation, FacialTrackerActivation, PAYLOAD_LEN,
};
use babble_d::capture::create_capture;
use babble_d::capture::frame_slot::{FrameReader, FrameSlot, ThreadedCapture};
use babble_d::capture::generic::{decode_buffer, device_path, yuyv_to_gray};
use babble_d::capture::ip_camera::{extract_jpeg, normalize_url};
use babble_d::capture::serial::{is_frame_header, jpeg_size, read_framed_jpeg, FRAME_HEADER};
use babble_d::capture::vft::{gamma_lut, process_tracker_frame};
use image::{DynamicImage, GrayImage, Luma};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod serial {
    use super::*;

    /// Header as the board sends it: little-endian, JPEG length in bytes 4 and 5.
    fn header_bytes(size: u16) -> Vec<u8> {
        let [lo, hi] = size.to_le_bytes();
        vec![0xff, 0xa0, 0xff, 0xa1, lo, hi, 0xff, 0xd8]
    }

    #[test]
    fn test_header_matches_any_size() {
        assert!(is_frame_header(FRAME_HEADER));
        let with_size = u64::from_le_bytes(header_bytes(0x1234).try_into().unwrap());
        assert!(is_frame_header(with_size));
        assert_eq!(jpeg_size(with_size), 0x1234);
        assert!(!is_frame_header(with_size ^ 1));
    }

    #[test]
    fn test_reads_frame_after_garbage() {
        let body = [0xe0, 0x00, 0x10, 0xff, 0xd9];
        let mut stream = vec![0x00, 0x12, 0xff, 0xa0, 0x33];
        stream.extend(header_bytes(2 + body.len() as u16));
        stream.extend(body);
        stream.extend([0xaa, 0xbb]);

        let mut cursor = Cursor::new(stream);
        let jpeg = read_framed_jpeg(&mut cursor).expect("frame");
        assert_eq!(jpeg, vec![0xff, 0xd8, 0xe0, 0x00, 0x10, 0xff, 0xd9]);
        assert_eq!(cursor.position() as usize, 5 + 8 + body.len(), "trailing bytes left for the next frame");
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut stream = header_bytes(4);
        stream.extend([0x01, 0x02]);
        stream.extend(header_bytes(3));
        stream.push(0x03);

        let mut cursor = Cursor::new(stream);
        assert_eq!(read_framed_jpeg(&mut cursor).unwrap(), vec![0xff, 0xd8, 0x01, 0x02]);
        assert_eq!(read_framed_jpeg(&mut cursor).unwrap(), vec![0xff, 0xd8, 0x03]);
    }

    #[test]
    fn test_truncated_stream_errors() {
        let mut stream = header_bytes(100);
        stream.extend([0u8; 10]);
        assert!(read_framed_jpeg(&mut Cursor::new(stream)).is_err());
        assert!(read_framed_jpeg(&mut Cursor::new(vec![0u8; 40])).is_err());
    }
}

mod ip_camera {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("openiris.local"), "http://openiris.local");
        assert_eq!(normalize_url(" http://10.0.0.5:81/stream "), "http://10.0.0.5:81/stream");
        assert_eq!(normalize_url("HTTPS://cam"), "HTTPS://cam");
    }

    #[test]
    fn test_extracts_first_complete_frame() {
        let mut buffer = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        buffer.extend([0xff, 0xd8, 0x01, 0x02, 0xff, 0xd9]);
        buffer.extend(b"\r\n--boundary\r\n");
        buffer.extend([0xff, 0xd8, 0x03]);

        let frame = extract_jpeg(&mut buffer).expect("frame");
        assert_eq!(frame, vec![0xff, 0xd8, 0x01, 0x02, 0xff, 0xd9]);
        assert!(buffer.ends_with(&[0xff, 0xd8, 0x03]), "partial frame stays buffered");
        assert!(extract_jpeg(&mut buffer).is_none());
        assert_eq!(buffer, vec![0xff, 0xd8, 0x03]);
    }

    #[test]
    fn test_marker_split_across_chunks() {
        let mut buffer = vec![0x00, 0x11, 0xff];
        assert!(extract_jpeg(&mut buffer).is_none());
        assert_eq!(buffer, vec![0xff]);

        buffer.extend([0xd8, 0x42, 0xff, 0xd9]);
        assert_eq!(extract_jpeg(&mut buffer).unwrap(), vec![0xff, 0xd8, 0x42, 0xff, 0xd9]);
        assert!(buffer.is_empty());
    }
}

mod activation {
    use super::*;

    enum Reply {
        Echo,
        Mismatch,
        Busy,
    }

    struct FakeTransport {
        sent: Vec<Vec<u8>>,
        busy_polls: usize,
        reply: Reply,
        polls: usize,
    }

    impl FakeTransport {
        fn new(reply: Reply) -> Self {
            Self {
                sent: Vec::new(),
                busy_polls: 0,
                reply,
                polls: 0,
            }
        }
    }

    impl ControlTransport for FakeTransport {
        fn set_cur(&mut self, data: &[u8]) -> Result<()> {
            assert_eq!(data.len(), PAYLOAD_LEN);
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn get_cur(&mut self, len: usize) -> Result<Vec<u8>> {
            self.polls += 1;
            let mut response = vec![0u8; len];
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                response[0] = 0x55;
                return Ok(response);
            }
            match self.reply {
                Reply::Busy => response[0] = 0x55,
                Reply::Mismatch => response[0] = 0x56,
                Reply::Echo => {
                    response[0] = 0x56;
                    let last = self.sent.last().cloned().unwrap_or_default();
                    response[1..17].copy_from_slice(&last[..16]);
                }
            }
            Ok(response)
        }
    }

    #[test]
    fn test_payload_layout() {
        let wake = wake_payload();
        assert_eq!(&wake[..2], &[0x51, 0x52]);
        assert_eq!(&wake[254..256], &[0x53, 0x54]);

        assert_eq!(&stream_payload(true)[..4], &[0x50, 0x14, 0x00, 0x01]);
        assert_eq!(stream_payload(false)[3], 0x00);

        let reg = register_payload(0xab, 0x0e, 0xb2);
        assert_eq!(&reg[..5], &[0x50, 0xab, 0x60, 0x01, 0x01]);
        assert_eq!(&reg[5..9], &[0x00, 0x00, 0x00, 0x0e]);
        assert_eq!(&reg[9..13], &[0x90, 0x01, 0x00, 0x01]);
        assert_eq!(&reg[13..17], &[0x00, 0x00, 0x00, 0xb2]);
        assert!(reg[17..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_activation_sequence() {
        let mut activation = FacialTrackerActivation::new(FakeTransport::new(Reply::Echo));
        assert!(activation.activate().unwrap());

        let sent = &activation.transport().sent;
        assert_eq!(sent.len(), 16);
        assert_eq!(sent[0], wake_payload());
        assert_eq!(sent[1], stream_payload(false));
        assert_eq!(sent[2], wake_payload());
        for (i, (addr, value)) in sensor_registers(true).into_iter().enumerate() {
            assert_eq!(sent[3 + i], register_payload(0xab, addr, value), "register {}", i);
        }
        assert_eq!(sent[14], wake_payload());
        assert_eq!(sent[15], stream_payload(true));
    }

    #[test]
    fn test_deactivation_turns_ir_off() {
        let mut activation = FacialTrackerActivation::new(FakeTransport::new(Reply::Echo));
        assert!(activation.deactivate().unwrap());
        let transport = activation.into_transport();
        let ir: Vec<u8> = transport.sent[6..9].iter().map(|p| p[16]).collect();
        assert_eq!(ir, vec![0, 0, 0]);
    }

    #[test]
    fn test_busy_device_is_polled_until_done() {
        let mut transport = FakeTransport::new(Reply::Echo);
        transport.busy_polls = 3;
        let mut activation = FacialTrackerActivation::new(transport);
        assert!(activation.send_command(&wake_payload()).unwrap());
        assert_eq!(activation.transport().polls, 4);
    }

    #[test]
    fn test_mismatched_echo_fails() {
        let mut activation = FacialTrackerActivation::new(FakeTransport::new(Reply::Mismatch));
        assert!(!activation.send_command(&wake_payload()).unwrap());
        assert!(!activation.activate().unwrap());
        assert_eq!(activation.transport().sent.len(), 17, "a failed step does not abort the sequence");
    }

    #[test]
    fn test_unresponsive_device_times_out() {
        let mut activation = FacialTrackerActivation::new(FakeTransport::new(Reply::Busy))
            .with_timeout(Duration::from_millis(20));
        let started = Instant::now();
        assert!(!activation.send_command(&wake_payload()).unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

mod decoding {
    use super::*;

    #[test]
    fn test_yuyv_keeps_luma() {
        let data = [10, 128, 20, 128, 30, 128, 40, 128];
        let gray = yuyv_to_gray(&data, 2, 2).unwrap();
        assert_eq!(gray.into_raw(), vec![10, 20, 30, 40]);
        assert!(yuyv_to_gray(&data[..6], 2, 2).is_none());
    }

    #[test]
    fn test_decode_by_fourcc() {
        let grey = decode_buffer(b"GREY", &[1, 2, 3, 4, 5], 2, 2).unwrap();
        assert_eq!(grey.to_luma8().into_raw(), vec![1, 2, 3, 4]);

        assert!(decode_buffer(b"YUYV", &[0; 8], 2, 2).is_some());
        assert!(decode_buffer(b"GREY", &[0; 3], 2, 2).is_none());
        assert!(decode_buffer(b"MJPG", &[0xff, 0xd8, 0x00], 2, 2).is_none());
        assert!(decode_buffer(b"NV12", &[0; 6], 2, 2).is_none());
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path("0"), "/dev/video0");
        assert_eq!(device_path(" 2 "), "/dev/video2");
        assert_eq!(device_path("/dev/video4"), "/dev/video4");
    }

    #[test]
    fn test_gamma_lut_brightens_and_is_monotonic() {
        let lut = gamma_lut();
        assert_eq!(lut[0], 0);
        assert!(lut[32] > 32, "dark IR values are lifted: {}", lut[32]);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_tracker_frame_uses_left_half() {
        // Left half mid grey, right half black.
        let frame = GrayImage::from_fn(40, 20, |x, _| if x < 20 { Luma([120]) } else { Luma([0]) });
        let identity: [u8; 256] = std::array::from_fn(|i| i as u8);
        let out = process_tracker_frame(&frame, &identity);
        assert_eq!(out.dimensions(), (40, 20));
        assert!(out.get_pixel(35, 10)[0] > 100, "right side now shows the stretched left half");
    }
}

mod threaded {
    use super::*;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        reads: AtomicUsize,
        releases: AtomicUsize,
    }

    struct FakeReader {
        counters: Arc<Counters>,
        fail_open: bool,
        fail_after: Option<usize>,
    }

    impl FrameReader for FakeReader {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn open(&mut self) -> Result<()> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                anyhow::bail!("no such device");
            }
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
            let n = self.counters.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                anyhow::bail!("stream ended");
            }
            thread::sleep(Duration::from_millis(2));
            Ok(Some(DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([(n % 256) as u8])))))
        }

        fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(slot: &FrameSlot) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if slot.is_ready() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_frame_slot() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        slot.store(DynamicImage::ImageLuma8(GrayImage::new(2, 2)));
        slot.store(DynamicImage::ImageLuma8(GrayImage::new(3, 3)));
        assert_eq!(slot.frame_count(), 2);
        assert_eq!(slot.latest().unwrap().width(), 3);
        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_start_publishes_and_stop_releases() {
        let counters = Arc::new(Counters::default());
        let mut capture = ThreadedCapture::new(FakeReader {
            counters: counters.clone(),
            fail_open: false,
            fail_after: None,
        });
        assert!(capture.get_frame(ColorType::Gray8).is_none());

        assert!(capture.start());
        assert!(capture.is_running());
        assert!(capture.start(), "starting twice is a no-op");
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);

        assert!(wait_for(&capture.slot()));
        let frame = capture.get_frame(ColorType::Rgb24).expect("frame");
        assert!(matches!(frame, DynamicImage::ImageRgb8(_)));

        assert!(capture.stop());
        assert!(!capture.is_running());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert!(capture.get_frame(ColorType::Gray8).is_none());
        assert!(!capture.stop(), "already stopped");
    }

    #[test]
    fn test_restart_after_stop() {
        let counters = Arc::new(Counters::default());
        let mut capture = ThreadedCapture::new(FakeReader {
            counters: counters.clone(),
            fail_open: false,
            fail_after: None,
        });
        assert!(capture.start());
        capture.stop();
        assert!(capture.start());
        assert!(wait_for(&capture.slot()));
        drop(capture);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_read_error_stops_capture_and_drops_stale_frame() {
        let counters = Arc::new(Counters::default());
        let mut capture = ThreadedCapture::new(FakeReader {
            counters: counters.clone(),
            fail_open: false,
            fail_after: Some(1),
        });
        assert!(capture.start());

        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.failure().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let reason = capture.failure().expect("failure is reported");
        assert!(reason.contains("stream ended"), "{}", reason);
        assert!(capture.get_frame(ColorType::Gray8).is_none(), "last good frame is not served again");
        assert_eq!(capture.slot().frame_count(), 1);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(counters.reads.load(Ordering::SeqCst), 2, "no retries after a fatal read");

        assert!(capture.stop());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    /// Like a camera that is open but never delivers: every read times out.
    struct SilentReader;

    impl FrameReader for SilentReader {
        fn name(&self) -> &'static str {
            "silent"
        }

        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
            thread::sleep(Duration::from_millis(50));
            Ok(None)
        }

        fn release(&mut self) {}
    }

    #[test]
    fn test_stop_returns_while_device_is_silent() {
        let mut capture = ThreadedCapture::new(SilentReader);
        assert!(capture.start());
        thread::sleep(Duration::from_millis(120));
        assert!(capture.get_frame(ColorType::Gray8).is_none());
        assert!(capture.failure().is_none(), "timeouts are not failures");

        let begin = Instant::now();
        assert!(capture.stop());
        assert!(begin.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_failed_open() {
        let counters = Arc::new(Counters::default());
        let mut capture = ThreadedCapture::new(FakeReader {
            counters: counters.clone(),
            fail_open: true,
            fail_after: None,
        });
        assert!(!capture.start());
        assert!(!capture.is_running());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(counters.reads.load(Ordering::SeqCst), 0);

        assert!(!capture.start(), "reader is kept for another attempt");
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
    }
}

mod backends {
    use super::*;

    #[test]
    fn test_create_capture_picks_backend() {
        for (kind, address) in [
            (CaptureKind::Serial, "COM9"),
            (CaptureKind::IpCamera, "http://127.0.0.1:1/"),
            (CaptureKind::Generic, "/dev/video42"),
            (CaptureKind::Vft, "/dev/video43"),
        ] {
            let mut backend = create_capture(kind, address);
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.frame_count(), 0);
            assert!(backend.get_frame(ColorType::Gray8).is_none(), "nothing captured before start");
            assert!(backend.failure().is_none());
            assert!(!backend.stop(), "never started");
        }
    }
}
