pub mod activation;
pub mod frame_slot;
pub mod generic;
pub mod ip_camera;
pub mod serial;
pub mod vft;

use api::{CaptureKind, ColorType, VideoSource};
use frame_slot::ThreadedCapture;
use generic::GenericReader;
use image::DynamicImage;
use ip_camera::IpCameraReader;
use log::info;
use serial::SerialReader;
use vft::VftReader;

pub enum CaptureBackend {
    Generic(ThreadedCapture<GenericReader>),
    IpCamera(ThreadedCapture<IpCameraReader>),
    Vft(ThreadedCapture<VftReader>),
    Serial(ThreadedCapture<SerialReader>),
}

impl CaptureBackend {
    pub fn kind(&self) -> CaptureKind {
        match self {
            Self::Generic(_) => CaptureKind::Generic,
            Self::IpCamera(_) => CaptureKind::IpCamera,
            Self::Vft(_) => CaptureKind::Vft,
            Self::Serial(_) => CaptureKind::Serial,
        }
    }

    pub fn frame_count(&self) -> u64 {
        match self {
            Self::Generic(c) => c.slot().frame_count(),
            Self::IpCamera(c) => c.slot().frame_count(),
            Self::Vft(c) => c.slot().frame_count(),
            Self::Serial(c) => c.slot().frame_count(),
        }
    }
}

impl VideoSource for CaptureBackend {
    fn start(&mut self) -> bool {
        match self {
            Self::Generic(c) => c.start(),
            Self::IpCamera(c) => c.start(),
            Self::Vft(c) => c.start(),
            Self::Serial(c) => c.start(),
        }
    }

    fn stop(&mut self) -> bool {
        match self {
            Self::Generic(c) => c.stop(),
            Self::IpCamera(c) => c.stop(),
            Self::Vft(c) => c.stop(),
            Self::Serial(c) => c.stop(),
        }
    }

    fn get_frame(&mut self, color: ColorType) -> Option<DynamicImage> {
        match self {
            Self::Generic(c) => c.get_frame(color),
            Self::IpCamera(c) => c.get_frame(color),
            Self::Vft(c) => c.get_frame(color),
            Self::Serial(c) => c.get_frame(color),
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Self::Generic(c) => c.failure(),
            Self::IpCamera(c) => c.failure(),
            Self::Vft(c) => c.failure(),
            Self::Serial(c) => c.failure(),
        }
    }
}

pub fn create_capture(kind: CaptureKind, address: &str) -> CaptureBackend {
    info!("Creating {:?} capture for {}", kind, address);
    match kind {
        CaptureKind::Generic => CaptureBackend::Generic(ThreadedCapture::new(GenericReader::new(address))),
        CaptureKind::IpCamera => {
            CaptureBackend::IpCamera(ThreadedCapture::new(IpCameraReader::new(address)))
        }
        CaptureKind::Vft => CaptureBackend::Vft(ThreadedCapture::new(VftReader::new(address))),
        CaptureKind::Serial => CaptureBackend::Serial(ThreadedCapture::new(SerialReader::new(address))),
    }
}
