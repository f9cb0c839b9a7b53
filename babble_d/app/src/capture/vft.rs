use super::frame_slot::FrameReader;
use anyhow::Result;
use image::{imageops, DynamicImage, GrayImage};

pub const SENSOR_SIZE: u32 = 400;
/// Matches a 15x15 OpenCV kernel with sigma derived from its size.
pub const BLUR_SIGMA: f32 = 2.6;

/// Gamma curve the tracker's dark IR output needs to be usable.
pub fn gamma_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = ((i as f64 / 2048.0).powf(1.0 / 2.5) * 255.0) as u8;
    }
    lut
}

/// Only the left half of the sensor carries the image; it is stretched back to
/// full width, softened, then brightened through `lut`.
pub fn process_tracker_frame(luma: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let (width, height) = luma.dimensions();
    let half = imageops::crop_imm(luma, 0, 0, (width / 2).max(1), height).to_image();
    let stretched = imageops::resize(&half, width, height, imageops::FilterType::Triangle);
    let mut blurred = imageops::blur(&stretched, BLUR_SIGMA);
    for pixel in blurred.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    blurred
}

/// Vive Facial Tracker: V4L2 YUYV stream that must be woken over UVC first.
pub struct VftReader {
    path: String,
    lut: [u8; 256],
    #[cfg(target_os = "linux")]
    device: Option<super::generic::v4l_device::V4lStream>,
}

impl VftReader {
    pub fn new(address: &str) -> Self {
        Self {
            path: super::generic::device_path(address),
            lut: gamma_lut(),
            #[cfg(target_os = "linux")]
            device: None,
        }
    }

    #[cfg(target_os = "linux")]
    fn set_tracker_state(&self, active: bool) {
        use super::activation::{DeviceActivation, FacialTrackerActivation, UvcExtensionUnit};
        use log::{info, warn};

        let result = UvcExtensionUnit::open(&self.path).and_then(|unit| {
            let mut tracker = FacialTrackerActivation::new(unit);
            if active {
                tracker.activate()
            } else {
                tracker.deactivate()
            }
        });
        match result {
            Ok(true) => info!(
                "Tracker {} {}",
                self.path,
                if active { "activated" } else { "deactivated" }
            ),
            Ok(false) => warn!("Tracker {} did not acknowledge every command", self.path),
            Err(e) => warn!("Tracker {} state change failed: {:#}", self.path, e),
        }
    }
}

#[cfg(target_os = "linux")]
impl FrameReader for VftReader {
    fn name(&self) -> &'static str {
        "vft"
    }

    fn open(&mut self) -> Result<()> {
        use v4l::{FourCC, Format};

        self.set_tracker_state(true);
        let format = Format::new(SENSOR_SIZE, SENSOR_SIZE, FourCC::new(b"YUYV"));
        self.device = Some(super::generic::v4l_device::V4lStream::open(&self.path, Some(format))?);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Tracker {} not open", self.path))?;
        let (_, width, height) = device.format();
        let Some(data) = device.next_buffer()? else {
            return Ok(None);
        };
        let Some(luma) = super::generic::yuyv_to_gray(data, width, height) else {
            return Ok(None);
        };
        Ok(Some(DynamicImage::ImageLuma8(process_tracker_frame(&luma, &self.lut))))
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
            drop(device);
            self.set_tracker_state(false);
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl FrameReader for VftReader {
    fn name(&self) -> &'static str {
        "vft"
    }

    fn open(&mut self) -> Result<()> {
        anyhow::bail!("Vive Facial Tracker capture of {} is only available on Linux", self.path)
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let _ = &self.lut;
        Ok(None)
    }

    fn release(&mut self) {}
}
