use super::frame_slot::FrameReader;
use anyhow::Result;
use image::{DynamicImage, GrayImage};

/// Packed YUYV (Y0 U Y1 V) to its luma plane.
pub fn yuyv_to_gray(data: &[u8], width: u32, height: u32) -> Option<GrayImage> {
    let pixels = (width as usize) * (height as usize);
    if data.len() < pixels * 2 {
        return None;
    }
    let luma: Vec<u8> = data.iter().step_by(2).take(pixels).copied().collect();
    GrayImage::from_raw(width, height, luma)
}

/// Turns one driver buffer into an image according to its pixel format.
pub fn decode_buffer(fourcc: &[u8; 4], data: &[u8], width: u32, height: u32) -> Option<DynamicImage> {
    match fourcc {
        b"YUYV" => yuyv_to_gray(data, width, height).map(DynamicImage::ImageLuma8),
        b"GREY" => GrayImage::from_raw(width, height, data.get(..(width * height) as usize)?.to_vec())
            .map(DynamicImage::ImageLuma8),
        b"MJPG" | b"JPEG" => image::load_from_memory_with_format(data, image::ImageFormat::Jpeg).ok(),
        _ => None,
    }
}

/// Any V4L2 webcam, using whatever format the driver is already set to.
pub struct GenericReader {
    path: String,
    #[cfg(target_os = "linux")]
    device: Option<v4l_device::V4lStream>,
}

impl GenericReader {
    pub fn new(address: &str) -> Self {
        Self {
            path: device_path(address),
            #[cfg(target_os = "linux")]
            device: None,
        }
    }
}

/// Bare camera indices like `0` map to `/dev/video0`.
pub fn device_path(address: &str) -> String {
    let trimmed = address.trim();
    match trimmed.parse::<u32>() {
        Ok(index) => format!("/dev/video{}", index),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(target_os = "linux")]
impl FrameReader for GenericReader {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn open(&mut self) -> Result<()> {
        self.device = Some(v4l_device::V4lStream::open(&self.path, None)?);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Camera {} not open", self.path))?;
        let (fourcc, width, height) = device.format();
        let Some(data) = device.next_buffer()? else {
            return Ok(None);
        };
        Ok(decode_buffer(&fourcc, data, width, height))
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl FrameReader for GenericReader {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn open(&mut self) -> Result<()> {
        anyhow::bail!("V4L2 capture of {} is only available on Linux", self.path)
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        Ok(None)
    }

    fn release(&mut self) {}
}

#[cfg(target_os = "linux")]
pub(crate) mod v4l_device {
    use anyhow::{Context, Result};
    use log::{debug, info, warn};
    use std::io::ErrorKind;
    use std::time::Duration;
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::{CaptureStream, Stream as _};
    use v4l::video::Capture;
    use v4l::{Device, Format};

    const BUFFER_COUNT: u32 = 4;
    /// Bounds how long a stalled camera can hold up `stop`.
    pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

    /// Memory-mapped capture stream on one V4L2 node.
    pub struct V4lStream {
        path: String,
        stream: Stream<'static>,
        format: Format,
        restart: bool,
        // Keeps the node open for as long as the stream is mapped.
        _device: Device,
    }

    impl V4lStream {
        /// Opens `path`, optionally forcing `requested` before mapping buffers.
        pub fn open(path: &str, requested: Option<Format>) -> Result<Self> {
            let device =
                Device::with_path(path).with_context(|| format!("Failed to open camera {}", path))?;

            let format = match requested {
                Some(requested) => {
                    let applied = device
                        .set_format(&requested)
                        .with_context(|| format!("Failed to set format on {}", path))?;
                    if applied.fourcc != requested.fourcc {
                        warn!(
                            "{} ignored requested format {}, using {}",
                            path, requested.fourcc, applied.fourcc
                        );
                    }
                    applied
                }
                None => device
                    .format()
                    .with_context(|| format!("Failed to query format on {}", path))?,
            };

            let mut stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .with_context(|| format!("Failed to map capture buffers on {}", path))?;
            stream.set_timeout(DEQUEUE_TIMEOUT);

            info!(
                "Opened {} at {}x{} ({})",
                path,
                format.width,
                format.height,
                format.fourcc.to_string().trim()
            );

            Ok(Self {
                path: path.to_string(),
                stream,
                format,
                restart: false,
                _device: device,
            })
        }

        pub fn format(&self) -> ([u8; 4], u32, u32) {
            (self.format.fourcc.repr, self.format.width, self.format.height)
        }

        /// Next filled buffer, or `None` when the camera sent nothing within `DEQUEUE_TIMEOUT`.
        /// Streaming starts on the first call, with every buffer queued.
        pub fn next_buffer(&mut self) -> Result<Option<&[u8]>> {
            if self.restart {
                // The timed out buffer is still queued; STREAMOFF hands every buffer back
                // so the next call can queue them all again.
                self.restart = false;
                self.stream
                    .stop()
                    .with_context(|| format!("Failed to reset stream on {}", self.path))?;
            }
            match self.stream.next() {
                Ok((data, _meta)) => Ok(Some(data)),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    debug!("No frame from {} within {:?}", self.path, DEQUEUE_TIMEOUT);
                    self.restart = true;
                    Ok(None)
                }
                Err(e) => Err(e).with_context(|| format!("Failed to dequeue frame from {}", self.path)),
            }
        }

        pub fn stop(&mut self) {
            if let Err(e) = self.stream.stop() {
                warn!("Failed to stop stream on {}: {}", self.path, e);
            }
        }
    }
}
