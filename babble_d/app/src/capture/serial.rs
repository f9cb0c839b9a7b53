use super::frame_slot::FrameReader;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::time::Duration;

pub const BAUD_RATE: u32 = 3_000_000;
pub const FRAME_HEADER: u64 = 0xd8ff_0000_a1ff_a0ff;
pub const FRAME_HEADER_MASK: u64 = 0xffff_0000_ffff_ffff;
const READ_TIMEOUT: Duration = Duration::from_millis(1000);

pub fn is_frame_header(window: u64) -> bool {
    window & FRAME_HEADER_MASK == FRAME_HEADER
}

/// The JPEG length sits in the two unmasked bytes of the header.
pub fn jpeg_size(header: u64) -> u16 {
    (header >> (!FRAME_HEADER_MASK).trailing_zeros()) as u16
}

/// Reads one framed JPEG from `reader`. The 8-byte window slides one byte at a time
/// until it matches the board's header, whose last two bytes double as the JPEG SOI.
pub fn read_framed_jpeg<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    let mut header = u64::from_le_bytes(bytes);

    let mut next = [0u8; 1];
    while !is_frame_header(header) {
        reader.read_exact(&mut next)?;
        header = (header >> 8) | ((next[0] as u64) << 56);
    }

    let size = (jpeg_size(header) as usize).max(2);
    let mut jpeg = vec![0u8; size];
    jpeg[0] = 0xff;
    jpeg[1] = 0xd8;
    reader.read_exact(&mut jpeg[2..])?;
    Ok(jpeg)
}

/// Babble board streaming JPEG frames over USB serial.
pub struct SerialReader {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialReader {
    pub fn new(port_name: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            port: None,
        }
    }
}

impl FrameReader for SerialReader {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open serial port {}", self.port_name))?;
        info!("Opened serial camera on {} at {} baud", self.port_name, BAUD_RATE);
        self.port = Some(port);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Serial port not open"))?;

        let jpeg = match read_framed_jpeg(port.as_mut()) {
            Ok(jpeg) => jpeg,
            Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(e).context("Serial read failed"),
        };

        match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
            Ok(frame) if frame.width() > 0 && frame.height() > 0 => Ok(Some(frame)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("Dropping undecodable serial frame ({} bytes): {}", jpeg.len(), e);
                Ok(None)
            }
        }
    }

    fn release(&mut self) {
        if self.port.take().is_some() {
            info!("Closed serial camera on {}", self.port_name);
        }
    }
}
