use super::frame_slot::FrameReader;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use log::{debug, info};
use std::io::{ErrorKind, Read};
use std::time::Duration;

const JPEG_MARKER: u8 = 0xff;
const JPEG_START: u8 = 0xd8;
const JPEG_END: u8 = 0xd9;

const CHUNK_SIZE: usize = 1024;
/// A frame larger than this means the stream lost sync; drop what we have.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Bare mDNS hosts like `openiris.local` get an http scheme.
pub fn normalize_url(address: &str) -> String {
    let trimmed = address.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn find_marker(buffer: &[u8], from: usize, marker: u8) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|w| w[0] == JPEG_MARKER && w[1] == marker)
        .map(|pos| pos + from)
}

/// Pulls the first complete `FFD8 .. FFD9` span out of `buffer`, discarding
/// everything before it. Bytes of an unfinished frame stay buffered.
pub fn extract_jpeg(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let Some(start) = find_marker(buffer, 0, JPEG_START) else {
        // Keep a trailing marker byte, it may pair with the next chunk.
        let keep = usize::from(buffer.last() == Some(&JPEG_MARKER));
        let len = buffer.len();
        buffer.drain(..len - keep);
        return None;
    };
    buffer.drain(..start);

    let end = find_marker(buffer, 2, JPEG_END)?;
    let frame: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(frame)
}

/// MJPEG-over-HTTP stream, as served by ESP32 boards and most IP cameras.
pub struct IpCameraReader {
    url: String,
    stream: Option<Box<dyn Read + Send + Sync>>,
    buffer: Vec<u8>,
}

impl IpCameraReader {
    pub fn new(address: &str) -> Self {
        Self {
            url: normalize_url(address),
            stream: None,
            buffer: Vec::with_capacity(CHUNK_SIZE * 64),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameReader for IpCameraReader {
    fn name(&self) -> &'static str {
        "ip-camera"
    }

    fn open(&mut self) -> Result<()> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        let response = agent
            .get(&self.url)
            .call()
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        info!(
            "Connected to IP camera {} ({})",
            self.url,
            response.content_type()
        );
        self.stream = Some(response.into_reader());
        self.buffer.clear();
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("IP camera stream not open"))?;

        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            if let Some(jpeg) = extract_jpeg(&mut self.buffer) {
                match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        debug!("Skipping undecodable MJPEG frame: {}", e);
                        continue;
                    }
                }
            }

            if self.buffer.len() > MAX_FRAME_BYTES {
                debug!("MJPEG buffer overflow, resyncing");
                self.buffer.clear();
            }

            let read = match stream.read(&mut chunk) {
                Ok(0) => anyhow::bail!("IP camera stream ended"),
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None)
                }
                Err(e) => return Err(e).context("IP camera read failed"),
            };
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("Disconnected from IP camera {}", self.url);
        }
        self.buffer.clear();
    }
}
