//! Wake-up protocol for the Vive Facial Tracker, spoken over the camera's UVC
//! extension unit. The camera streams nothing useful until its IR emitters are on.

use anyhow::Result;
use log::{debug, warn};
use std::time::{Duration, Instant};

pub const PAYLOAD_LEN: usize = 384;
pub const EXTENSION_UNIT: u8 = 4;
pub const SELECTOR: u8 = 2;

const TASK_SET: u8 = 0x50;
const REG_SENSOR: u8 = 0xab;
const STATUS_BUSY: u8 = 0x55;
const STATUS_DONE: u8 = 0x56;
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Raw SET_CUR / GET_CUR access to the extension unit.
pub trait ControlTransport {
    fn set_cur(&mut self, data: &[u8]) -> Result<()>;
    fn get_cur(&mut self, len: usize) -> Result<Vec<u8>>;
}

/// Something that must be switched on before it streams.
pub trait DeviceActivation {
    fn activate(&mut self) -> Result<bool>;
    fn deactivate(&mut self) -> Result<bool>;
}

pub fn wake_payload() -> Vec<u8> {
    let mut data = vec![0u8; PAYLOAD_LEN];
    data[0] = 0x51;
    data[1] = 0x52;
    data[254] = 0x53;
    data[255] = 0x54;
    data
}

pub fn stream_payload(enable: bool) -> Vec<u8> {
    let mut data = vec![0u8; PAYLOAD_LEN];
    data[0] = TASK_SET;
    data[1] = 0x14;
    data[2] = 0x00;
    data[3] = u8::from(enable);
    data[254] = 0x53;
    data[255] = 0x54;
    data
}

pub fn register_payload(reg: u8, addr: u32, value: u32) -> Vec<u8> {
    let mut data = vec![0u8; PAYLOAD_LEN];
    data[0] = TASK_SET;
    data[1] = reg;
    data[2] = 0x60;
    data[3] = 1; // address length
    data[4] = 1; // value length
    data[5..9].copy_from_slice(&addr.to_be_bytes());
    data[9..13].copy_from_slice(&[0x90, 0x01, 0x00, 0x01]);
    data[13..17].copy_from_slice(&value.to_be_bytes());
    data
}

/// Sensor registers written during activation. 0x02..=0x04 drive IR intensity.
pub fn sensor_registers(ir_on: bool) -> [(u32, u32); 11] {
    let ir = if ir_on { 0xff } else { 0x00 };
    [
        (0x00, 0x40),
        (0x08, 0x01),
        (0x70, 0x00),
        (0x02, ir),
        (0x03, ir),
        (0x04, ir),
        (0x0e, 0x00),
        (0x05, 0xb2),
        (0x06, 0xb2),
        (0x07, 0xb2),
        (0x0f, 0x03),
    ]
}

/// Drives the tracker's command handshake over any `ControlTransport`.
pub struct FacialTrackerActivation<T: ControlTransport> {
    transport: T,
    timeout: Duration,
}

impl<T: ControlTransport> FacialTrackerActivation<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: RESPONSE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends a command and polls until the device echoes its first 16 bytes back.
    pub fn send_command(&mut self, data: &[u8]) -> Result<bool> {
        self.transport.set_cur(data)?;

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            let response = self.transport.get_cur(PAYLOAD_LEN)?;
            match response.first() {
                Some(&STATUS_BUSY) => continue,
                Some(&STATUS_DONE) => {
                    let echoed = response.len() >= 17 && data.len() >= 16 && data[..16] == response[1..17];
                    return Ok(echoed);
                }
                other => {
                    debug!("Unexpected tracker status {:?}", other);
                    return Ok(false);
                }
            }
        }
        warn!("Tracker did not answer within {:?}", self.timeout);
        Ok(false)
    }

    fn run_sequence(&mut self, ir_on: bool) -> Result<bool> {
        let wake = wake_payload();
        let mut ok = true;

        ok &= self.send_command(&wake)?;
        ok &= self.send_command(&stream_payload(false))?;
        ok &= self.send_command(&wake)?;
        for (addr, value) in sensor_registers(ir_on) {
            ok &= self.send_command(&register_payload(REG_SENSOR, addr, value))?;
        }
        ok &= self.send_command(&wake)?;
        ok &= self.send_command(&stream_payload(true))?;
        Ok(ok)
    }
}

impl<T: ControlTransport> DeviceActivation for FacialTrackerActivation<T> {
    fn activate(&mut self) -> Result<bool> {
        self.run_sequence(true)
    }

    fn deactivate(&mut self) -> Result<bool> {
        self.run_sequence(false)
    }
}

#[cfg(target_os = "linux")]
pub use linux::UvcExtensionUnit;

#[cfg(target_os = "linux")]
mod linux {
    use super::{ControlTransport, EXTENSION_UNIT, SELECTOR};
    use anyhow::{Context, Result};
    use std::fs::{File, OpenOptions};
    use std::os::fd::AsRawFd;
    use std::path::Path;

    const UVC_SET_CUR: u8 = 0x01;
    const UVC_GET_CUR: u8 = 0x81;

    #[repr(C)]
    struct UvcXuControlQuery {
        unit: u8,
        selector: u8,
        query: u8,
        size: u16,
        data: *mut u8,
    }

    const IOC_READ_WRITE: u64 = 3;
    const UVCIOC_CTRL_QUERY: u64 = (IOC_READ_WRITE << 30)
        | ((std::mem::size_of::<UvcXuControlQuery>() as u64) << 16)
        | ((b'u' as u64) << 8)
        | 0x21;

    /// `/dev/videoN` opened read-write for extension unit queries.
    pub struct UvcExtensionUnit {
        file: File,
    }

    impl UvcExtensionUnit {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("Failed to open {:?} for UVC control", path))?;
            Ok(Self { file })
        }

        fn query(&mut self, query: u8, data: &mut [u8]) -> Result<()> {
            let mut request = UvcXuControlQuery {
                unit: EXTENSION_UNIT,
                selector: SELECTOR,
                query,
                size: data.len() as u16,
                data: data.as_mut_ptr(),
            };
            // SAFETY: `request` points at `data`, which outlives the call and is `size` bytes long.
            let rc = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    UVCIOC_CTRL_QUERY as _,
                    &mut request as *mut UvcXuControlQuery,
                )
            };
            if rc != 0 {
                return Err(std::io::Error::last_os_error()).context("UVC extension unit query failed");
            }
            Ok(())
        }
    }

    impl ControlTransport for UvcExtensionUnit {
        fn set_cur(&mut self, data: &[u8]) -> Result<()> {
            let mut buffer = data.to_vec();
            self.query(UVC_SET_CUR, &mut buffer)
        }

        fn get_cur(&mut self, len: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; len];
            self.query(UVC_GET_CUR, &mut buffer)?;
            Ok(buffer)
        }
    }
}
