use super::OscTarget;
use anyhow::{Context, Result};
use log::{error, info};
use rosc::{decoder, OscMessage, OscPacket};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Appends every message in `packet` to `out`, descending into nested bundles.
pub fn flatten_packet(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                flatten_packet(packet, out);
            }
        }
    }
}

/// Listens on a UDP port and hands each decoded message to a callback.
pub struct OscReceiver {
    local_addr: SocketAddr,
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    target: Option<Arc<OscTarget>>,
}

impl OscReceiver {
    /// Binds `target`'s in port and flags the target as listening until stopped.
    pub fn listen<F>(target: Arc<OscTarget>, on_message: F) -> Result<Self>
    where
        F: FnMut(OscMessage) + Send + 'static,
    {
        let result = Self::start(target.in_port(), on_message);
        target.set_listening(result.is_ok());
        let mut receiver = result?;
        receiver.target = Some(target);
        Ok(receiver)
    }

    pub fn start<F>(port: u16, mut on_message: F) -> Result<Self>
    where
        F: FnMut(OscMessage) + Send + 'static,
    {
        let socket = UdpSocket::bind(format!("0.0.0.0:{}", port))
            .with_context(|| format!("Failed to bind OSC receiver on port {}", port))?;
        // Timeout lets the loop notice the shutdown flag.
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown = shutdown_flag.clone();

        let handle = thread::Builder::new()
            .name("osc-receiver".to_string())
            .spawn(move || {
                info!("Listening for OSC messages on {}", local_addr);
                let mut buf = [0u8; rosc::decoder::MTU];
                let mut messages = Vec::new();
                while !shutdown.load(Ordering::Relaxed) {
                    match socket.recv_from(&mut buf) {
                        Ok((size, _addr)) => {
                            if let Ok((_, packet)) = decoder::decode_udp(&buf[..size]) {
                                flatten_packet(packet, &mut messages);
                                for msg in messages.drain(..) {
                                    on_message(msg);
                                }
                            }
                        }
                        Err(ref e)
                            if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => {
                            error!("Error receiving OSC packet: {}", e);
                            thread::sleep(ERROR_BACKOFF);
                        }
                    }
                }
                info!("OSC listener thread exiting gracefully");
            })
            .context("Failed to spawn OSC receiver thread")?;

        Ok(Self {
            local_addr,
            shutdown_flag,
            handle: Some(handle),
            target: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("OSC receiver thread panicked");
            }
        }
        if let Some(target) = &self.target {
            target.set_listening(false);
        }
    }
}

impl Drop for OscReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}
