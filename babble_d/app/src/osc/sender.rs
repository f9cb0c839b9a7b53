use super::OscTarget;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rosc::{encoder, OscBundle, OscMessage, OscPacket};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;

/// Sends message batches as single OSC bundles to an `OscTarget`.
pub struct OscSender {
    socket: Option<UdpSocket>,
    target: Arc<OscTarget>,
    enabled: bool,
    bind_failures: u64,
}

/// Re-bind failures are logged on the first occurrence and then every this many.
const BIND_FAILURE_LOG_INTERVAL: u64 = 1000;

impl OscSender {
    pub fn new(target: Arc<OscTarget>) -> Self {
        Self {
            socket: None,
            target,
            enabled: false,
            bind_failures: 0,
        }
    }

    pub fn target(&self) -> &Arc<OscTarget> {
        &self.target
    }

    fn bind(&mut self) -> Result<()> {
        let endpoint = self
            .target
            .endpoint()
            .ok_or_else(|| anyhow::anyhow!("OSC target has no resolved endpoint"))?;
        // Bind to 0.0.0.0:0 to let OS pick a port
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind UDP socket")?;
        socket
            .connect(endpoint)
            .with_context(|| format!("Failed to connect to {}", endpoint))?;
        socket
            .set_nonblocking(true)
            .context("Failed to set non-blocking mode")?;
        self.socket = Some(socket);
        self.target.set_connected(true);
        Ok(())
    }

    pub fn connect(&mut self) -> Result<()> {
        self.enabled = true;
        if let Err(e) = self.bind() {
            self.target.set_connected(false);
            return Err(e);
        }
        if let Some(endpoint) = self.target.endpoint() {
            info!("OSC sender connected to {}", endpoint);
        }
        Ok(())
    }

    /// Drops the socket. Batches are discarded until `connect` is called again.
    pub fn disconnect(&mut self) {
        self.enabled = false;
        self.socket = None;
        self.target.set_connected(false);
    }

    pub fn is_connected(&self) -> bool {
        self.enabled && self.socket.is_some()
    }

    /// Sends `messages` as one bundle. Returns `Ok(false)` when the batch was dropped
    /// because the sender is disconnected or has no usable socket.
    pub fn send_bundle(&mut self, messages: Vec<OscMessage>) -> Result<bool> {
        if messages.is_empty() {
            return Ok(true);
        }
        if !self.enabled {
            debug!("OSC sender disconnected, dropping {} messages", messages.len());
            return Ok(false);
        }

        if self.socket.is_none() {
            if self.target.endpoint().is_none() {
                debug!("OSC target unresolved, dropping {} messages", messages.len());
                return Ok(false);
            }
            match self.bind() {
                Ok(()) => {
                    info!("Re-bound OSC socket successfully.");
                    self.bind_failures = 0;
                }
                Err(e) => {
                    self.target.set_connected(false);
                    if self.bind_failures % BIND_FAILURE_LOG_INTERVAL == 0 {
                        warn!(
                            "Failed to re-bind OSC socket ({} attempts): {:#}",
                            self.bind_failures + 1,
                            e
                        );
                    }
                    self.bind_failures += 1;
                    return Ok(false);
                }
            }
        }

        let bundle = OscBundle {
            timetag: rosc::OscTime::from((0, 0)),
            content: messages.into_iter().map(OscPacket::Message).collect(),
        };
        let buf = encoder::encode(&OscPacket::Bundle(bundle))?;

        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("OSC socket not available"))?;

        match socket.send(&buf) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                debug!("OSC socket busy, dropping batch");
                Ok(false)
            }
            Err(e) => {
                error!("Failed to send OSC packet: {}. Will re-bind on next send", e);
                self.socket = None;
                self.target.set_connected(false);
                Err(anyhow::anyhow!("OSC send failed: {}", e))
            }
        }
    }
}
