pub mod receiver;
pub mod sender;

pub use receiver::{flatten_packet, OscReceiver};
pub use sender::OscSender;

use log::warn;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::RwLock;

/// Where parameters go and where replies come in, plus the state of both sockets.
#[derive(Debug)]
pub struct OscTarget {
    endpoint: RwLock<Option<SocketAddr>>,
    in_port: AtomicU16,
    out_port: AtomicU16,
    connected: AtomicBool,
    listening: AtomicBool,
}

impl OscTarget {
    pub fn new() -> Self {
        Self {
            endpoint: RwLock::new(None),
            in_port: AtomicU16::new(0),
            out_port: AtomicU16::new(0),
            connected: AtomicBool::new(false),
            listening: AtomicBool::new(false),
        }
    }

    /// Resolves `host:port`. Leaves the previous endpoint in place when resolution fails.
    pub fn resolve(&self, host: &str, port: u16) -> Option<SocketAddr> {
        self.out_port.store(port, Ordering::Release);
        let resolved = (host, port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.find(|a| a.is_ipv4()));
        match resolved {
            Some(addr) => {
                *self.endpoint.write().unwrap_or_else(|e| e.into_inner()) = Some(addr);
                Some(addr)
            }
            None => {
                warn!("Could not resolve OSC endpoint {}:{}", host, port);
                None
            }
        }
    }

    pub fn endpoint(&self) -> Option<SocketAddr> {
        *self.endpoint.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn out_port(&self) -> u16 {
        self.out_port.load(Ordering::Acquire)
    }

    /// Port the receiver binds to. `0` lets the OS pick.
    pub fn in_port(&self) -> u16 {
        self.in_port.load(Ordering::Acquire)
    }

    pub fn set_in_port(&self, port: u16) {
        self.in_port.store(port, Ordering::Release);
    }

    /// The outgoing socket is bound and connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// An `OscReceiver` is bound to `in_port`.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub(crate) fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Release);
    }
}

impl Default for OscTarget {
    fn default() -> Self {
        Self::new()
    }
}
