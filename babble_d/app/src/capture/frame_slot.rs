use anyhow::Result;
use api::{convert_color, ColorType};
use image::DynamicImage;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Latest completed frame of one capture. Written only by the capture thread.
#[derive(Default)]
pub struct FrameSlot {
    frame: Mutex<Option<DynamicImage>>,
    ready: AtomicBool,
    counter: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, image: DynamicImage) {
        let mut guard = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(image);
        drop(guard);
        self.counter.fetch_add(1, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
    }

    /// Copy of the most recent frame, or `None` if nothing was ever stored.
    pub fn latest(&self) -> Option<DynamicImage> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        self.frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn frame_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Drops the last frame so nobody keeps consuming it, and records why.
    pub fn fail(&self, reason: String) {
        self.clear();
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reset_failure(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// A device that can be polled for frames from a background thread.
pub trait FrameReader: Send + 'static {
    fn name(&self) -> &'static str;
    /// Opens the device. Called on the caller's thread by `start`.
    fn open(&mut self) -> Result<()>;
    /// Blocks for the next frame. `Ok(None)` means nothing arrived before a timeout.
    /// An error is fatal: the capture loop stops and the slot is marked failed.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>>;
    /// Releases the device. Called after the capture thread has been joined.
    fn release(&mut self);
}

/// Runs a `FrameReader` on its own thread, publishing into a `FrameSlot`.
pub struct ThreadedCapture<R: FrameReader> {
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    reader: Option<R>,
    handle: Option<JoinHandle<R>>,
}

impl<R: FrameReader> ThreadedCapture<R> {
    pub fn new(reader: R) -> Self {
        Self {
            slot: Arc::new(FrameSlot::new()),
            running: Arc::new(AtomicBool::new(false)),
            reader: Some(reader),
            handle: None,
        }
    }

    pub fn slot(&self) -> Arc<FrameSlot> {
        self.slot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self) -> bool {
        if self.handle.is_some() {
            return true;
        }
        let Some(mut reader) = self.reader.take() else {
            error!("Capture reader missing, cannot start");
            return false;
        };

        let name = reader.name();
        if let Err(e) = reader.open() {
            error!("Failed to open {} capture: {:#}", name, e);
            reader.release();
            self.reader = Some(reader);
            return false;
        }

        self.slot.reset_failure();
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let slot = self.slot.clone();

        let spawned = thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || {
                info!("{} capture loop started", name);
                while running.load(Ordering::SeqCst) {
                    match reader.read_frame() {
                        Ok(Some(frame)) => slot.store(frame),
                        Ok(None) => {}
                        Err(e) => {
                            error!("{} capture failed, stopping: {:#}", name, e);
                            slot.fail(format!("{} capture: {:#}", name, e));
                            break;
                        }
                    }
                }
                debug!("{} capture loop exiting", name);
                reader
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                error!("Failed to spawn {} capture thread: {}", name, e);
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Cancels the loop, joins the thread, then releases the device.
    pub fn stop(&mut self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return false;
        };

        match handle.join() {
            Ok(mut reader) => {
                reader.release();
                self.reader = Some(reader);
            }
            Err(_) => error!("Capture thread panicked; device handle dropped with it"),
        }
        self.slot.clear();
        true
    }

    pub fn get_frame(&self, color: ColorType) -> Option<DynamicImage> {
        self.slot.latest().map(|frame| convert_color(frame, color))
    }

    /// Set once the capture loop has given up on the device.
    pub fn failure(&self) -> Option<String> {
        self.slot.failure()
    }
}

impl<R: FrameReader> Drop for ThreadedCapture<R> {
    fn drop(&mut self) {
        self.stop();
    }
}
