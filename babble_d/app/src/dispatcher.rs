use crate::osc::OscSender;
use api::{EyeExpressions, FaceExpressions};
use common::CalibrationManager;
use log::{error, trace};
use rosc::{OscMessage, OscType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Remaps pipeline output through calibration and batches it for the next flush.
pub struct ParameterDispatcher {
    calibration: Arc<CalibrationManager>,
    sender: Mutex<OscSender>,
    queue: Mutex<Vec<OscMessage>>,
    prefix: String,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ParameterDispatcher {
    pub fn new(calibration: Arc<CalibrationManager>, sender: OscSender, prefix: &str) -> Self {
        Self {
            calibration,
            sender: Mutex::new(sender),
            queue: Mutex::new(Vec::new()),
            prefix: prefix.trim_end_matches('/').to_string(),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn calibration(&self) -> &Arc<CalibrationManager> {
        &self.calibration
    }

    fn push(&self, name: &str, address: &str, raw: f32) {
        let value = self.calibration.remap(name, raw);
        let msg = OscMessage {
            addr: format!("{}{}", self.prefix, address),
            args: vec![OscType::Float(value)],
        };
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push(msg);
    }

    /// Queues fused eye output. Slots follow `EyeExpressions::FUSED`.
    pub fn enqueue_eye(&self, values: &[f32]) {
        for (expression, &raw) in EyeExpressions::FUSED.iter().zip(values) {
            self.push(&expression.name(), &expression.address(), raw);
        }
    }

    /// Queues face output in model order; extra values are ignored.
    pub fn enqueue_face(&self, values: &[f32]) {
        for (expression, &raw) in FaceExpressions::ALL.iter().zip(values) {
            self.push(&expression.name(), &expression.address(), raw);
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Sends everything queued as one bundle and clears the queue, whether or not the
    /// send succeeded. Returns the number of messages handed to the socket.
    pub fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()));
        if batch.is_empty() {
            return 0;
        }
        let count = batch.len();

        let mut sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.send_bundle(batch) {
            Ok(true) => {
                trace!("Dispatched {} parameters", count);
                self.sent.fetch_add(count as u64, Ordering::Relaxed);
                count
            }
            Ok(false) => {
                self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                0
            }
            Err(e) => {
                error!("Dropping batch of {} parameters: {:#}", count, e);
                self.dropped.fetch_add(count as u64, Ordering::Relaxed);
                0
            }
        }
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn with_sender<R>(&self, f: impl FnOnce(&mut OscSender) -> R) -> R {
        f(&mut self.sender.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
