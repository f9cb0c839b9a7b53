use crate::calibration::{default_channels, CalibrationData, CalibrationParameter};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const LOWER_SUFFIX: &str = "Lower";
const UPPER_SUFFIX: &str = "Upper";

struct Channel {
    name: String,
    default: CalibrationParameter,
    current: CalibrationParameter,
}

/// Shared calibration table. Every `(lower, upper, min, max)` tuple is read and written
/// under one lock so readers never observe a half-updated range.
pub struct CalibrationManager {
    channels: RwLock<Vec<Channel>>,
    index: HashMap<String, usize>,
    storage_path: Option<PathBuf>,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(default_channels())
    }
}

impl CalibrationManager {
    pub fn new(defaults: Vec<(String, CalibrationParameter)>) -> Self {
        let mut index = HashMap::with_capacity(defaults.len());
        let mut channels = Vec::with_capacity(defaults.len());
        for (name, default) in defaults {
            if index.contains_key(&name) {
                warn!("Duplicate calibration channel {}, keeping the first", name);
                continue;
            }
            index.insert(name.clone(), channels.len());
            channels.push(Channel {
                name,
                default,
                current: default,
            });
        }

        Self {
            channels: RwLock::new(channels),
            index,
            storage_path: None,
        }
    }

    pub fn with_storage(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Channel>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Channel>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn names(&self) -> Vec<String> {
        self.read().iter().map(|c| c.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<CalibrationParameter> {
        let idx = *self.index.get(name)?;
        self.read().get(idx).map(|c| c.current)
    }

    /// Remaps `raw` through the named channel. Unknown channels use the unit range.
    pub fn remap(&self, name: &str, raw: f32) -> f32 {
        match self.get(name) {
            Some(param) => param.remap(raw),
            None => {
                debug!("Unknown calibration channel {}, using unit range", name);
                CalibrationParameter::unit().remap(raw)
            }
        }
    }

    /// Updates one half of a channel's input range. `key` is the channel name followed by
    /// `Lower` or `Upper`. Returns false for malformed keys and unknown channels.
    pub fn set_expression(&self, key: &str, value: f32) -> bool {
        let (name, is_upper) = if let Some(name) = key.strip_suffix(UPPER_SUFFIX) {
            (name, true)
        } else if let Some(name) = key.strip_suffix(LOWER_SUFFIX) {
            (name, false)
        } else {
            debug!("Ignoring calibration key without bound suffix: {}", key);
            return false;
        };

        let Some(&idx) = self.index.get(name) else {
            debug!("Ignoring calibration key for unknown channel: {}", key);
            return false;
        };

        let mut channels = self.write();
        let current = &mut channels[idx].current;
        if is_upper {
            current.upper = value;
        } else {
            current.lower = value;
        }
        true
    }

    /// Replaces a whole tuple atomically.
    pub fn set(&self, name: &str, param: CalibrationParameter) -> bool {
        let Some(&idx) = self.index.get(name) else {
            return false;
        };
        self.write()[idx].current = param;
        true
    }

    /// `lower -> min` and `upper -> max` for every channel.
    pub fn reset_values(&self) {
        for channel in self.write().iter_mut() {
            channel.current.lower = channel.current.min;
            channel.current.upper = channel.current.max;
        }
    }

    pub fn reset_minimums(&self) {
        for channel in self.write().iter_mut() {
            channel.current.lower = channel.current.min;
        }
    }

    pub fn reset_maximums(&self) {
        for channel in self.write().iter_mut() {
            channel.current.upper = channel.current.max;
        }
    }

    pub fn snapshot(&self) -> CalibrationData {
        let mut data = CalibrationData::default();
        for channel in self.read().iter() {
            let param = if channel.current.is_finite() {
                channel.current
            } else {
                channel.default
            };
            data.channels.insert(channel.name.clone(), param);
        }
        data
    }

    /// Applies persisted ranges. Missing entries fall back to channel defaults and unknown
    /// names are ignored.
    pub fn apply(&self, data: &CalibrationData) {
        let mut channels = self.write();
        for channel in channels.iter_mut() {
            channel.current = match data.channels.get(&channel.name) {
                Some(param) if param.is_finite() => *param,
                _ => channel.default,
            };
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create calibration dir: {:?}", parent))?;
            }
        }
        let file = File::create(path).context("Failed to create calibration file")?;
        serde_json::to_writer_pretty(file, &self.snapshot())
            .context("Failed to serialize calibration data")?;
        debug!("Saved calibration data to {:?}", path);
        Ok(())
    }

    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };
        if !path.exists() {
            info!("No calibration file found at {:?}, using defaults", path);
            return Ok(());
        }

        let file = File::open(path).context("Failed to open calibration file")?;
        let reader = BufReader::new(file);
        let data: CalibrationData =
            serde_json::from_reader(reader).context("Failed to deserialize calibration data")?;

        self.apply(&data);
        info!("Loaded calibration data from {:?}", path);
        Ok(())
    }
}
