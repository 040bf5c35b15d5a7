//! Rig configuration storage.
//!
//! Every rig-specific tuning value lives in one JSON document: wiring (I2C
//! bus, GPIO line), the camera endpoint, and the transport constants that
//! differ between physical builds (overshoot count, maintenance periods,
//! seek budgets). Nothing in the control logic hardcodes these.
//!
//! Config is stored in `~/.scan_rig/rig.json` by default. A missing file is
//! not an error - the defaults describe the reference rig - but a file that
//! exists and fails to parse is, since silently scanning with the wrong
//! constants can chew film.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::rig_interface::Direction;

/// Errors loading or saving rig configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("home directory not available: {0}")]
    NoHome(String),
}

/// Complete configuration for one physical rig.
///
/// Defaults describe the reference build: Motor HAT on I2C bus 1 at 0x60,
/// breakbeam on `gpiochip0` line 17 (active low), IP Webcam phone on the
/// bench LAN. Transport constants are the values the reference rig was tuned
/// to; any rebuild of the gate geometry needs its own file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Base URL of the IP Webcam endpoint, no trailing slash.
    pub camera_base_url: String,
    /// Per-request camera deadline in milliseconds.
    pub camera_timeout_ms: u64,
    /// Zoom applied when (re)priming the camera, percent.
    pub camera_zoom_percent: u32,

    /// I2C bus number carrying the Motor HAT (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// Motor HAT address on that bus.
    pub motor_hat_address: u16,

    /// GPIO character device for the breakbeam (e.g. `gpiochip0`).
    pub gpio_chip: String,
    /// Line offset of the breakbeam output on that chip.
    pub beam_line: u32,
    /// Whether the sensor pulls the line low when the beam is interrupted.
    pub beam_active_low: bool,

    /// Motor direction that advances film through the gate.
    pub advance_direction: Direction,
    /// Steps past the trailing sprocket edge so the tooth fully disengages.
    pub overshoot_steps: u32,
    /// Steps of one full grabber circuit (used for sensorless winding).
    pub frame_circuit_steps: u32,
    /// Takeup spool trim fires every this many frames.
    pub takeup_period: u64,
    /// Microsteps per takeup trim.
    pub takeup_trim_steps: u32,
    /// Sprocket re-synchronization fires every this many frames, if set.
    pub rebase_period: Option<u64>,

    /// Steps allowed per seek pass before a cool-down.
    pub seek_step_budget: u64,
    /// Cool-down retries after an exhausted pass before giving up.
    pub seek_max_retries: u32,
    /// Motor cool-down between exhausted passes, milliseconds.
    pub seek_cooldown_ms: u64,
    /// Optional pause between steps, microseconds (0 = none; the I2C
    /// transaction time paces the reference rig).
    pub step_interval_us: u64,
    /// Placeholder pause standing in for the capture in dry runs, ms.
    pub click_pause_ms: u64,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            camera_base_url: "http://192.168.0.187:8080".to_string(),
            camera_timeout_ms: 2_000,
            camera_zoom_percent: 100,
            i2c_bus: 1,
            motor_hat_address: 0x60,
            gpio_chip: "gpiochip0".to_string(),
            beam_line: 17,
            beam_active_low: true,
            advance_direction: Direction::Forward,
            overshoot_steps: 400,
            frame_circuit_steps: 1_685,
            takeup_period: 3,
            takeup_trim_steps: 64,
            rebase_period: Some(24),
            seek_step_budget: 10_000,
            seek_max_retries: 2,
            seek_cooldown_ms: 30_000,
            step_interval_us: 0,
            click_pause_ms: 150,
        }
    }
}

impl RigConfig {
    /// Load from an explicit file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save to an explicit file path, pretty-printed.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn camera_timeout(&self) -> Duration {
        Duration::from_millis(self.camera_timeout_ms)
    }

    pub fn seek_cooldown(&self) -> Duration {
        Duration::from_millis(self.seek_cooldown_ms)
    }

    /// Inter-step pacing, or `None` when disabled.
    pub fn step_interval(&self) -> Option<Duration> {
        (self.step_interval_us > 0).then(|| Duration::from_micros(self.step_interval_us))
    }

    pub fn click_pause(&self) -> Duration {
        Duration::from_millis(self.click_pause_ms)
    }
}

/// Filesystem location of rig configuration.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default location (`~/.scan_rig`).
    pub fn new() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|e| ConfigError::NoHome(e.to_string()))?;
        Ok(Self {
            root_path: PathBuf::from(home).join(".scan_rig"),
        })
    }

    /// Storage rooted at a custom directory.
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Path of the rig config file inside this storage.
    pub fn rig_config_path(&self) -> PathBuf {
        self.root_path.join("rig.json")
    }

    /// Load the rig config, falling back to defaults if no file exists.
    ///
    /// A present-but-malformed file is an error.
    pub fn load_or_default(&self) -> Result<RigConfig, ConfigError> {
        let path = self.rig_config_path();
        if !path.exists() {
            debug!("no rig config at {}, using defaults", path.display());
            return Ok(RigConfig::default());
        }
        RigConfig::load_from_file(&path)
    }

    /// Save the rig config, creating the storage directory if needed.
    /// Returns the path written.
    pub fn save(&self, config: &RigConfig) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&self.root_path)?;
        let path = self.rig_config_path();
        config.save_to_file(&path)?;
        Ok(path)
    }
}
