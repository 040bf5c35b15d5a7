//! Transport tuning.
//!
//! [`TransportConfig`] collects the constants the frame-advance cycle runs
//! on. Most are rig-specific and come straight from the persisted
//! [`RigConfig`]; the step styles are fixed per motion type here because
//! they follow from the mechanics, not from the build: the gate advances in
//! interleaved half-steps (smooth enough not to stress perforations, torque
//! enough to pull the loop), the takeup trims in microsteps so a trim can
//! never snap taut film.

use std::time::Duration;

use shared::rig_config::RigConfig;
use shared::rig_interface::{Direction, StepStyle};

use crate::motion::SeekBudget;

/// Constants governing one film transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Motor direction that advances film through the gate.
    pub advance_direction: Direction,
    /// Step style for gate motion.
    pub advance_style: StepStyle,
    /// Step style for takeup trims.
    pub takeup_style: StepStyle,
    /// Steps past the trailing sprocket edge after each frame.
    pub overshoot_steps: u32,
    /// Steps of one full grabber circuit (sensorless winding).
    pub frame_circuit_steps: u32,
    /// Takeup trim fires every this many completed frames (0 disables).
    pub takeup_period: u64,
    /// Microsteps per takeup trim.
    pub takeup_trim_steps: u32,
    /// Sprocket re-synchronization fires every this many completed frames.
    pub rebase_period: Option<u64>,
    /// Budget for every beam seek.
    pub seek: SeekBudget,
    /// Placeholder pause standing in for the capture in dry runs.
    pub click_pause: Duration,
    /// Total capture attempts per frame (first try plus timeout retries).
    pub capture_attempts: u32,
    /// Pause before re-priming the camera after a capture timeout.
    pub capture_retry_pause: Duration,
    /// Zoom applied when re-priming, percent.
    pub camera_zoom_percent: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_rig(&RigConfig::default())
    }
}

impl TransportConfig {
    /// Derive transport tuning from a rig configuration.
    pub fn from_rig(rig: &RigConfig) -> Self {
        Self {
            advance_direction: rig.advance_direction,
            advance_style: StepStyle::Interleave,
            takeup_style: StepStyle::Microstep,
            overshoot_steps: rig.overshoot_steps,
            frame_circuit_steps: rig.frame_circuit_steps,
            takeup_period: rig.takeup_period,
            takeup_trim_steps: rig.takeup_trim_steps,
            rebase_period: rig.rebase_period,
            seek: SeekBudget::from_config(rig),
            click_pause: rig.click_pause(),
            capture_attempts: 3,
            capture_retry_pause: Duration::from_millis(500),
            camera_zoom_percent: rig.camera_zoom_percent,
        }
    }
}
