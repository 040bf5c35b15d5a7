//! IR breakbeam sensor at the film gate.
//!
//! The receiver's open-collector output is wired to a GPIO line and read
//! through the GPIO character device. On the reference rig the line is
//! pulled up and the receiver sinks it low while the beam is interrupted,
//! so "low" means [`BeamState::Blocked`]; rigs with an inverting stage set
//! `beam_active_low = false` in the config.
//!
//! Reads are a single `GET_LINE_VALUES` ioctl against an already-requested
//! line, cheap enough to sit inside the per-step polling loop. No debouncing
//! happens here; the stepping loop re-reads after every step, which is all
//! the filtering the slotted sensor needs.

use shared::rig_config::RigConfig;
use shared::rig_interface::{BeamSensor, BeamState, SensorError};
use tracing::debug;

/// Breakbeam sensor on a GPIO line.
pub struct Breakbeam {
    lines: gpiod::Lines<gpiod::Input>,
    active_low: bool,
}

impl Breakbeam {
    /// Request `line` on `chip` (e.g. `"gpiochip0"`) as an input.
    pub fn open(chip: &str, line: u32, active_low: bool) -> Result<Self, SensorError> {
        let chip = gpiod::Chip::new(chip)?;
        let opts = gpiod::Options::input([line]).consumer("scan-rig-breakbeam");
        let lines = chip.request_lines(opts)?;
        debug!("breakbeam on line {} (active_low={})", line, active_low);
        Ok(Self { lines, active_low })
    }

    /// Open the sensor described by the rig config.
    pub fn from_config(config: &RigConfig) -> Result<Self, SensorError> {
        Self::open(&config.gpio_chip, config.beam_line, config.beam_active_low)
    }
}

impl BeamSensor for Breakbeam {
    fn read(&mut self) -> Result<BeamState, SensorError> {
        let values = self.lines.get_values([false; 1])?;
        let blocked = if self.active_low {
            !values[0]
        } else {
            values[0]
        };
        Ok(BeamState::from_blocked(blocked))
    }
}
