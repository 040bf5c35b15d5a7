//! Coil sequencing for the Motor HAT stepper ports.
//!
//! A bipolar stepper is two coils driven in quadrature. The driver keeps the
//! motor's position within one electrical cycle in microsteps (4 full steps
//! = `4 * MICROSTEPS` microsteps) and derives coil polarities and PWM
//! magnitudes from it:
//!
//! - `Single` lands on positions where one coil is fully energized,
//! - `Double` on the positions between, with both coils fully energized,
//! - `Interleave` visits both sets alternately (half-stepping),
//! - `Microstep` advances one microstep at a time with magnitudes from a
//!   quarter-sine curve.
//!
//! Keeping one position counter for all styles means a caller can mix them
//! (the transport advances interleaved but trims the takeup in microsteps)
//! without the rotor ever being asked to jump phases.

use std::sync::{Arc, Mutex};

use shared::rig_interface::{Direction, MotorError, StepStyle, StepperMotor};

use super::pca9685::{I2cBus, Pca9685};

/// Microsteps per full step.
pub(crate) const MICROSTEPS: i32 = 16;

const CYCLE: i32 = 4 * MICROSTEPS;
const HALF_STEP: i32 = MICROSTEPS / 2;
const FULL_LEVEL: i32 = 0xFFFF;

/// PCA9685 channel assignment of one stepper port.
#[derive(Debug, Clone, Copy)]
pub struct StepperChannels {
    pub pwm_a: u8,
    pub ain1: u8,
    pub ain2: u8,
    pub pwm_b: u8,
    pub bin1: u8,
    pub bin2: u8,
}

/// Ports M1+M2.
pub const STEPPER1: StepperChannels = StepperChannels {
    pwm_a: 8,
    ain2: 9,
    ain1: 10,
    bin1: 11,
    bin2: 12,
    pwm_b: 13,
};

/// Ports M3+M4.
pub const STEPPER2: StepperChannels = StepperChannels {
    pwm_a: 2,
    ain2: 3,
    ain1: 4,
    bin1: 5,
    bin2: 6,
    pwm_b: 7,
};

/// Quarter-sine PWM level, `i` in `0..=MICROSTEPS`.
pub(crate) fn curve(i: i32) -> u16 {
    debug_assert!((0..=MICROSTEPS).contains(&i));
    let theta = std::f64::consts::FRAC_PI_2 * f64::from(i) / f64::from(MICROSTEPS);
    (65535.0 * theta.sin()).round() as u16
}

/// Next position on a step grid, strictly beyond `pos` in direction `sign`.
///
/// `grid` is the step spacing in microsteps and `offset` its phase; `Single`
/// uses offset 0 (one-coil positions), `Double` offset `HALF_STEP`
/// (two-coil positions).
fn advance_to_grid(pos: i32, grid: i32, offset: i32, sign: i32) -> i32 {
    let rem = (pos - offset).rem_euclid(grid);
    if sign > 0 {
        pos + (grid - rem)
    } else if rem == 0 {
        pos - grid
    } else {
        pos - rem
    }
}

/// Signed coil levels at a half-step position `h` (8 per cycle).
fn half_step_levels(h: i32) -> (i32, i32) {
    match h.rem_euclid(8) {
        0 => (FULL_LEVEL, 0),
        1 => (FULL_LEVEL, FULL_LEVEL),
        2 => (0, FULL_LEVEL),
        3 => (-FULL_LEVEL, FULL_LEVEL),
        4 => (-FULL_LEVEL, 0),
        5 => (-FULL_LEVEL, -FULL_LEVEL),
        6 => (0, -FULL_LEVEL),
        7 => (FULL_LEVEL, -FULL_LEVEL),
        _ => unreachable!(),
    }
}

/// Signed coil levels at a microstep position `t` within the cycle.
fn microstep_levels(t: i32) -> (i32, i32) {
    let quadrant = t.rem_euclid(CYCLE) / MICROSTEPS;
    let phase = t.rem_euclid(CYCLE) % MICROSTEPS;
    let rise = i32::from(curve(phase));
    let fall = i32::from(curve(MICROSTEPS - phase));
    match quadrant {
        0 => (fall, rise),
        1 => (-rise, fall),
        2 => (-fall, -rise),
        3 => (rise, -fall),
        _ => unreachable!(),
    }
}

/// One stepper port of the Motor HAT.
///
/// Steppers created from the same [`MotorKit`](super::MotorKit) share the
/// PCA9685 behind a mutex; each keeps its own cycle position.
pub struct HatStepper<B: I2cBus> {
    pca: Arc<Mutex<Pca9685<B>>>,
    channels: StepperChannels,
    /// Position within the electrical cycle, in microsteps.
    position: i32,
}

impl<B: I2cBus> HatStepper<B> {
    pub fn new(pca: Arc<Mutex<Pca9685<B>>>, channels: StepperChannels) -> Self {
        Self {
            pca,
            channels,
            position: 0,
        }
    }

    fn apply_coils(&mut self, a: i32, b: i32) -> std::io::Result<()> {
        let ch = self.channels;
        let mut pca = self.pca.lock().unwrap();
        // Polarity pins before magnitude, so a sign flip never drives the
        // old polarity at the new duty.
        pca.set_full(ch.ain1, a > 0)?;
        pca.set_full(ch.ain2, a < 0)?;
        pca.set_duty(ch.pwm_a, a.unsigned_abs().min(0xFFFF) as u16)?;
        pca.set_full(ch.bin1, b > 0)?;
        pca.set_full(ch.bin2, b < 0)?;
        pca.set_duty(ch.pwm_b, b.unsigned_abs().min(0xFFFF) as u16)?;
        Ok(())
    }
}

impl<B: I2cBus> StepperMotor for HatStepper<B> {
    fn step(&mut self, direction: Direction, style: StepStyle) -> Result<(), MotorError> {
        let sign = match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        };

        self.position = match style {
            StepStyle::Microstep => self.position + sign,
            StepStyle::Interleave => advance_to_grid(self.position, HALF_STEP, 0, sign),
            StepStyle::Single => advance_to_grid(self.position, MICROSTEPS, 0, sign),
            StepStyle::Double => advance_to_grid(self.position, MICROSTEPS, HALF_STEP, sign),
        }
        .rem_euclid(CYCLE);

        let (a, b) = match style {
            StepStyle::Microstep => microstep_levels(self.position),
            _ => half_step_levels(self.position / HALF_STEP),
        };
        self.apply_coils(a, b).map_err(MotorError::Io)
    }

    fn release(&mut self) -> Result<(), MotorError> {
        self.apply_coils(0, 0).map_err(MotorError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motorkit::testing::RecordingBus;

    fn stepper(bus: &RecordingBus) -> HatStepper<RecordingBus> {
        let pca = Pca9685::new(bus.clone()).unwrap();
        HatStepper::new(Arc::new(Mutex::new(pca)), STEPPER1)
    }

    /// Direction pins of STEPPER1 currently driven full-on.
    fn energized_polarity_pins(bus: &RecordingBus) -> Vec<u8> {
        let states = bus.channel_states();
        [STEPPER1.ain1, STEPPER1.ain2, STEPPER1.bin1, STEPPER1.bin2]
            .into_iter()
            .filter(|ch| states.get(ch) == Some(&(0x1000, 0)))
            .collect()
    }

    #[test]
    fn single_energizes_one_coil_and_cycles_in_four() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        let mut patterns = Vec::new();
        for _ in 0..5 {
            motor.step(Direction::Forward, StepStyle::Single).unwrap();
            patterns.push(energized_polarity_pins(&bus));
        }

        for pattern in &patterns {
            assert_eq!(pattern.len(), 1, "single style drives one coil");
        }
        // Electrical cycle is four full steps.
        assert_eq!(patterns[0], patterns[4]);
        assert_ne!(patterns[0], patterns[1]);
    }

    #[test]
    fn double_energizes_both_coils() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        for _ in 0..4 {
            motor.step(Direction::Forward, StepStyle::Double).unwrap();
            assert_eq!(energized_polarity_pins(&bus).len(), 2);
        }
    }

    #[test]
    fn interleave_alternates_and_cycles_in_eight() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        let mut counts = Vec::new();
        let mut patterns = Vec::new();
        for _ in 0..9 {
            motor
                .step(Direction::Forward, StepStyle::Interleave)
                .unwrap();
            let pins = energized_polarity_pins(&bus);
            counts.push(pins.len());
            patterns.push(pins);
        }

        assert_eq!(&counts[..4], &[2, 1, 2, 1]);
        assert_eq!(patterns[0], patterns[8]);
    }

    #[test]
    fn reverse_single_from_origin_lands_on_opposite_phase() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        motor.step(Direction::Reverse, StepStyle::Single).unwrap();
        // One full step back from position 0 is half-step index 6: coil B
        // negative, coil A off.
        assert_eq!(energized_polarity_pins(&bus), vec![STEPPER1.bin2]);
    }

    #[test]
    fn microstep_sets_graded_duties() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        motor.step(Direction::Forward, StepStyle::Microstep).unwrap();

        let states = bus.channel_states();
        let (_, pwm_a_off) = states[&STEPPER1.pwm_a];
        let (_, pwm_b_off) = states[&STEPPER1.pwm_b];
        assert_eq!(pwm_a_off, curve(MICROSTEPS - 1) >> 4);
        assert_eq!(pwm_b_off, curve(1) >> 4);
    }

    #[test]
    fn sixty_four_microsteps_complete_one_cycle() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        motor.step(Direction::Forward, StepStyle::Single).unwrap();
        let reference = bus.channel_states();

        for _ in 0..CYCLE {
            motor.step(Direction::Forward, StepStyle::Microstep).unwrap();
        }
        assert_eq!(bus.channel_states(), reference);
    }

    #[test]
    fn release_de_energizes_everything() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        motor.step(Direction::Forward, StepStyle::Double).unwrap();
        motor.release().unwrap();

        let states = bus.channel_states();
        for ch in [
            STEPPER1.pwm_a,
            STEPPER1.ain1,
            STEPPER1.ain2,
            STEPPER1.pwm_b,
            STEPPER1.bin1,
            STEPPER1.bin2,
        ] {
            assert_eq!(states[&ch], (0, 0x1000), "channel {ch} still driven");
        }
        assert!(energized_polarity_pins(&bus).is_empty());
    }

    #[test]
    fn mixed_styles_share_one_position() {
        let bus = RecordingBus::new();
        let mut motor = stepper(&bus);

        // Half a full step in microsteps, then an interleave step must land
        // on the next half-step boundary, not skip one.
        for _ in 0..HALF_STEP {
            motor.step(Direction::Forward, StepStyle::Microstep).unwrap();
        }
        motor
            .step(Direction::Forward, StepStyle::Interleave)
            .unwrap();
        // Position is now one full step in: a single-coil phase.
        assert_eq!(energized_polarity_pins(&bus).len(), 1);
    }
}
