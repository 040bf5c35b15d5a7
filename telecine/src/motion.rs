//! Motion primitives for the film transport.
//!
//! Two kinds of motion exist. Fixed-count rotation ([`rotate`]) is used
//! where no sensor ground truth exists: the post-frame overshoot, takeup
//! trims, sensorless winding. Condition-seeking rotation ([`seek`]) steps
//! until the gate breakbeam reaches a wanted state and carries the rig's
//! core safety policy: the beam is the only ground truth for film position,
//! and stepping blindly past a stall can shred film, so an exhausted step
//! budget releases the motor to cool, retries a bounded number of times,
//! and then declares the session dead.

use std::thread;
use std::time::Duration;

use shared::rig_config::RigConfig;
use shared::rig_interface::{
    BeamSensor, BeamState, Direction, MotorError, SensorError, StepStyle, StepperMotor,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Limits for one condition-seeking motion call.
///
/// The retry counter is local to a single [`seek`] call; nothing persists
/// between calls.
#[derive(Debug, Clone)]
pub struct SeekBudget {
    /// Steps allowed per pass before a cool-down.
    pub step_budget: u64,
    /// Cool-down retries after an exhausted pass.
    pub max_retries: u32,
    /// Pause with coils released between passes.
    pub cooldown: Duration,
    /// Optional pause between steps.
    pub step_interval: Option<Duration>,
}

impl Default for SeekBudget {
    fn default() -> Self {
        Self {
            step_budget: 10_000,
            max_retries: 2,
            cooldown: Duration::from_secs(30),
            step_interval: None,
        }
    }
}

impl SeekBudget {
    pub fn from_config(config: &RigConfig) -> Self {
        Self {
            step_budget: config.seek_step_budget,
            max_retries: config.seek_max_retries,
            cooldown: config.seek_cooldown(),
            step_interval: config.step_interval(),
        }
    }
}

/// Errors from motion primitives.
#[derive(Error, Debug)]
pub enum MotionError {
    /// The beam never reached the sought state within the step budget,
    /// across every cool-down retry. A jam, torn film, or a dead sensor -
    /// the session must stop rather than keep stepping blind.
    #[error("beam never became {target:?} after {steps_taken} steps in {passes} passes")]
    BudgetExhausted {
        target: BeamState,
        steps_taken: u64,
        passes: u32,
    },

    #[error(transparent)]
    Motor(#[from] MotorError),

    #[error(transparent)]
    Sensor(#[from] SensorError),
}

/// Rotate a fixed number of steps, unconditionally.
pub fn rotate<M: StepperMotor>(
    motor: &mut M,
    direction: Direction,
    style: StepStyle,
    steps: u32,
    step_interval: Option<Duration>,
) -> Result<(), MotionError> {
    for _ in 0..steps {
        motor.step(direction, style)?;
        if let Some(pause) = step_interval {
            thread::sleep(pause);
        }
    }
    Ok(())
}

/// Step in `direction` until the beam reads `target`; returns steps taken.
///
/// Returns immediately with zero steps if the beam is already in the target
/// state. The sensor is re-read after every single step - it is the only
/// ground truth, and a hole edge can arrive on any step.
pub fn seek<M: StepperMotor, S: BeamSensor>(
    motor: &mut M,
    sensor: &mut S,
    target: BeamState,
    direction: Direction,
    style: StepStyle,
    budget: &SeekBudget,
) -> Result<u64, MotionError> {
    let mut steps_total: u64 = 0;
    let mut steps_this_pass: u64 = 0;
    let mut retries: u32 = 0;

    loop {
        if sensor.read()? == target {
            debug!("beam {:?} after {} steps", target, steps_total);
            return Ok(steps_total);
        }

        if steps_this_pass >= budget.step_budget {
            motor.release()?;
            if retries >= budget.max_retries {
                return Err(MotionError::BudgetExhausted {
                    target,
                    steps_taken: steps_total,
                    passes: retries + 1,
                });
            }
            retries += 1;
            warn!(
                "beam not {:?} after {} steps; cooling motor for {:?} (retry {}/{})",
                target, steps_total, budget.cooldown, retries, budget.max_retries
            );
            thread::sleep(budget.cooldown);
            steps_this_pass = 0;
            continue;
        }

        motor.step(direction, style)?;
        steps_this_pass += 1;
        steps_total += 1;
        if let Some(pause) = budget.step_interval {
            thread::sleep(pause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::rig_interface::sim::{CountingMotor, GateSim, StaticBeam};

    fn quick_budget(step_budget: u64, max_retries: u32) -> SeekBudget {
        SeekBudget {
            step_budget,
            max_retries,
            cooldown: Duration::ZERO,
            step_interval: None,
        }
    }

    #[test]
    fn rotate_issues_exactly_the_requested_steps() {
        let motor = CountingMotor::new();
        let mut handle = motor.clone();

        rotate(
            &mut handle,
            Direction::Forward,
            StepStyle::Microstep,
            137,
            None,
        )
        .unwrap();

        assert_eq!(motor.step_count(), 137);
        assert_eq!(motor.last_style(), Some(StepStyle::Microstep));
        assert_eq!(motor.releases(), 0);
    }

    #[test]
    fn seek_returns_zero_steps_when_already_at_target() {
        // Position 0 is inside the blocked span.
        let sim = GateSim::new(12, 4);
        let mut motor = sim.motor();
        let mut sensor = sim.sensor();

        let steps = seek(
            &mut motor,
            &mut sensor,
            BeamState::Blocked,
            Direction::Forward,
            StepStyle::Interleave,
            &quick_budget(100, 2),
        )
        .unwrap();

        assert_eq!(steps, 0);
        assert_eq!(sim.steps_taken(), 0);
    }

    #[test]
    fn seek_stops_on_the_first_step_that_satisfies_the_target() {
        let sim = GateSim::new(12, 4);
        let mut motor = sim.motor();
        let mut sensor = sim.sensor();

        let budget = quick_budget(100, 2);
        let steps = seek(
            &mut motor,
            &mut sensor,
            BeamState::Clear,
            Direction::Forward,
            StepStyle::Interleave,
            &budget,
        )
        .unwrap();

        // Blocked span is 4 steps wide from position 0.
        assert_eq!(steps, 4);
        assert!(steps <= budget.step_budget);
        assert_eq!(sim.beam(), BeamState::Clear);
    }

    #[test]
    fn seek_succeeds_on_a_retry_pass() {
        // 30 steps to the next blocked span, but only 20 per pass.
        let sim = GateSim::new(40, 10);
        sim.set_position(10);
        let mut motor = sim.motor();
        let mut sensor = sim.sensor();

        let steps = seek(
            &mut motor,
            &mut sensor,
            BeamState::Blocked,
            Direction::Forward,
            StepStyle::Interleave,
            &quick_budget(20, 2),
        )
        .unwrap();

        assert_eq!(steps, 30);
        assert_eq!(sim.releases(), 1);
    }

    #[test]
    fn seek_exhausts_every_retry_then_fails() {
        let mut sensor = StaticBeam(BeamState::Clear);
        let motor = CountingMotor::new();
        let mut handle = motor.clone();

        let result = seek(
            &mut handle,
            &mut sensor,
            BeamState::Blocked,
            Direction::Forward,
            StepStyle::Interleave,
            &quick_budget(25, 2),
        );

        match result {
            Err(MotionError::BudgetExhausted {
                target,
                steps_taken,
                passes,
            }) => {
                assert_eq!(target, BeamState::Blocked);
                assert_eq!(steps_taken, 75);
                assert_eq!(passes, 3);
            }
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
        // One release per exhausted pass: initial pass plus two retries.
        assert_eq!(motor.releases(), 3);
        assert_eq!(motor.step_count(), 75);
    }

    #[test]
    fn seek_with_zero_retries_fails_after_one_pass() {
        let mut sensor = StaticBeam(BeamState::Blocked);
        let motor = CountingMotor::new();
        let mut handle = motor.clone();

        let result = seek(
            &mut handle,
            &mut sensor,
            BeamState::Clear,
            Direction::Reverse,
            StepStyle::Interleave,
            &quick_budget(10, 0),
        );

        assert!(matches!(
            result,
            Err(MotionError::BudgetExhausted { passes: 1, .. })
        ));
        assert_eq!(motor.releases(), 1);
        assert_eq!(motor.step_count(), 10);
    }
}
