//! Deterministic in-process doubles for the rig capabilities.
//!
//! [`GateSim`] models the one piece of physics the transport logic actually
//! depends on: motor steps move film, and the breakbeam state is a function
//! of film position within the sprocket pitch. Handles cloned from one sim
//! share state, so a [`GateMotor`] and [`GateSensor`] pair behaves like a
//! motor and sensor bolted to the same gate.
//!
//! The remaining doubles are bookkeeping: [`CountingMotor`] records every
//! step it is asked to take, [`StaticBeam`] never changes state (a jammed
//! gate), and [`ScriptedCamera`] replays a fixed sequence of capture
//! outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{
    BeamSensor, BeamState, CameraError, Direction, FocusMode, FrameCamera, MotorError,
    SensorError, StepStyle, StepperMotor,
};

struct GateState {
    /// Net film position in steps. `Forward` steps increment.
    position: i64,
    /// Steps per sprocket period.
    pitch: u32,
    /// Positions `0..blocked_span` within each period read `Blocked`.
    blocked_span: u32,
    steps_taken: u64,
    reverse_steps: u64,
    releases: u32,
}

impl GateState {
    fn beam(&self) -> BeamState {
        let phase = self.position.rem_euclid(i64::from(self.pitch));
        BeamState::from_blocked(phase < i64::from(self.blocked_span))
    }
}

/// Simulated film gate: shared state behind a motor and a sensor handle.
///
/// Position starts at 0, which is inside the blocked span, i.e. the rig
/// begins with a sprocket edge in the beam. Use [`set_position`]
/// (`GateSim::set_position`) to start elsewhere.
#[derive(Clone)]
pub struct GateSim {
    state: Arc<Mutex<GateState>>,
}

impl GateSim {
    /// Create a gate with the given sprocket geometry.
    ///
    /// # Panics
    /// Panics if `pitch` is zero or `blocked_span > pitch`.
    pub fn new(pitch: u32, blocked_span: u32) -> Self {
        assert!(pitch > 0, "sprocket pitch must be non-zero");
        assert!(blocked_span <= pitch, "blocked span cannot exceed pitch");
        Self {
            state: Arc::new(Mutex::new(GateState {
                position: 0,
                pitch,
                blocked_span,
                steps_taken: 0,
                reverse_steps: 0,
                releases: 0,
            })),
        }
    }

    /// A motor handle driving this gate.
    pub fn motor(&self) -> GateMotor {
        GateMotor {
            state: self.state.clone(),
        }
    }

    /// A sensor handle reading this gate.
    pub fn sensor(&self) -> GateSensor {
        GateSensor {
            state: self.state.clone(),
        }
    }

    pub fn set_position(&self, position: i64) {
        self.state.lock().unwrap().position = position;
    }

    pub fn position(&self) -> i64 {
        self.state.lock().unwrap().position
    }

    /// Total steps taken in either direction.
    pub fn steps_taken(&self) -> u64 {
        self.state.lock().unwrap().steps_taken
    }

    /// Steps taken in `Reverse` only.
    pub fn reverse_steps(&self) -> u64 {
        self.state.lock().unwrap().reverse_steps
    }

    pub fn releases(&self) -> u32 {
        self.state.lock().unwrap().releases
    }

    /// Current beam state, for assertions.
    pub fn beam(&self) -> BeamState {
        self.state.lock().unwrap().beam()
    }
}

/// Motor handle for a [`GateSim`]. Never fails.
pub struct GateMotor {
    state: Arc<Mutex<GateState>>,
}

impl StepperMotor for GateMotor {
    fn step(&mut self, direction: Direction, _style: StepStyle) -> Result<(), MotorError> {
        let mut state = self.state.lock().unwrap();
        match direction {
            Direction::Forward => state.position += 1,
            Direction::Reverse => {
                state.position -= 1;
                state.reverse_steps += 1;
            }
        }
        state.steps_taken += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), MotorError> {
        self.state.lock().unwrap().releases += 1;
        Ok(())
    }
}

/// Sensor handle for a [`GateSim`]. Always returns a fresh reading.
pub struct GateSensor {
    state: Arc<Mutex<GateState>>,
}

impl BeamSensor for GateSensor {
    fn read(&mut self) -> Result<BeamState, SensorError> {
        Ok(self.state.lock().unwrap().beam())
    }
}

struct MotorLog {
    steps: Vec<(Direction, StepStyle)>,
    releases: u32,
}

/// Motor double that records every command and moves nothing.
///
/// Clones share the log, so a test can keep one handle while the transport
/// owns the other.
#[derive(Clone)]
pub struct CountingMotor {
    log: Arc<Mutex<MotorLog>>,
}

impl CountingMotor {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(MotorLog {
                steps: Vec::new(),
                releases: 0,
            })),
        }
    }

    pub fn step_count(&self) -> u64 {
        self.log.lock().unwrap().steps.len() as u64
    }

    pub fn releases(&self) -> u32 {
        self.log.lock().unwrap().releases
    }

    /// Steps taken in one particular direction.
    pub fn steps_in(&self, direction: Direction) -> u64 {
        self.log
            .lock()
            .unwrap()
            .steps
            .iter()
            .filter(|(d, _)| *d == direction)
            .count() as u64
    }

    /// Style of the most recent step, if any.
    pub fn last_style(&self) -> Option<StepStyle> {
        self.log.lock().unwrap().steps.last().map(|(_, s)| *s)
    }
}

impl Default for CountingMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepperMotor for CountingMotor {
    fn step(&mut self, direction: Direction, style: StepStyle) -> Result<(), MotorError> {
        self.log.lock().unwrap().steps.push((direction, style));
        Ok(())
    }

    fn release(&mut self) -> Result<(), MotorError> {
        self.log.lock().unwrap().releases += 1;
        Ok(())
    }
}

/// Sensor pinned to a single state - a jammed gate or a torn-out sensor.
pub struct StaticBeam(pub BeamState);

impl BeamSensor for StaticBeam {
    fn read(&mut self) -> Result<BeamState, SensorError> {
        Ok(self.0)
    }
}

struct CameraLog {
    outcomes: VecDeque<Result<(), CameraError>>,
    priming: Result<(), CameraError>,
    captures: u32,
    zoom_calls: u32,
    focus_calls: u32,
}

/// Camera double replaying a scripted sequence of capture outcomes.
///
/// Once the script is exhausted every capture succeeds. Priming calls
/// (`set_zoom` / `set_focus_mode`) succeed unless [`fail_priming`]
/// (`ScriptedCamera::fail_priming`) was used.
#[derive(Clone)]
pub struct ScriptedCamera {
    log: Arc<Mutex<CameraLog>>,
}

impl ScriptedCamera {
    pub fn always_ok() -> Self {
        Self::with_outcomes(Vec::new())
    }

    pub fn with_outcomes(outcomes: Vec<Result<(), CameraError>>) -> Self {
        Self {
            log: Arc::new(Mutex::new(CameraLog {
                outcomes: outcomes.into(),
                priming: Ok(()),
                captures: 0,
                zoom_calls: 0,
                focus_calls: 0,
            })),
        }
    }

    /// Make every subsequent priming call fail with `err`.
    pub fn fail_priming(self, err: CameraError) -> Self {
        self.log.lock().unwrap().priming = Err(err);
        self
    }

    pub fn captures(&self) -> u32 {
        self.log.lock().unwrap().captures
    }

    pub fn zoom_calls(&self) -> u32 {
        self.log.lock().unwrap().zoom_calls
    }

    pub fn focus_calls(&self) -> u32 {
        self.log.lock().unwrap().focus_calls
    }
}

impl FrameCamera for ScriptedCamera {
    fn capture(&mut self) -> Result<(), CameraError> {
        let mut log = self.log.lock().unwrap();
        log.captures += 1;
        log.outcomes.pop_front().unwrap_or(Ok(()))
    }

    fn set_zoom(&mut self, _percent: u32) -> Result<(), CameraError> {
        let mut log = self.log.lock().unwrap();
        log.zoom_calls += 1;
        log.priming.clone()
    }

    fn set_focus_mode(&mut self, _mode: FocusMode) -> Result<(), CameraError> {
        let mut log = self.log.lock().unwrap();
        log.focus_calls += 1;
        log.priming.clone()
    }
}
