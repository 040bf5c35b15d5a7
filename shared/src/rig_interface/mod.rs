//! Capability interfaces for the scan rig hardware.
//!
//! Every piece of hardware the transport logic touches sits behind one of the
//! traits in this module, so the frame-advance control loop can run against
//! the real drivers in the `hardware` crate or against the deterministic
//! doubles in [`sim`]. The traits are deliberately narrow: a stepper motor is
//! "one step in a direction, plus release", a breakbeam is "blocked or clear
//! right now", a camera is "capture / zoom / focus mode".
//!
//! # Polling contract
//!
//! [`BeamSensor::read`] is the only ground truth the transport has for film
//! position. It must be cheap enough to call between every motor step
//! (thousands of times per frame) and must always return a fresh reading -
//! no implementation may cache. Debouncing, if a rig needs it, belongs to the
//! caller's stepping loop, not to the sensor.

pub mod sim;

use thiserror::Error;

/// Rotation direction of a stepper motor.
///
/// Which physical direction advances film through the gate depends on how the
/// rig is threaded and belongs to configuration
/// ([`RigConfig::advance_direction`](crate::rig_config::RigConfig)); it is
/// never derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// The opposite rotation direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

/// Coil energization pattern used for a single step.
///
/// Styles trade torque against smoothness and resolution. Each motion type in
/// the transport uses a fixed style: the gate advance runs interleaved
/// half-steps, the takeup trim runs microsteps so it cannot snap the film.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStyle {
    /// One coil at a time. Lowest power, lowest torque.
    Single,
    /// Two adjacent coils at a time. Full torque.
    Double,
    /// Alternate single and double positions (half-stepping).
    Interleave,
    /// PWM-graded coil currents between full steps.
    Microstep,
}

/// Snapshot of the optical breakbeam at the film gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamState {
    /// Film stock (or a sprocket tooth) is interrupting the beam.
    Blocked,
    /// The beam passes through a sprocket hole.
    Clear,
}

impl BeamState {
    /// Map a raw "beam interrupted" reading onto a state.
    pub fn from_blocked(blocked: bool) -> Self {
        if blocked {
            BeamState::Blocked
        } else {
            BeamState::Clear
        }
    }

    pub fn is_blocked(self) -> bool {
        self == BeamState::Blocked
    }
}

/// Errors from a stepper motor adapter.
///
/// Motion itself is assumed physically reliable - a step that executes is a
/// step taken, and counting is the caller's job. These errors are therefore
/// all I/O-level faults (a dead I2C bus, an unplugged HAT) and the transport
/// treats every one of them as fatal.
#[derive(Error, Debug)]
pub enum MotorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver chip rejected or could not execute the request.
    #[error("motor driver fault: {0}")]
    Driver(String),
}

/// Errors from a beam sensor adapter.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the frame camera.
///
/// The split between [`Timeout`](CameraError::Timeout) and everything else is
/// load-bearing: the capture recovery policy retries timeouts (after
/// re-priming the camera) and treats any other failure as non-transient.
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    /// The request did not complete within the configured deadline.
    #[error("camera request timed out")]
    Timeout,

    /// The camera answered with a non-success HTTP status.
    #[error("camera returned HTTP status {0}")]
    Status(u16),

    /// Connection-level failure (refused, unreachable, protocol error).
    #[error("camera transport error: {0}")]
    Transport(String),
}

impl CameraError {
    /// Whether this failure is the transient kind the capture recovery
    /// policy is allowed to retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CameraError::Timeout)
    }
}

/// Focus mode of the remote camera.
///
/// The rig locks focus off before a scan run; autofocus hunting between
/// frames ruins registration of the captured sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    Off,
}

impl FocusMode {
    /// Value used in the camera's query-string API.
    pub fn query_value(self) -> &'static str {
        match self {
            FocusMode::Auto => "auto",
            FocusMode::Off => "off",
        }
    }
}

/// A stepper motor that can be stepped one increment at a time.
///
/// `step` performs exactly one physical step and returns once the command has
/// been issued to the driver. There is no position feedback at this layer;
/// correctness of step counts is entirely the caller's responsibility.
pub trait StepperMotor {
    /// Perform exactly one step in `direction` using `style`.
    fn step(&mut self, direction: Direction, style: StepStyle) -> Result<(), MotorError>;

    /// De-energize the coils.
    ///
    /// The rotor may relax against the nearest detent, so callers only
    /// release at points where a small settling movement is acceptable -
    /// cool-down pauses and session shutdown.
    fn release(&mut self) -> Result<(), MotorError>;
}

/// An optical breakbeam sensor.
pub trait BeamSensor {
    /// Take a fresh reading of the beam state.
    fn read(&mut self) -> Result<BeamState, SensorError>;
}

/// A remote camera that can capture one frame on demand.
pub trait FrameCamera {
    /// Trigger a capture. Returns once the camera acknowledges the shot.
    fn capture(&mut self) -> Result<(), CameraError>;

    /// Set the camera zoom as a percentage of its range.
    fn set_zoom(&mut self, percent: u32) -> Result<(), CameraError>;

    /// Set the camera focus mode.
    fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), CameraError>;
}
