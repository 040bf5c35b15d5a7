//! Frame-advance control for the scan gate.
//!
//! [`FilmTransport`] owns the rig's moving parts and advances film exactly
//! one frame per call. A frame cycle walks the phases in order:
//!
//! 1. **Align** - seek the beam `Blocked`: the leading edge of the next
//!    sprocket hole arrives under the grabber. Zero steps if a hole is
//!    already in the beam.
//! 2. **Expose** - capture through the camera, or a placeholder click pause
//!    in dry runs.
//! 3. **ClearHole** - seek the beam `Clear`: the hole passes.
//! 4. **Overshoot** - a fixed extra rotation so the sprocket tooth fully
//!    disengages before the next cycle.
//! 5. **Maintain** - on frames where they are due, takeup trim first, then
//!    sprocket re-synchronization.
//!
//! Every seek failure and every non-transient camera failure unwinds out of
//! [`advance_frame`](FilmTransport::advance_frame); nothing mid-cycle is
//! retried or resumed, because continuing after a fault the beam cannot
//! explain risks the film itself.

use std::thread;

use shared::rig_interface::{
    BeamSensor, BeamState, CameraError, FocusMode, FrameCamera, MotorError, StepperMotor,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::motion::{rotate, seek, MotionError};

/// Phase of the frame cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Align,
    Expose,
    ClearHole,
    Overshoot,
    Maintain,
}

/// Errors that abort a frame cycle (and with it, the session).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Motor(#[from] MotorError),

    /// Non-transient capture failure (HTTP status or connection-level).
    #[error("capture failed: {0}")]
    Capture(CameraError),

    /// Re-priming the camera after a timeout failed; priming is never
    /// retried.
    #[error("camera re-priming failed: {0}")]
    Priming(CameraError),

    /// Every capture attempt timed out.
    #[error("capture timed out on all {attempts} attempts")]
    CaptureExhausted { attempts: u32 },
}

/// What one frame cycle did, for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    /// Steps to bring the hole edge into the beam.
    pub align_steps: u64,
    /// Steps for the hole to pass the beam.
    pub clear_steps: u64,
    /// Capture attempts used (0 in dry runs).
    pub capture_attempts: u32,
    pub takeup_trimmed: bool,
    pub rebased: bool,
}

/// The film transport: gate motor, takeup motor, breakbeam, and (in scan
/// mode) the frame camera.
///
/// Construction takes ownership of all hardware handles; both motors are
/// de-energized when the transport is dropped, whatever path got there.
pub struct FilmTransport<G, T, S, C>
where
    G: StepperMotor,
    T: StepperMotor,
    S: BeamSensor,
    C: FrameCamera,
{
    gate: G,
    takeup: T,
    sensor: S,
    /// `None` runs the transport in diagnostic click mode.
    camera: Option<C>,
    config: TransportConfig,
    released: bool,
}

impl<G, T, S, C> FilmTransport<G, T, S, C>
where
    G: StepperMotor,
    T: StepperMotor,
    S: BeamSensor,
    C: FrameCamera,
{
    pub fn new(gate: G, takeup: T, sensor: S, camera: Option<C>, config: TransportConfig) -> Self {
        Self {
            gate,
            takeup,
            sensor,
            camera,
            config,
            released: false,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Advance film by one frame.
    ///
    /// `frame_index` is the zero-based index of the frame being processed;
    /// the maintenance periods count completed frames, so frame index 2
    /// completes the third frame.
    pub fn advance_frame(&mut self, frame_index: u64) -> Result<FrameStats, TransportError> {
        let dir = self.config.advance_direction;
        let style = self.config.advance_style;
        let mut stats = FrameStats::default();
        let mut phase = CyclePhase::Align;

        loop {
            match phase {
                CyclePhase::Align => {
                    stats.align_steps = seek(
                        &mut self.gate,
                        &mut self.sensor,
                        BeamState::Blocked,
                        dir,
                        style,
                        &self.config.seek,
                    )?;
                    phase = CyclePhase::Expose;
                }
                CyclePhase::Expose => {
                    stats.capture_attempts = self.expose()?;
                    phase = CyclePhase::ClearHole;
                }
                CyclePhase::ClearHole => {
                    stats.clear_steps = seek(
                        &mut self.gate,
                        &mut self.sensor,
                        BeamState::Clear,
                        dir,
                        style,
                        &self.config.seek,
                    )?;
                    phase = CyclePhase::Overshoot;
                }
                CyclePhase::Overshoot => {
                    rotate(
                        &mut self.gate,
                        dir,
                        style,
                        self.config.overshoot_steps,
                        self.config.seek.step_interval,
                    )?;
                    phase = CyclePhase::Maintain;
                }
                CyclePhase::Maintain => {
                    self.maintain(frame_index + 1, &mut stats)?;
                    break;
                }
            }
        }

        debug!(
            "frame {} cycle: align {} steps, clear {} steps",
            frame_index, stats.align_steps, stats.clear_steps
        );
        Ok(stats)
    }

    /// Capture the aligned frame, or click through it in dry runs.
    ///
    /// Capture recovery: a deadline miss gets a short pause, a camera
    /// re-prime (zoom, then focus lock - the app drops its settings when it
    /// wedges) and a retry, up to the configured attempt count. A failed
    /// re-prime and any non-timeout failure are immediately fatal.
    fn expose(&mut self) -> Result<u32, TransportError> {
        let Some(camera) = self.camera.as_mut() else {
            // Dry run: hold where the capture would happen so the circuit
            // timing can be checked by ear against the gate.
            debug!("click");
            thread::sleep(self.config.click_pause);
            return Ok(0);
        };

        let attempts = self.config.capture_attempts;
        for attempt in 1..=attempts {
            match camera.capture() {
                Ok(()) => {
                    debug!("frame captured on attempt {}", attempt);
                    return Ok(attempt);
                }
                Err(CameraError::Timeout) => {
                    warn!("capture attempt {}/{} timed out", attempt, attempts);
                    if attempt == attempts {
                        break;
                    }
                    thread::sleep(self.config.capture_retry_pause);
                    camera
                        .set_zoom(self.config.camera_zoom_percent)
                        .map_err(TransportError::Priming)?;
                    camera
                        .set_focus_mode(FocusMode::Off)
                        .map_err(TransportError::Priming)?;
                }
                Err(e) => return Err(TransportError::Capture(e)),
            }
        }
        Err(TransportError::CaptureExhausted { attempts })
    }

    /// Run the maintenance actions due after `completed_frames` frames:
    /// takeup trim before rebase, both may fire on the same frame.
    fn maintain(
        &mut self,
        completed_frames: u64,
        stats: &mut FrameStats,
    ) -> Result<(), TransportError> {
        if self.config.takeup_period > 0 && completed_frames % self.config.takeup_period == 0 {
            info!("takeup trim at frame {}", completed_frames);
            rotate(
                &mut self.takeup,
                self.config.advance_direction,
                self.config.takeup_style,
                self.config.takeup_trim_steps,
                self.config.seek.step_interval,
            )?;
            // The spool holds tension mechanically; don't cook the coils
            // between trims.
            self.takeup.release()?;
            stats.takeup_trimmed = true;
        }

        if let Some(period) = self.config.rebase_period {
            if period > 0 && completed_frames % period == 0 {
                self.rebase()?;
                stats.rebased = true;
            }
        }
        Ok(())
    }

    /// Re-derive sprocket alignment from the hole edge approached in
    /// reverse, correcting cumulative drift between grabber cycles and
    /// sprocket pitch.
    fn rebase(&mut self) -> Result<(), TransportError> {
        let fwd = self.config.advance_direction;
        let rev = fwd.opposite();
        let style = self.config.advance_style;

        info!("rebasing sprocket alignment");
        seek(
            &mut self.gate,
            &mut self.sensor,
            BeamState::Blocked,
            rev,
            style,
            &self.config.seek,
        )?;
        seek(
            &mut self.gate,
            &mut self.sensor,
            BeamState::Clear,
            rev,
            style,
            &self.config.seek,
        )?;
        // Finding the previous prong in reverse doubles as a drift check:
        // this count should match the clear span of the sprocket pitch.
        let pitch_steps = seek(
            &mut self.gate,
            &mut self.sensor,
            BeamState::Blocked,
            rev,
            style,
            &self.config.seek,
        )?;
        debug!("reverse pitch located in {} steps", pitch_steps);

        seek(
            &mut self.gate,
            &mut self.sensor,
            BeamState::Clear,
            fwd,
            style,
            &self.config.seek,
        )?;
        rotate(
            &mut self.gate,
            fwd,
            style,
            self.config.overshoot_steps,
            self.config.seek.step_interval,
        )?;
        Ok(())
    }

    /// De-energize both motors. Runs on every session exit path; also the
    /// drop backstop if a caller never got the chance.
    pub fn release_motors(&mut self) -> Result<(), MotorError> {
        let gate = self.gate.release();
        let takeup = self.takeup.release();
        self.released = true;
        gate.and(takeup)
    }
}

impl<G, T, S, C> Drop for FilmTransport<G, T, S, C>
where
    G: StepperMotor,
    T: StepperMotor,
    S: BeamSensor,
    C: FrameCamera,
{
    fn drop(&mut self) {
        if !self.released {
            let _ = self.gate.release();
            let _ = self.takeup.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use shared::rig_interface::sim::{
        CountingMotor, GateMotor, GateSensor, GateSim, ScriptedCamera,
    };
    use shared::rig_interface::StepStyle;

    use crate::motion::SeekBudget;

    type SimTransport = FilmTransport<GateMotor, CountingMotor, GateSensor, ScriptedCamera>;

    fn test_config() -> TransportConfig {
        TransportConfig {
            overshoot_steps: 4,
            takeup_period: 3,
            takeup_trim_steps: 16,
            rebase_period: None,
            seek: SeekBudget {
                step_budget: 100,
                max_retries: 2,
                cooldown: Duration::ZERO,
                step_interval: None,
            },
            click_pause: Duration::ZERO,
            capture_retry_pause: Duration::ZERO,
            ..TransportConfig::default()
        }
    }

    /// Transport over a 12-step-pitch gate (4 blocked, 8 clear).
    fn test_transport(
        camera: Option<ScriptedCamera>,
        config: TransportConfig,
    ) -> (SimTransport, GateSim, CountingMotor) {
        let sim = GateSim::new(12, 4);
        let takeup = CountingMotor::new();
        let transport =
            FilmTransport::new(sim.motor(), takeup.clone(), sim.sensor(), camera, config);
        (transport, sim, takeup)
    }

    #[test]
    fn frame_cycle_walks_hole_and_overshoots() {
        let (mut transport, sim, _) = test_transport(Some(ScriptedCamera::always_ok()), {
            let mut c = test_config();
            c.takeup_period = 0;
            c
        });

        // Gate starts with a sprocket edge in the beam: alignment is free.
        let stats = transport.advance_frame(0).unwrap();
        assert_eq!(stats.align_steps, 0);
        assert_eq!(stats.clear_steps, 4);
        assert_eq!(sim.position(), 8); // 4 to clear + 4 overshoot

        // Next cycle has to walk to the following hole first.
        let stats = transport.advance_frame(1).unwrap();
        assert_eq!(stats.align_steps, 4);
        assert_eq!(stats.clear_steps, 4);
        assert_eq!(sim.position(), 20);
    }

    #[test]
    fn dry_run_clicks_without_a_camera() {
        let (mut transport, _, _) = test_transport(None, test_config());

        let stats = transport.advance_frame(0).unwrap();
        assert_eq!(stats.capture_attempts, 0);
    }

    #[test]
    fn capture_timeouts_are_retried_after_repriming() {
        let camera = ScriptedCamera::with_outcomes(vec![
            Err(CameraError::Timeout),
            Err(CameraError::Timeout),
            Ok(()),
        ]);
        let (mut transport, _, _) = test_transport(Some(camera.clone()), test_config());

        let stats = transport.advance_frame(0).unwrap();
        assert_eq!(stats.capture_attempts, 3);
        assert_eq!(camera.captures(), 3);
        // One re-prime (zoom + focus) per timeout that still had retries.
        assert_eq!(camera.zoom_calls(), 2);
        assert_eq!(camera.focus_calls(), 2);
    }

    #[test]
    fn non_timeout_capture_failure_is_immediately_fatal() {
        let camera = ScriptedCamera::with_outcomes(vec![Err(CameraError::Status(500))]);
        let (mut transport, _, _) = test_transport(Some(camera.clone()), test_config());

        match transport.advance_frame(0) {
            Err(TransportError::Capture(CameraError::Status(500))) => {}
            other => panic!("expected fatal capture error, got {other:?}"),
        }
        assert_eq!(camera.captures(), 1);
        assert_eq!(camera.zoom_calls(), 0);
    }

    #[test]
    fn exhausted_capture_timeouts_are_fatal() {
        let camera = ScriptedCamera::with_outcomes(vec![
            Err(CameraError::Timeout),
            Err(CameraError::Timeout),
            Err(CameraError::Timeout),
        ]);
        let (mut transport, _, _) = test_transport(Some(camera.clone()), test_config());

        match transport.advance_frame(0) {
            Err(TransportError::CaptureExhausted { attempts: 3 }) => {}
            other => panic!("expected CaptureExhausted, got {other:?}"),
        }
        // The final timeout is not followed by a re-prime.
        assert_eq!(camera.zoom_calls(), 2);
    }

    #[test]
    fn failed_repriming_is_fatal_and_never_retried() {
        let camera = ScriptedCamera::with_outcomes(vec![Err(CameraError::Timeout)])
            .fail_priming(CameraError::Status(404));
        let (mut transport, _, _) = test_transport(Some(camera.clone()), test_config());

        match transport.advance_frame(0) {
            Err(TransportError::Priming(CameraError::Status(404))) => {}
            other => panic!("expected priming error, got {other:?}"),
        }
        assert_eq!(camera.zoom_calls(), 1);
        assert_eq!(camera.captures(), 1);
    }

    #[test]
    fn maintenance_schedule_over_twenty_four_frames() {
        let mut config = test_config();
        config.takeup_period = 3;
        config.rebase_period = Some(24);
        let (mut transport, sim, takeup) =
            test_transport(Some(ScriptedCamera::always_ok()), config);

        let mut trims = 0;
        let mut rebases = 0;
        for frame in 0..24 {
            let stats = transport.advance_frame(frame).unwrap();
            if stats.takeup_trimmed {
                trims += 1;
            }
            if stats.rebased {
                rebases += 1;
                // The rebase fires on the final frame of the period.
                assert_eq!(frame, 23);
                // And on that frame the takeup trim ran too (24 % 3 == 0).
                assert!(stats.takeup_trimmed);
            }
        }

        assert_eq!(trims, 8);
        assert_eq!(rebases, 1);
        assert_eq!(takeup.step_count(), u64::from(transport.config().takeup_trim_steps) * 8);
        assert_eq!(takeup.releases(), 8);
        // Only the rebase moves the gate in reverse.
        assert!(sim.reverse_steps() > 0);
    }

    #[test]
    fn takeup_trim_uses_microsteps_on_the_takeup_motor() {
        let mut config = test_config();
        config.takeup_period = 1;
        let (mut transport, _, takeup) = test_transport(Some(ScriptedCamera::always_ok()), config);

        transport.advance_frame(0).unwrap();
        assert_eq!(takeup.step_count(), 16);
        assert_eq!(takeup.last_style(), Some(StepStyle::Microstep));
    }

    #[test]
    fn release_motors_hits_both_and_is_idempotent() {
        let (mut transport, sim, takeup) = test_transport(None, test_config());

        transport.release_motors().unwrap();
        assert_eq!(sim.releases(), 1);
        assert_eq!(takeup.releases(), 1);

        transport.release_motors().unwrap();
        assert_eq!(sim.releases(), 2);
    }

    #[test]
    fn drop_releases_unreleased_motors() {
        let (transport, sim, takeup) = test_transport(None, test_config());
        drop(transport);
        assert_eq!(sim.releases(), 1);
        assert_eq!(takeup.releases(), 1);
    }
}
