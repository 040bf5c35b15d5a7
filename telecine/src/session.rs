//! Scan session driver.
//!
//! Owns the loop around [`FilmTransport::advance_frame`]: frame counting,
//! the per-cycle interrupt check, progress reporting, and guaranteed motor
//! release on every exit path. The interrupt flag is polled exactly once
//! per cycle, at the top of the loop - a cycle in progress always runs to
//! completion so film is never left mid-sprocket with the motor half-way
//! through an overshoot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shared::rig_interface::{BeamSensor, FrameCamera, StepperMotor};
use tracing::{error, info, warn};

use crate::transport::{FilmTransport, TransportError};

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Reached the requested frame count.
    Completed,
    /// Stopped at a frame boundary by the interrupt flag.
    Interrupted,
}

/// Result of a finished session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub outcome: SessionOutcome,
}

/// Drives a [`FilmTransport`] through a run of frames.
pub struct Session<G, T, S, C>
where
    G: StepperMotor,
    T: StepperMotor,
    S: BeamSensor,
    C: FrameCamera,
{
    transport: FilmTransport<G, T, S, C>,
    interrupt: Arc<AtomicBool>,
}

impl<G, T, S, C> Session<G, T, S, C>
where
    G: StepperMotor,
    T: StepperMotor,
    S: BeamSensor,
    C: FrameCamera,
{
    pub fn new(transport: FilmTransport<G, T, S, C>, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            transport,
            interrupt,
        }
    }

    /// Run for `frames` cycles, or until interrupted when `None`.
    ///
    /// The motors are de-energized before this returns, on every path -
    /// completion, interrupt, and fatal errors alike.
    pub fn run(&mut self, frames: Option<u64>) -> Result<SessionSummary, TransportError> {
        let mut processed: u64 = 0;
        let result = self.cycle_loop(frames, &mut processed);

        if let Err(e) = self.transport.release_motors() {
            warn!("motor release failed: {}", e);
        }

        match result {
            Ok(outcome) => {
                info!("session finished: {} frames processed", processed);
                Ok(SessionSummary {
                    frames_processed: processed,
                    outcome,
                })
            }
            Err(e) => {
                error!("session aborted after {} frames: {}", processed, e);
                Err(e)
            }
        }
    }

    fn cycle_loop(
        &mut self,
        frames: Option<u64>,
        processed: &mut u64,
    ) -> Result<SessionOutcome, TransportError> {
        loop {
            if let Some(target) = frames {
                if *processed >= target {
                    return Ok(SessionOutcome::Completed);
                }
            }
            // The only cancellation point.
            if self.interrupt.load(Ordering::Relaxed) {
                info!("interrupt received; stopping at frame boundary");
                return Ok(SessionOutcome::Interrupted);
            }

            info!("processing frame #{}", processed);
            self.transport.advance_frame(*processed)?;
            *processed += 1;
        }
    }
}
