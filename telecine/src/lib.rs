//! Film transport control logic.
//!
//! This crate turns the rig's capabilities (stepper motors, gate breakbeam,
//! frame camera) into a reliable per-frame scan cycle that can run
//! unattended through a full reel:
//!
//! - [`motion`] - fixed-count rotation and budgeted, cool-down-retried
//!   seeking against the gate breakbeam.
//! - [`transport`] - the frame-advance cycle: align on a sprocket hole,
//!   expose, clear the hole, overshoot, periodic takeup tension trims and
//!   sprocket re-synchronization.
//! - [`session`] - the outer loop: frame counting, interrupt handling at
//!   frame boundaries, guaranteed motor release.
//! - [`config`] - transport tuning derived from the rig configuration.
//!
//! Everything is generic over the capability traits in
//! `shared::rig_interface`, so the whole stack runs identically against the
//! real drivers in `hardware` and the deterministic gate simulator used by
//! the tests.

pub mod config;
pub mod motion;
pub mod session;
pub mod transport;

pub use config::TransportConfig;
pub use motion::{rotate, seek, MotionError, SeekBudget};
pub use session::{Session, SessionOutcome, SessionSummary};
pub use transport::{CyclePhase, FilmTransport, FrameStats, TransportError};
