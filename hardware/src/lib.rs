//! Hardware drivers for the film scan rig.
//!
//! This crate provides the real adapters behind the capability traits in
//! `shared::rig_interface`. Each driver is feature-gated for optional
//! compilation.
//!
//! # Features
//!
//! ## Individual Drivers
//! - `motorkit` - Adafruit Motor HAT stepper driver (PCA9685 over I2C;
//!   opening the real bus is Linux only, the sequencing logic is not)
//! - `breakbeam` - IR breakbeam sensor via the GPIO character device
//!   (Linux only)
//! - `ipwebcam` - IP Webcam HTTP frame camera (cross-platform)
//!
//! ## Convenience Features
//! - `full-linux` - All drivers for the deployed rig

#[cfg(all(target_os = "linux", feature = "breakbeam"))]
pub mod breakbeam;

#[cfg(feature = "ipwebcam")]
pub mod ipwebcam;

#[cfg(feature = "motorkit")]
pub mod motorkit;
