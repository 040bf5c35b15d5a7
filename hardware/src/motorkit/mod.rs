//! Adafruit Motor HAT stepper driver.
//!
//! The Motor HAT is a PCA9685 16-channel PWM controller feeding two TB6612
//! dual H-bridges, which gives it two bipolar stepper ports. There is no
//! stepping intelligence on the board at all: every step is the host writing
//! new coil levels over I2C, which is what makes per-step sensor polling in
//! the transport loop possible in the first place.
//!
//! # Channel map
//!
//! From the HAT schematic (PWM = coil magnitude, IN1/IN2 = H-bridge
//! polarity):
//!
//! ```text
//! stepper 1 (ports M1+M2): PWMA=8   AIN2=9   AIN1=10  PWMB=13  BIN2=12  BIN1=11
//! stepper 2 (ports M3+M4): PWMA=2   AIN2=3   AIN1=4   PWMB=7   BIN2=6   BIN1=5
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hardware::motorkit::MotorKit;
//! use shared::rig_interface::{Direction, StepStyle, StepperMotor};
//!
//! let kit = MotorKit::open(1, 0x60)?;
//! let mut gate = kit.stepper1();
//! for _ in 0..200 {
//!     gate.step(Direction::Forward, StepStyle::Interleave)?;
//! }
//! gate.release()?;
//! # Ok::<(), shared::rig_interface::MotorError>(())
//! ```

mod pca9685;
mod stepper;

pub use pca9685::{I2cBus, Pca9685, DEFAULT_ADDRESS, PWM_FREQUENCY_HZ};
pub use stepper::{HatStepper, StepperChannels, STEPPER1, STEPPER2};

#[cfg(target_os = "linux")]
pub use pca9685::LinuxI2c;

#[cfg(target_os = "linux")]
use std::sync::{Arc, Mutex};

#[cfg(target_os = "linux")]
use shared::{rig_config::RigConfig, rig_interface::MotorError};

/// Handle to one Motor HAT with both stepper ports.
///
/// The two [`HatStepper`]s share the underlying PCA9685, so they can be
/// owned and stepped independently (gate motor and takeup motor).
#[cfg(target_os = "linux")]
pub struct MotorKit {
    pca: Arc<Mutex<Pca9685<LinuxI2c>>>,
}

#[cfg(target_os = "linux")]
impl MotorKit {
    /// Open the HAT on `/dev/i2c-{bus}` at `address` and initialize PWM.
    pub fn open(bus: u8, address: u16) -> Result<Self, MotorError> {
        let i2c = LinuxI2c::open(bus, address)?;
        let pca = Pca9685::new(i2c)?;
        Ok(Self {
            pca: Arc::new(Mutex::new(pca)),
        })
    }

    /// Open the HAT described by the rig config.
    pub fn from_config(config: &RigConfig) -> Result<Self, MotorError> {
        Self::open(config.i2c_bus, config.motor_hat_address)
    }

    /// Stepper on ports M1+M2.
    pub fn stepper1(&self) -> HatStepper<LinuxI2c> {
        HatStepper::new(self.pca.clone(), STEPPER1)
    }

    /// Stepper on ports M3+M4.
    pub fn stepper2(&self) -> HatStepper<LinuxI2c> {
        HatStepper::new(self.pca.clone(), STEPPER2)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::I2cBus;

    /// Bus double that records every write for sequencing assertions.
    #[derive(Clone, Default)]
    pub struct RecordingBus {
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Last commanded (on, off) counts per PWM channel, decoded from the
        /// recorded register writes.
        pub fn channel_states(&self) -> std::collections::HashMap<u8, (u16, u16)> {
            let mut states = std::collections::HashMap::new();
            for write in self.writes.lock().unwrap().iter() {
                // 5-byte writes starting at a LED register are channel updates;
                // everything else is mode/prescale setup.
                if write.len() == 5 && write[0] >= 0x06 && write[0] < 0x06 + 64 {
                    let channel = (write[0] - 0x06) / 4;
                    let on = u16::from_le_bytes([write[1], write[2]]);
                    let off = u16::from_le_bytes([write[3], write[4]]);
                    states.insert(channel, (on, off));
                }
            }
            states
        }
    }

    impl I2cBus for RecordingBus {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }
}
