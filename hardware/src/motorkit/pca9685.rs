//! PCA9685 16-channel PWM controller over I2C.
//!
//! Register-level driver for the PWM chip on the Motor HAT. Each of the 16
//! channels has a 12-bit on-count and off-count (registers `LED{n}_ON_L`
//! through `LED{n}_OFF_H`, base 0x06, stride 4); the special full-on and
//! full-off bits live in bit 4 of the high bytes. MODE1 auto-increment is
//! enabled at init so a channel update is a single 5-byte write.
//!
//! The oscillator is the internal 25 MHz one; PWM frequency is set through
//! the prescaler per the datasheet formula
//! `prescale = round(25 MHz / (4096 * freq)) - 1`, which requires putting
//! the chip to sleep around the prescale write.

use std::io;

#[cfg(target_os = "linux")]
use tracing::debug;

/// Default I2C address of the Motor HAT.
pub const DEFAULT_ADDRESS: u16 = 0x60;

/// PWM frequency used for motor drive. The TB6612 bridges are happy well
/// above audible; 1.6 kHz matches the HAT's stock drive frequency.
pub const PWM_FREQUENCY_HZ: f64 = 1600.0;

const OSCILLATOR_HZ: f64 = 25_000_000.0;

const REG_MODE1: u8 = 0x00;
const REG_PRESCALE: u8 = 0xFE;
const REG_LED0_ON_L: u8 = 0x06;
const REG_ALL_LED_ON_L: u8 = 0xFA;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

/// Byte-write access to the chip.
///
/// The real implementation is [`LinuxI2c`]; tests substitute a recording
/// double so coil sequencing can be verified without a bus.
pub trait I2cBus {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// I2C device node access via `/dev/i2c-*`.
#[cfg(target_os = "linux")]
pub struct LinuxI2c {
    file: std::fs::File,
}

#[cfg(target_os = "linux")]
impl LinuxI2c {
    const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// Open bus `N` (`/dev/i2c-N`) and bind the target address.
    pub fn open(bus: u8, address: u16) -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let path = format!("/dev/i2c-{bus}");
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)?;

        let rc = unsafe {
            libc::ioctl(file.as_raw_fd(), Self::I2C_SLAVE, libc::c_ulong::from(address))
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("opened {} at address {:#04x}", path, address);
        Ok(Self { file })
    }
}

#[cfg(target_os = "linux")]
impl I2cBus for LinuxI2c {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.file.write_all(bytes)
    }
}

/// Prescale value for a target PWM frequency.
fn prescale_for(freq_hz: f64) -> u8 {
    ((OSCILLATOR_HZ / (4096.0 * freq_hz)).round() as u8).saturating_sub(1)
}

/// PCA9685 driver over any [`I2cBus`].
pub struct Pca9685<B: I2cBus> {
    bus: B,
}

impl<B: I2cBus> Pca9685<B> {
    /// Initialize the chip: all channels off, auto-increment on, PWM at
    /// [`PWM_FREQUENCY_HZ`].
    pub fn new(bus: B) -> io::Result<Self> {
        let mut pca = Self { bus };
        pca.write_register(REG_MODE1, MODE1_AUTO_INCREMENT)?;
        pca.all_off()?;
        pca.set_pwm_freq(PWM_FREQUENCY_HZ)?;
        Ok(pca)
    }

    fn write_register(&mut self, register: u8, value: u8) -> io::Result<()> {
        self.bus.write(&[register, value])
    }

    /// Set the PWM frequency via the prescaler.
    ///
    /// The prescale register is only writable while the oscillator sleeps,
    /// and the datasheet requires 500 us after wake before a restart.
    pub fn set_pwm_freq(&mut self, freq_hz: f64) -> io::Result<()> {
        let prescale = prescale_for(freq_hz);
        self.write_register(REG_MODE1, MODE1_AUTO_INCREMENT | MODE1_SLEEP)?;
        self.write_register(REG_PRESCALE, prescale)?;
        self.write_register(REG_MODE1, MODE1_AUTO_INCREMENT)?;
        std::thread::sleep(std::time::Duration::from_micros(500));
        self.write_register(REG_MODE1, MODE1_AUTO_INCREMENT | MODE1_RESTART)?;
        Ok(())
    }

    /// Set a channel's duty cycle from a 16-bit fraction.
    ///
    /// 0 maps to the full-off bit, `0xFFFF` to the full-on bit, everything
    /// between to a 12-bit off-count with the on-count at 0.
    pub fn set_duty(&mut self, channel: u8, duty: u16) -> io::Result<()> {
        debug_assert!(channel < 16, "PCA9685 has 16 channels");
        let (on, off): (u16, u16) = match duty {
            0 => (0, 0x1000),
            0xFFFF => (0x1000, 0),
            d => (0, d >> 4),
        };
        let register = REG_LED0_ON_L + 4 * channel;
        self.bus.write(&[
            register,
            on.to_le_bytes()[0],
            on.to_le_bytes()[1],
            off.to_le_bytes()[0],
            off.to_le_bytes()[1],
        ])
    }

    /// Drive a channel fully on or fully off (H-bridge direction pins).
    pub fn set_full(&mut self, channel: u8, on: bool) -> io::Result<()> {
        self.set_duty(channel, if on { 0xFFFF } else { 0 })
    }

    /// Turn every channel off via the ALL_LED registers.
    pub fn all_off(&mut self) -> io::Result<()> {
        self.bus.write(&[REG_ALL_LED_ON_L, 0, 0, 0, 0x10])
    }
}
