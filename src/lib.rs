//! # PCA I²C Driver
//!
//! This is a driver for the NXP / TI PCA family of I²C peripherals:
//!
//! * PCA9685 - 16-channel, 12-bit PWM / LED controller
//! * PCA9535 / PCA9555 - 16-pin I/O expander
//! * PCA9538 / PCA9554 - 8-pin I/O expander
//!
//! Each chip on the bus gets a [`Chip`] object, created with its 7-bit
//! address and its [`Variant`]. The [`Chip`] keeps a cache of the registers
//! it has written or read, so pin and channel updates don't have to read
//! the chip back first. A write that fails never updates the cache, and it
//! makes the [`Chip`] re-read the MODE1 register before trusting it again.
//!
//! The [`Chip`] doesn't own the I²C bus. You pass the bus in to each call,
//! which lets several chips share one bus.
//!
//! A PWM controller powers up asleep. The first channel write wakes it, and
//! after that putting it to sleep and waking it is up to you. Waking needs
//! the oscillator to settle for 500 µs, so anything that might wake the chip
//! takes a delay provider from you.
//!
//! # Example
//!
//! You might drive a PCA9685 like this:
//!
//! ```rust
//! # use embedded_hal::blocking::i2c::{SevenBitAddress, Write, WriteRead};
//! # use embedded_hal::blocking::delay::DelayUs;
//! # struct I2c;
//! # impl Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _: SevenBitAddress, _: &[u8]) -> Result<(), ()> {
//! #         Ok(())
//! #     }
//! # }
//! # impl WriteRead for I2c {
//! #     type Error = ();
//! #     fn write_read(
//! #         &mut self,
//! #         _: SevenBitAddress,
//! #         _: &[u8],
//! #         buffer: &mut [u8],
//! #     ) -> Result<(), ()> {
//! #         buffer.fill(0);
//! #         Ok(())
//! #     }
//! # }
//! # struct Delay;
//! # impl DelayUs<u16> for Delay {
//! #     fn delay_us(&mut self, _: u16) {}
//! # }
//! # let mut i2c = I2c;
//! # let mut delay = Delay;
//! let mut pwm = pca_i2c::Chip::new(0x40, pca_i2c::Variant::Pca9685).unwrap();
//! if let Err(e) = pwm.init(&mut i2c, &mut delay, &pca_i2c::OutputConfig::default()) {
//!     // Chip didn't respond
//! }
//! pwm.set_pwm_frequency(&mut i2c, &mut delay, 1000.0).unwrap();
//! pwm.set_duty_cycle(&mut i2c, &mut delay, 0, 0.5).unwrap();
//! pwm.set_duty_cycle(&mut i2c, &mut delay, 1, 1.0).unwrap();
//! assert_eq!(pwm.duty_cycle(0).unwrap(), Some(0.5));
//! ```
//!
//! And an expander like this:
//!
//! ```rust
//! # use embedded_hal::blocking::i2c::{SevenBitAddress, Write, WriteRead};
//! # use embedded_hal::digital::v2::PinState;
//! # struct I2c;
//! # impl Write for I2c {
//! #     type Error = ();
//! #     fn write(&mut self, _: SevenBitAddress, _: &[u8]) -> Result<(), ()> {
//! #         Ok(())
//! #     }
//! # }
//! # impl WriteRead for I2c {
//! #     type Error = ();
//! #     fn write_read(
//! #         &mut self,
//! #         _: SevenBitAddress,
//! #         _: &[u8],
//! #         buffer: &mut [u8],
//! #     ) -> Result<(), ()> {
//! #         buffer.fill(0xFF);
//! #         Ok(())
//! #     }
//! # }
//! # let mut i2c = I2c;
//! let mut gpio = pca_i2c::Chip::from_tag(0x20, "pca9555").unwrap();
//! gpio.set_pin_direction(&mut i2c, 3, pca_i2c::Direction::Output).unwrap();
//! gpio.write_pin(&mut i2c, 3, PinState::Low).unwrap();
//! let button = gpio.read_pin(&mut i2c, 8).unwrap();
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]

mod bus;
pub mod chip;
pub mod codec;
pub mod convert;
mod error;
pub mod mode;
pub mod registers;

pub use chip::{
    ChannelState, Chip, Direction, OutputConfig, OutputDriver, OutputWhenDisabled,
    DEFAULT_OUTPUT_CONFIG,
};
pub use convert::Ticks;
pub use error::Error;
pub use mode::{Mode1, Mode2, ModeState};
pub use registers::{Register, RegisterMap, Variant};

//
// End of file
//
