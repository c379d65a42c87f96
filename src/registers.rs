//! Register maps for each supported chip.
//!
//! All of the tables here are `'static` and never change at run time. A
//! [`Chip`](crate::Chip) picks one of them when it is constructed.

use core::ops::RangeInclusive;
use core::str::FromStr;

use crate::Error;

//
// Public Types
//

/// The PCA parts this crate can drive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// PCA9685: 16-channel, 12-bit PWM / LED controller
    Pca9685,
    /// PCA9535 or PCA9555: 16-pin I/O expander
    Pca9535,
    /// PCA9538 or PCA9554: 8-pin I/O expander
    Pca9538,
}

/// Describes one addressable register (or a run of contiguous registers
/// that are always accessed together).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register {
    /// Register address (the I²C command byte)
    pub address: u8,
    /// Size in bytes. Multi-byte registers are little-endian on the wire.
    pub width: u8,
    /// Bits which carry data. Reserved bits are masked off on read.
    pub mask: u32,
    /// Smallest value the register accepts
    pub min: u32,
    /// Largest value the register accepts
    pub max: u32,
    /// Whether the chip steps the register address on for each byte, so
    /// the whole register can go in one transaction
    pub auto_increment: bool,
}

/// Layout of a PWM controller.
#[derive(Debug, PartialEq, Eq)]
pub struct PwmMap {
    /// MODE1: sleep, auto-increment, restart, sub-addresses
    pub mode1: Register,
    /// MODE2: output inversion and driver configuration
    pub mode2: Register,
    /// The on/off tick registers of channel 0
    pub channel0: Register,
    /// Distance between the register blocks of adjacent channels
    pub channel_stride: u8,
    /// How many output channels there are
    pub channel_count: u8,
    /// The on/off tick registers that address every channel at once
    pub all_channels: Register,
    /// Oscillator prescaler. Only writable while the chip sleeps.
    pub prescale: Register,
    /// Bits of PWM resolution. The next bit up is the full on/off flag.
    pub resolution_bits: u8,
    /// Frequency of the internal oscillator
    pub oscillator_hz: u32,
    /// How long the oscillator needs after leaving sleep
    pub settle_us: u16,
}

/// Layout of an I/O expander.
#[derive(Debug, PartialEq, Eq)]
pub struct ExpanderMap {
    /// Number of I/O pins
    pub pin_count: u8,
    /// Input port (read-only)
    pub input: Register,
    /// Output port latch
    pub output: Register,
    /// Input polarity inversion
    pub polarity: Register,
    /// Direction. A set bit makes the pin an input.
    pub config: Register,
}

/// The register layout of one variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterMap {
    /// A PWM / LED controller
    Pwm(&'static PwmMap),
    /// A GPIO expander
    Expander(&'static ExpanderMap),
}

//
// Public Data
//

/// The PCA9685 register layout.
///
/// See datasheet section 7.3.
pub static PCA9685: PwmMap = PwmMap {
    mode1: byte(0x00),
    mode2: byte(0x01),
    channel0: ticks(0x06),
    channel_stride: 4,
    channel_count: 16,
    all_channels: ticks(0xFA),
    prescale: Register {
        address: 0xFE,
        width: 1,
        mask: 0xFF,
        min: 3,
        max: 255,
        auto_increment: false,
    },
    resolution_bits: 12,
    oscillator_hz: 25_000_000,
    settle_us: 500,
};

/// The PCA9535 / PCA9555 register layout. Registers come in pairs, one per
/// 8-bit port, and the chip toggles between the two of a pair by itself.
pub static PCA9535: ExpanderMap = ExpanderMap {
    pin_count: 16,
    input: port16(0x00),
    output: port16(0x02),
    polarity: port16(0x04),
    config: port16(0x06),
};

/// The PCA9538 / PCA9554 register layout.
pub static PCA9538: ExpanderMap = ExpanderMap {
    pin_count: 8,
    input: byte(0x00),
    output: byte(0x01),
    polarity: byte(0x02),
    config: byte(0x03),
};

//
// Public Functions
//

/// Get the register layout for a variant.
pub fn register_map(variant: Variant) -> RegisterMap {
    match variant {
        Variant::Pca9685 => RegisterMap::Pwm(&PCA9685),
        Variant::Pca9535 => RegisterMap::Expander(&PCA9535),
        Variant::Pca9538 => RegisterMap::Expander(&PCA9538),
    }
}

/// Get the register layout for a variant given by name, e.g. `"pca9685"`.
pub fn register_map_for_tag(tag: &str) -> Result<RegisterMap, Error> {
    tag.parse::<Variant>().map(register_map)
}

//
// impls on Public Types
//

impl FromStr for Variant {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        const TAGS: [(&str, Variant); 6] = [
            ("pca9685", Variant::Pca9685),
            ("16-channel-pwm", Variant::Pca9685),
            ("pca9535", Variant::Pca9535),
            ("pca9555", Variant::Pca9535),
            ("pca9538", Variant::Pca9538),
            ("pca9554", Variant::Pca9538),
        ];
        TAGS.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(tag.trim()))
            .map(|(_, variant)| *variant)
            .ok_or(Error::UnsupportedVariant)
    }
}

impl Register {
    /// The range of values the register accepts.
    pub fn range(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    /// Check a value will fit in this register.
    pub fn check(&self, value: u32) -> Result<u32, Error> {
        if self.range().contains(&value) && value & !self.mask == 0 {
            Ok(value)
        } else {
            Err(Error::OutOfRange)
        }
    }

    /// The register `bytes` further on from this one, with the same shape.
    const fn offset(self, bytes: u8) -> Register {
        Register {
            address: self.address + bytes,
            ..self
        }
    }
}

impl PwmMap {
    /// The on/off tick registers for one channel.
    pub fn channel(&self, index: u8) -> Result<Register, Error> {
        if index < self.channel_count {
            Ok(self.channel0.offset(index * self.channel_stride))
        } else {
            Err(Error::ChannelOutOfRange)
        }
    }

    /// The prescaler limits, as bytes.
    pub fn prescale_range(&self) -> RangeInclusive<u8> {
        (self.prescale.min as u8)..=(self.prescale.max as u8)
    }
}

impl ExpanderMap {
    /// The bit for a pin within a port register.
    pub fn pin_mask(&self, pin: u8) -> Result<u16, Error> {
        if pin < self.pin_count {
            Ok(1 << pin)
        } else {
            Err(Error::ChannelOutOfRange)
        }
    }

    /// Mask covering every pin.
    pub fn port_mask(&self) -> u16 {
        self.config.mask as u16
    }
}

impl RegisterMap {
    /// Get the PWM layout, if this is a PWM controller.
    pub fn pwm(self) -> Result<&'static PwmMap, Error> {
        match self {
            RegisterMap::Pwm(map) => Ok(map),
            RegisterMap::Expander(_) => Err(Error::UnsupportedVariant),
        }
    }

    /// Get the expander layout, if this is an I/O expander.
    pub fn expander(self) -> Result<&'static ExpanderMap, Error> {
        match self {
            RegisterMap::Expander(map) => Ok(map),
            RegisterMap::Pwm(_) => Err(Error::UnsupportedVariant),
        }
    }
}

//
// Private Functions
//

/// A plain 8-bit register.
const fn byte(address: u8) -> Register {
    Register {
        address,
        width: 1,
        mask: 0xFF,
        min: 0,
        max: 0xFF,
        auto_increment: false,
    }
}

/// A 16-bit port spread over a register pair.
const fn port16(address: u8) -> Register {
    Register {
        address,
        width: 2,
        mask: 0xFFFF,
        min: 0,
        max: 0xFFFF,
        auto_increment: true,
    }
}

/// ON_L, ON_H, OFF_L, OFF_H. Each half is 12 bits of tick plus the full
/// on/off flag in bit 12.
const fn ticks(address: u8) -> Register {
    Register {
        address,
        width: 4,
        mask: 0x1FFF_1FFF,
        min: 0,
        max: 0x1FFF_1FFF,
        auto_increment: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pca9685_channel_layout() {
        let map = register_map(Variant::Pca9685).pwm().unwrap();
        assert_eq!(map.channel(0).unwrap().address, 0x06);
        assert_eq!(map.channel(1).unwrap().address, 0x0A);
        assert_eq!(map.channel(15).unwrap().address, 0x42);
        assert_eq!(map.channel(16), Err(Error::ChannelOutOfRange));
        assert_eq!(map.prescale.address, 0xFE);
        assert_eq!(map.prescale_range(), 3..=255);
    }

    #[test]
    fn expander_layouts() {
        let map = register_map(Variant::Pca9538).expander().unwrap();
        assert_eq!(map.config.address, 0x03);
        assert_eq!(map.port_mask(), 0xFF);
        assert_eq!(map.pin_mask(7), Ok(0x80));
        assert_eq!(map.pin_mask(8), Err(Error::ChannelOutOfRange));

        let map = register_map(Variant::Pca9535).expander().unwrap();
        assert_eq!(map.output.address, 0x02);
        assert_eq!(map.output.width, 2);
        assert_eq!(map.pin_mask(15), Ok(0x8000));
    }

    #[test]
    fn tags() {
        assert_eq!("PCA9685".parse::<Variant>(), Ok(Variant::Pca9685));
        assert_eq!("16-channel-PWM".parse::<Variant>(), Ok(Variant::Pca9685));
        assert_eq!("pca9555".parse::<Variant>(), Ok(Variant::Pca9535));
        assert_eq!(
            register_map_for_tag("pca9999"),
            Err(Error::UnsupportedVariant)
        );
        assert_eq!(
            register_map(Variant::Pca9685).expander(),
            Err(Error::UnsupportedVariant)
        );
    }

    #[test]
    fn prescale_checks_range() {
        assert_eq!(PCA9685.prescale.check(2), Err(Error::OutOfRange));
        assert_eq!(PCA9685.prescale.check(3), Ok(3));
        assert_eq!(PCA9685.prescale.check(256), Err(Error::OutOfRange));
        assert_eq!(PCA9685.channel0.check(0x2000), Err(Error::OutOfRange));
    }
}

//
// End of file
//
