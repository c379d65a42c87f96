//! Conversions between physical units and raw register values.
//!
//! Nothing in here touches the bus.

use core::ops::RangeInclusive;

use embedded_hal::digital::v2::PinState;

use crate::Error;

//
// Public Types
//

/// The on and off points of one PWM channel, in counter ticks.
///
/// Bit `resolution_bits` of each value is the chip's "full on" / "full off"
/// flag. When the off flag is set the output is off regardless of anything
/// else.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticks {
    /// Counter value at which the output turns on
    pub on: u16,
    /// Counter value at which the output turns off
    pub off: u16,
}

//
// Public Functions
//

/// Convert a duty cycle (0.0 to 1.0) into an on/off tick pair.
///
/// 0.0 and 1.0 use the full-off and full-on flags. Anything in between is
/// rounded to the nearest tick, but never to 0 or to a whole period, so it
/// always produces an actual pulse.
pub fn duty_to_ticks(percent: f32, resolution_bits: u8) -> Result<Ticks, Error> {
    let period = period(resolution_bits)?;
    if !(0.0..=1.0).contains(&percent) {
        return Err(Error::OutOfRange);
    }
    let ticks = if percent == 0.0 {
        Ticks::full_off(resolution_bits)?
    } else if percent == 1.0 {
        Ticks::full_on(resolution_bits)?
    } else {
        let off = libm::roundf(percent * period as f32) as u32;
        Ticks {
            on: 0,
            off: off.clamp(1, period - 1) as u16,
        }
    };
    Ok(ticks)
}

/// Convert an on/off tick pair back into a duty cycle.
pub fn ticks_to_duty(ticks: Ticks, resolution_bits: u8) -> f32 {
    let Ok(period) = period(resolution_bits) else {
        return 0.0;
    };
    let flag = period as u16;
    if ticks.off & flag != 0 {
        0.0
    } else if ticks.on & flag != 0 {
        1.0
    } else {
        let mask = period - 1;
        let on = u32::from(ticks.on) & mask;
        let off = u32::from(ticks.off) & mask;
        (off.wrapping_sub(on) & mask) as f32 / period as f32
    }
}

/// Work out the prescaler for a PWM frequency.
///
/// This is `round(oscillator_hz / (4096 * hz)) - 1`. If the answer falls
/// outside `range` the frequency can't be produced and you get
/// [`Error::OutOfRange`] rather than the nearest one.
pub fn frequency_to_prescaler(
    hz: f32,
    oscillator_hz: u32,
    range: RangeInclusive<u8>,
) -> Result<u8, Error> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(Error::OutOfRange);
    }
    let divider = libm::roundf(oscillator_hz as f32 / (4096.0 * hz)) - 1.0;
    if divider < f32::from(*range.start()) || divider > f32::from(*range.end()) {
        return Err(Error::OutOfRange);
    }
    Ok(divider as u8)
}

/// The PWM frequency a given prescaler produces.
pub fn prescaler_to_frequency(prescale: u8, oscillator_hz: u32) -> f32 {
    oscillator_hz as f32 / (4096.0 * (f32::from(prescale) + 1.0))
}

/// Set or clear one pin's bit in a port register value.
pub fn pin_level_to_bits(port: u16, pin_mask: u16, level: PinState) -> u16 {
    match level {
        PinState::High => port | pin_mask,
        PinState::Low => port & !pin_mask,
    }
}

/// Get one pin's level out of a port register value.
pub fn bits_to_pin_level(port: u16, pin_mask: u16) -> PinState {
    PinState::from(port & pin_mask != 0)
}

//
// impls on Public Types
//

impl Ticks {
    /// Output permanently off.
    ///
    /// Fails with [`Error::OutOfRange`] unless `resolution_bits` is 1 to 15.
    pub fn full_off(resolution_bits: u8) -> Result<Ticks, Error> {
        let flag = period(resolution_bits)? as u16;
        Ok(Ticks { on: 0, off: flag })
    }

    /// Output permanently on. Same limits as [`Ticks::full_off`].
    pub fn full_on(resolution_bits: u8) -> Result<Ticks, Error> {
        let flag = period(resolution_bits)? as u16;
        Ok(Ticks { on: flag, off: 0 })
    }

    /// Register payload: ON_L, ON_H, OFF_L, OFF_H.
    pub fn to_bytes(self) -> [u8; 4] {
        let [on_l, on_h] = self.on.to_le_bytes();
        let [off_l, off_h] = self.off.to_le_bytes();
        [on_l, on_h, off_l, off_h]
    }

    /// Split a decoded 32-bit register value.
    pub fn from_raw(raw: u32) -> Ticks {
        Ticks {
            on: raw as u16,
            off: (raw >> 16) as u16,
        }
    }

    /// Pack into a 32-bit register value.
    pub fn to_raw(self) -> u32 {
        u32::from(self.on) | u32::from(self.off) << 16
    }
}

//
// Private Functions
//

/// Ticks per PWM period.
fn period(resolution_bits: u8) -> Result<u32, Error> {
    if (1..=15).contains(&resolution_bits) {
        Ok(1 << resolution_bits)
    } else {
        Err(Error::OutOfRange)
    }
}


//
// End of file
//
