//! Tracks whether a PWM controller is asleep or awake, and makes the MODE1
//! writes that move it between the two.
//!
//! The state starts out as [`ModeState::Unknown`]. The first operation that
//! needs it reads MODE1 from the chip instead of assuming the power-on value.
//! Any failed transaction puts it back to `Unknown`, so the next operation
//! reads it again.

use bitflags::bitflags;
use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::bus;
use crate::registers::PwmMap;
use crate::Error;

//
// Public Types
//

bitflags! {
    /// The MODE1 register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Mode1: u8 {
        /// Set by the chip when it was put to sleep with outputs running.
        /// Writing a 1 restarts them.
        const RESTART = 1 << 7;
        /// Clock from the EXTCLK pin
        const EXTCLK = 1 << 6;
        /// Register address steps on after every byte
        const AUTO_INCREMENT = 1 << 5;
        /// Oscillator off
        const SLEEP = 1 << 4;
        /// Respond to sub-address 1
        const SUB1 = 1 << 3;
        /// Respond to sub-address 2
        const SUB2 = 1 << 2;
        /// Respond to sub-address 3
        const SUB3 = 1 << 1;
        /// Respond to the all-call address
        const ALLCALL = 1 << 0;
    }
}

bitflags! {
    /// The MODE2 register.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Mode2: u8 {
        /// Invert the output logic
        const INVERT = 1 << 4;
        /// Outputs change on ACK instead of on STOP
        const OUTPUT_CHANGE_ON_ACK = 1 << 3;
        /// Totem-pole outputs instead of open-drain
        const TOTEM_POLE = 1 << 2;
        /// With OE high: outputs high-impedance
        const OUTNE1 = 1 << 1;
        /// With OE high: outputs high (if OUTNE1 is clear)
        const OUTNE0 = 1 << 0;
    }
}

/// What we believe about the chip's MODE1 register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeState {
    /// Not read yet, or a transaction failed since it was
    Unknown,
    /// Oscillator running
    Awake(Mode1),
    /// Oscillator stopped. The prescaler can be written.
    Asleep(Mode1),
}

/// The MODE1 state machine for one chip.
#[derive(Debug)]
pub struct ModeMachine {
    state: ModeState,
}

//
// impls on Public Types
//

impl ModeState {
    fn from_flags(flags: Mode1) -> ModeState {
        // RESTART reads back as set, but writing a 0 does nothing, so it is
        // never worth keeping.
        let flags = flags - Mode1::RESTART;
        if flags.contains(Mode1::SLEEP) {
            ModeState::Asleep(flags)
        } else {
            ModeState::Awake(flags)
        }
    }

    /// The cached MODE1 value, if we have one.
    pub fn flags(&self) -> Option<Mode1> {
        match *self {
            ModeState::Unknown => None,
            ModeState::Awake(flags) | ModeState::Asleep(flags) => Some(flags),
        }
    }
}

impl Default for ModeMachine {
    fn default() -> Self {
        ModeMachine::new()
    }
}

impl ModeMachine {
    /// Start off in [`ModeState::Unknown`].
    pub const fn new() -> ModeMachine {
        ModeMachine {
            state: ModeState::Unknown,
        }
    }

    /// What we currently believe.
    pub fn state(&self) -> ModeState {
        self.state
    }

    /// Forget what we know, so the next operation reads MODE1 again.
    pub fn invalidate(&mut self) {
        self.state = ModeState::Unknown;
    }

    /// Get MODE1, reading it from the chip if we don't know it.
    pub fn sync<B, E>(
        &mut self,
        bus: &mut B,
        address: u8,
        map: &PwmMap,
    ) -> Result<Mode1, Error<E>>
    where
        B: WriteRead<Error = E>,
    {
        if let Some(flags) = self.state.flags() {
            return Ok(flags);
        }
        let raw = bus::read_register(bus, address, &map.mode1, false)?;
        let flags = Mode1::from_bits_retain(raw as u8) - Mode1::RESTART;
        self.state = ModeState::from_flags(flags);
        Ok(flags)
    }

    /// Write MODE1, and only believe the new value if the chip took it.
    pub fn commit<B, E>(
        &mut self,
        bus: &mut B,
        address: u8,
        map: &PwmMap,
        flags: Mode1,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E>,
    {
        let flags = flags - Mode1::RESTART;
        match bus::write_register(bus, address, &map.mode1, &[flags.bits()], false) {
            Ok(()) => {
                self.state = ModeState::from_flags(flags);
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Make sure multi-byte registers can be written in one go.
    pub fn ensure_auto_increment<B, E>(
        &mut self,
        bus: &mut B,
        address: u8,
        map: &PwmMap,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let flags = self.sync(bus, address, map)?;
        if flags.contains(Mode1::AUTO_INCREMENT) {
            return Ok(());
        }
        self.commit(bus, address, map, flags | Mode1::AUTO_INCREMENT)
    }

    /// Stop the oscillator.
    ///
    /// Does nothing (and returns `false`) if the chip is already asleep.
    pub fn sleep<B, E>(
        &mut self,
        bus: &mut B,
        address: u8,
        map: &PwmMap,
    ) -> Result<bool, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let flags = self.sync(bus, address, map)?;
        if let ModeState::Asleep(_) = self.state {
            return Ok(false);
        }
        self.commit(bus, address, map, flags | Mode1::SLEEP)?;
        Ok(true)
    }

    /// Start the oscillator, wait for it to settle, then restart any PWM
    /// outputs that were running when the chip went to sleep.
    ///
    /// Does nothing (and returns `false`) if the chip is already awake. The
    /// settle time comes out of `delay`, which is yours to provide.
    pub fn wake<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        map: &PwmMap,
    ) -> Result<bool, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let flags = self.sync(bus, address, map)?;
        if let ModeState::Awake(_) = self.state {
            return Ok(false);
        }
        let flags = flags - Mode1::SLEEP;
        self.commit(bus, address, map, flags)?;
        delay.delay_us(map.settle_us);
        let restart = flags | Mode1::RESTART;
        if let Err(e) = bus::write_register(bus, address, &map.mode1, &[restart.bits()], false) {
            self.invalidate();
            return Err(e);
        }
        Ok(true)
    }

    /// Get the chip ready for channel writes: auto-increment on and, if this
    /// is the first we've heard from it, awake.
    ///
    /// A chip we already know to be asleep is left asleep. Its channel
    /// registers still take new values.
    pub fn prepare_channels<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        map: &PwmMap,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let first_use = self.state == ModeState::Unknown;
        self.ensure_auto_increment(bus, address, map)?;
        if first_use {
            self.wake(bus, delay, address, map)?;
        }
        Ok(())
    }
}


//
// End of file
//
