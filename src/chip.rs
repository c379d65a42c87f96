//! The driver object: one [`Chip`] per physical chip on the bus.

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use embedded_hal::digital::v2::PinState;

use crate::bus;
use crate::convert::{self, Ticks};
use crate::mode::{Mode2, ModeMachine, ModeState};
use crate::registers::{self, ExpanderMap, PwmMap, Register, RegisterMap, Variant};
use crate::Error;

//
// Public Types
//

/// Which way an expander pin points.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// High impedance input. This is the power-on state.
    Input,
    /// Driven from the output latch
    Output,
}

/// How the PWM outputs are driven.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDriver {
    /// Outputs can only pull low
    OpenDrain,
    /// Outputs drive high and low. This is the power-on state.
    TotemPole,
}

/// What the PWM outputs do while the OE pin is high.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputWhenDisabled {
    /// Driven low
    Low,
    /// Driven high (totem-pole) or released (open-drain)
    High,
    /// High impedance
    HighImpedance,
}

/// The MODE2 settings of a PWM controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputConfig {
    /// Invert every output
    pub inverted: bool,
    /// Output stage type
    pub driver: OutputDriver,
    /// Behaviour while OE is high
    pub when_disabled: OutputWhenDisabled,
    /// Update outputs on each I²C ACK rather than at the STOP condition
    pub change_on_ack: bool,
}

/// A snapshot of one PWM channel, from our cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// Channel number
    pub index: u8,
    /// On/off ticks last written to (or read from) the chip
    pub ticks: Ticks,
    resolution_bits: u8,
}

/// Represents one PCA chip at one bus address.
///
/// The chip never holds on to the bus. Each operation borrows it for as long
/// as it runs, so several chips can share one bus, and a chip can't outlive
/// it.
///
/// Register values that have been written or read are cached here. A
/// write only updates the cache once the bus has accepted it.
///
/// Operations are not re-entrant. A read-modify-write of a shared port
/// register relies on nobody else touching this `Chip` in between, which
/// `&mut self` gives you for free.
#[derive(Debug)]
pub struct Chip {
    bus_address: u8,
    variant: Variant,
    state: State,
}

//
// Private Types
//

/// Per-variant cached state.
#[derive(Debug)]
enum State {
    Pwm(PwmState),
    Expander(ExpanderState),
}

#[derive(Debug)]
struct PwmState {
    map: &'static PwmMap,
    oscillator_hz: u32,
    mode: ModeMachine,
    mode2: Option<Mode2>,
    prescale: Option<u8>,
    channels: [Option<Ticks>; MAX_CHANNELS],
}

#[derive(Debug)]
struct ExpanderState {
    map: &'static ExpanderMap,
    output: Option<u16>,
    config: Option<u16>,
    polarity: Option<u16>,
}

//
// Public Data
//

/// The MODE2 value the PCA9685 powers up with.
pub const DEFAULT_OUTPUT_CONFIG: OutputConfig = OutputConfig {
    inverted: false,
    driver: OutputDriver::TotemPole,
    when_disabled: OutputWhenDisabled::Low,
    change_on_ack: false,
};

//
// Private Data
//

/// Most channels on any supported PWM controller.
const MAX_CHANNELS: usize = 16;

/// Highest 7-bit address.
const MAX_BUS_ADDRESS: u8 = 0x7F;

//
// impls on Public Types
//

impl Default for OutputConfig {
    fn default() -> Self {
        DEFAULT_OUTPUT_CONFIG
    }
}

impl OutputConfig {
    fn mode2(&self) -> Mode2 {
        let mut mode2 = match self.when_disabled {
            OutputWhenDisabled::Low => Mode2::empty(),
            OutputWhenDisabled::High => Mode2::OUTNE0,
            OutputWhenDisabled::HighImpedance => Mode2::OUTNE1,
        };
        mode2.set(Mode2::INVERT, self.inverted);
        mode2.set(Mode2::TOTEM_POLE, self.driver == OutputDriver::TotemPole);
        mode2.set(Mode2::OUTPUT_CHANGE_ON_ACK, self.change_on_ack);
        mode2
    }
}

impl ChannelState {
    /// The duty cycle these ticks give, from 0.0 to 1.0.
    pub fn duty_cycle(&self) -> f32 {
        convert::ticks_to_duty(self.ticks, self.resolution_bits)
    }
}

impl Chip {
    /// Create a proxy object for the chip at `bus_address`.
    ///
    /// Nothing is sent on the bus until you call an operation.
    pub fn new(bus_address: u8, variant: Variant) -> Result<Chip, Error> {
        if bus_address > MAX_BUS_ADDRESS {
            return Err(Error::OutOfRange);
        }
        let state = match registers::register_map(variant) {
            RegisterMap::Pwm(map) => State::Pwm(PwmState {
                map,
                oscillator_hz: map.oscillator_hz,
                mode: ModeMachine::new(),
                mode2: None,
                prescale: None,
                channels: [None; MAX_CHANNELS],
            }),
            RegisterMap::Expander(map) => State::Expander(ExpanderState {
                map,
                output: None,
                config: None,
                polarity: None,
            }),
        };
        Ok(Chip {
            bus_address,
            variant,
            state,
        })
    }

    /// Create a proxy object from a variant name, such as `"pca9685"`.
    pub fn from_tag(bus_address: u8, tag: &str) -> Result<Chip, Error> {
        Chip::new(bus_address, tag.parse()?)
    }

    /// Use a different oscillator frequency for the prescaler maths, for an
    /// external clock or a part you have measured.
    pub fn with_oscillator_hz(mut self, oscillator_hz: u32) -> Result<Chip, Error> {
        if oscillator_hz == 0 {
            return Err(Error::OutOfRange);
        }
        let State::Pwm(pwm) = &mut self.state else {
            return Err(Error::UnsupportedVariant);
        };
        pwm.oscillator_hz = oscillator_hz;
        Ok(self)
    }

    /// The 7-bit bus address.
    pub fn bus_address(&self) -> u8 {
        self.bus_address
    }

    /// Which chip this is.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// What we believe MODE1 holds. Expanders are always `Unknown`.
    pub fn mode_state(&self) -> ModeState {
        match &self.state {
            State::Pwm(pwm) => pwm.mode.state(),
            State::Expander(_) => ModeState::Unknown,
        }
    }

    /// Bring a PWM controller up: write MODE2 from `config`, turn on
    /// auto-increment and wake the chip.
    pub fn init<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        config: &OutputConfig,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = pwm.init(bus, delay, address, config.mode2());
        pwm.track(result)
    }

    /// Set one channel's duty cycle, from 0.0 (off) to 1.0 (on).
    ///
    /// The four on/off registers go out in one transaction, so the channel
    /// never sees half an update.
    ///
    /// If we haven't talked to the chip yet, or a transaction has failed
    /// since we last did, MODE1 is read first and a sleeping chip is woken,
    /// with `delay` providing the oscillator settle time. A chip you put to
    /// sleep with [`Chip::sleep`] stays asleep until you wake it.
    pub fn set_duty_cycle<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        channel: u8,
        percent: f32,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let register = pwm.map.channel(channel).map_err(Error::lift::<E>)?;
        let ticks = convert::duty_to_ticks(percent, pwm.map.resolution_bits)
            .map_err(Error::lift::<E>)?;
        let result = pwm.write_channel(bus, delay, address, channel, &register, ticks);
        pwm.track(result)
    }

    /// Set one channel's on and off points directly, in ticks.
    ///
    /// Use this to stagger the start of each channel's pulse. Bit 12 of
    /// either value is the full on/off flag. Wakes the chip on first use,
    /// like [`Chip::set_duty_cycle`].
    pub fn set_channel_ticks<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        channel: u8,
        on: u16,
        off: u16,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let register = pwm.map.channel(channel).map_err(Error::lift::<E>)?;
        let ticks = Ticks { on, off };
        register.check(ticks.to_raw()).map_err(Error::lift::<E>)?;
        let result = pwm.write_channel(bus, delay, address, channel, &register, ticks);
        pwm.track(result)
    }

    /// Set every channel to the same duty cycle in one transaction. Wakes
    /// the chip on first use, like [`Chip::set_duty_cycle`].
    pub fn set_all_duty_cycle<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        percent: f32,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let ticks = convert::duty_to_ticks(percent, pwm.map.resolution_bits)
            .map_err(Error::lift::<E>)?;
        let result = pwm.write_all(bus, delay, address, ticks);
        pwm.track(result)
    }

    /// Read a channel's registers back from the chip, refreshing the cache.
    pub fn read_channel<B, E>(&mut self, bus: &mut B, channel: u8) -> Result<ChannelState, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let register = pwm.map.channel(channel).map_err(Error::lift::<E>)?;
        let result = pwm.read_channel(bus, address, channel, &register);
        pwm.track(result)
    }

    /// What we last wrote to (or read from) a channel. No bus traffic.
    ///
    /// `None` if this channel hasn't been touched yet.
    pub fn channel(&self, channel: u8) -> Result<Option<ChannelState>, Error> {
        let State::Pwm(pwm) = &self.state else {
            return Err(Error::UnsupportedVariant);
        };
        pwm.map.channel(channel)?;
        let ticks = pwm.channels.get(usize::from(channel)).copied().flatten();
        Ok(ticks.map(|ticks| ChannelState {
            index: channel,
            ticks,
            resolution_bits: pwm.map.resolution_bits,
        }))
    }

    /// The cached duty cycle of a channel. See [`Chip::channel`].
    pub fn duty_cycle(&self, channel: u8) -> Result<Option<f32>, Error> {
        Ok(self.channel(channel)?.map(|state| state.duty_cycle()))
    }

    /// Set the PWM frequency of every channel.
    ///
    /// The prescaler can only be written while the oscillator is stopped, so
    /// this puts the chip to sleep, writes it, and wakes the chip up again.
    /// `delay` provides the oscillator settle time. Duty cycles are left
    /// alone, so every channel keeps the same proportion of the new period.
    ///
    /// The chip always ends up awake, even if you had put it to sleep with
    /// [`Chip::sleep`]. Call that again afterwards if you want it kept off.
    pub fn set_pwm_frequency<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        hz: f32,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let prescale =
            convert::frequency_to_prescaler(hz, pwm.oscillator_hz, pwm.map.prescale_range())
                .map_err(Error::lift::<E>)?;
        let result = pwm.write_prescale(bus, delay, address, prescale);
        pwm.track(result)
    }

    /// The PWM frequency we last set or read. No bus traffic.
    pub fn pwm_frequency(&self) -> Option<f32> {
        match &self.state {
            State::Pwm(pwm) => pwm
                .prescale
                .map(|prescale| convert::prescaler_to_frequency(prescale, pwm.oscillator_hz)),
            State::Expander(_) => None,
        }
    }

    /// Read the prescaler back and work out the PWM frequency.
    pub fn read_pwm_frequency<B, E>(&mut self, bus: &mut B) -> Result<f32, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = bus::read_register(bus, address, &pwm.map.prescale, false);
        let prescale = pwm.track(result)? as u8;
        pwm.prescale = Some(prescale);
        Ok(convert::prescaler_to_frequency(prescale, pwm.oscillator_hz))
    }

    /// Stop the oscillator. All outputs go off.
    ///
    /// Does nothing if we know the chip is already asleep.
    pub fn sleep<B, E>(&mut self, bus: &mut B) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = pwm.mode.sleep(bus, address, pwm.map);
        pwm.track(result).map(|_| ())
    }

    /// Start the oscillator, wait `delay` for it to settle, and restart the
    /// outputs.
    ///
    /// Does nothing if we know the chip is already awake.
    pub fn wake<B, D, E>(&mut self, bus: &mut B, delay: &mut D) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = pwm.mode.wake(bus, delay, address, pwm.map);
        pwm.track(result).map(|_| ())
    }

    /// Invert (or stop inverting) every PWM output.
    pub fn set_output_inverted<B, E>(&mut self, bus: &mut B, inverted: bool) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = pwm.update_mode2(bus, address, |mut mode2| {
            mode2.set(Mode2::INVERT, inverted);
            mode2
        });
        pwm.track(result)
    }

    /// Choose open-drain or totem-pole PWM outputs.
    pub fn set_output_driver<B, E>(
        &mut self,
        bus: &mut B,
        driver: OutputDriver,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let pwm = self.pwm::<E>()?;
        let result = pwm.update_mode2(bus, address, |mut mode2| {
            mode2.set(Mode2::TOTEM_POLE, driver == OutputDriver::TotemPole);
            mode2
        });
        pwm.track(result)
    }

    /// Make an expander pin an input or an output.
    ///
    /// The other pins sharing the register keep their direction.
    pub fn set_pin_direction<B, E>(
        &mut self,
        bus: &mut B,
        pin: u8,
        direction: Direction,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let mask = expander.map.pin_mask(pin).map_err(Error::lift::<E>)?;
        let input = PinState::from(direction == Direction::Input);
        let register = expander.map.config;
        update_port(&mut expander.config, bus, address, &register, |port| {
            convert::pin_level_to_bits(port, mask, input)
        })
    }

    /// Set the direction of every expander pin at once. A set bit in
    /// `inputs` makes that pin an input.
    pub fn set_port_direction<B, E>(&mut self, bus: &mut B, inputs: u16) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let register = expander.map.config;
        write_port(&mut expander.config, bus, address, &register, inputs)
    }

    /// Drive an expander output pin high or low.
    ///
    /// Only this pin's bit in the output latch changes.
    pub fn write_pin<B, E>(&mut self, bus: &mut B, pin: u8, level: PinState) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let mask = expander.map.pin_mask(pin).map_err(Error::lift::<E>)?;
        let register = expander.map.output;
        update_port(&mut expander.output, bus, address, &register, |port| {
            convert::pin_level_to_bits(port, mask, level)
        })
    }

    /// Set every expander output latch at once.
    pub fn write_port<B, E>(&mut self, bus: &mut B, levels: u16) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let register = expander.map.output;
        write_port(&mut expander.output, bus, address, &register, levels)
    }

    /// Read the level on an expander pin, after any polarity inversion.
    pub fn read_pin<B, E>(&mut self, bus: &mut B, pin: u8) -> Result<PinState, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let map = self.expander::<E>()?.map;
        let mask = map.pin_mask(pin).map_err(Error::lift::<E>)?;
        let port = self.read_port(bus)?;
        Ok(convert::bits_to_pin_level(port, mask))
    }

    /// Read the level on every expander pin.
    pub fn read_port<B, E>(&mut self, bus: &mut B) -> Result<u16, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let raw = bus::read_register(bus, address, &expander.map.input, true)?;
        Ok(raw as u16)
    }

    /// Invert the input reading of an expander pin.
    pub fn set_pin_polarity<B, E>(
        &mut self,
        bus: &mut B,
        pin: u8,
        inverted: bool,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        let address = self.bus_address;
        let expander = self.expander::<E>()?;
        let mask = expander.map.pin_mask(pin).map_err(Error::lift::<E>)?;
        let register = expander.map.polarity;
        update_port(&mut expander.polarity, bus, address, &register, |port| {
            convert::pin_level_to_bits(port, mask, PinState::from(inverted))
        })
    }

    fn pwm<E>(&mut self) -> Result<&mut PwmState, Error<E>> {
        match &mut self.state {
            State::Pwm(pwm) => Ok(pwm),
            State::Expander(_) => Err(Error::UnsupportedVariant),
        }
    }

    fn expander<E>(&mut self) -> Result<&mut ExpanderState, Error<E>> {
        match &mut self.state {
            State::Expander(expander) => Ok(expander),
            State::Pwm(_) => Err(Error::UnsupportedVariant),
        }
    }
}

//
// impls on Private Types
//

impl PwmState {
    /// After a bus failure we can't say what state the chip is in.
    fn track<T, E>(&mut self, result: Result<T, Error<E>>) -> Result<T, Error<E>> {
        if let Err(e) = &result {
            if e.is_bus_error() {
                self.mode.invalidate();
                self.mode2 = None;
            }
        }
        result
    }

    fn init<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        mode2: Mode2,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        bus::write_register(bus, address, &self.map.mode2, &[mode2.bits()], false)?;
        self.mode2 = Some(mode2);
        self.mode.ensure_auto_increment(bus, address, self.map)?;
        self.mode.wake(bus, delay, address, self.map)?;
        Ok(())
    }

    fn write_channel<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        channel: u8,
        register: &Register,
        ticks: Ticks,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        self.mode.prepare_channels(bus, delay, address, self.map)?;
        bus::write_register(bus, address, register, &ticks.to_bytes(), true)?;
        if let Some(slot) = self.channels.get_mut(usize::from(channel)) {
            *slot = Some(ticks);
        }
        Ok(())
    }

    fn write_all<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        ticks: Ticks,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        self.mode.prepare_channels(bus, delay, address, self.map)?;
        bus::write_register(
            bus,
            address,
            &self.map.all_channels,
            &ticks.to_bytes(),
            true,
        )?;
        let count = usize::from(self.map.channel_count);
        for slot in self.channels.iter_mut().take(count) {
            *slot = Some(ticks);
        }
        Ok(())
    }

    fn read_channel<B, E>(
        &mut self,
        bus: &mut B,
        address: u8,
        channel: u8,
        register: &Register,
    ) -> Result<ChannelState, Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
    {
        self.mode.ensure_auto_increment(bus, address, self.map)?;
        let ticks = Ticks::from_raw(bus::read_register(bus, address, register, true)?);
        if let Some(slot) = self.channels.get_mut(usize::from(channel)) {
            *slot = Some(ticks);
        }
        Ok(ChannelState {
            index: channel,
            ticks,
            resolution_bits: self.map.resolution_bits,
        })
    }

    fn write_prescale<B, D, E>(
        &mut self,
        bus: &mut B,
        delay: &mut D,
        address: u8,
        prescale: u8,
    ) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        D: DelayUs<u16>,
    {
        self.mode.sleep(bus, address, self.map)?;
        bus::write_register(bus, address, &self.map.prescale, &[prescale], false)?;
        self.prescale = Some(prescale);
        self.mode.wake(bus, delay, address, self.map)?;
        Ok(())
    }

    fn update_mode2<B, E, F>(&mut self, bus: &mut B, address: u8, f: F) -> Result<(), Error<E>>
    where
        B: Write<Error = E> + WriteRead<Error = E>,
        F: FnOnce(Mode2) -> Mode2,
    {
        let current = match self.mode2 {
            Some(mode2) => mode2,
            None => {
                let raw = bus::read_register(bus, address, &self.map.mode2, false)?;
                let mode2 = Mode2::from_bits_retain(raw as u8);
                self.mode2 = Some(mode2);
                mode2
            }
        };
        let new = f(current);
        if new == current {
            return Ok(());
        }
        bus::write_register(bus, address, &self.map.mode2, &[new.bits()], false)?;
        self.mode2 = Some(new);
        Ok(())
    }
}

//
// Private Functions
//

/// Get a port register from the cache, or from the chip if not cached.
fn cached_port<B, E>(
    cache: &mut Option<u16>,
    bus: &mut B,
    address: u8,
    register: &Register,
) -> Result<u16, Error<E>>
where
    B: WriteRead<Error = E>,
{
    if let Some(value) = *cache {
        return Ok(value);
    }
    let value = bus::read_register(bus, address, register, true)? as u16;
    *cache = Some(value);
    Ok(value)
}

/// Write a whole port register and cache it if the chip took it.
fn write_port<B, E>(
    cache: &mut Option<u16>,
    bus: &mut B,
    address: u8,
    register: &Register,
    value: u16,
) -> Result<(), Error<E>>
where
    B: Write<Error = E>,
{
    register.check(u32::from(value)).map_err(Error::lift::<E>)?;
    let bytes = value.to_le_bytes();
    let payload = bytes
        .get(..usize::from(register.width))
        .ok_or(Error::<E>::OutOfRange)?;
    bus::write_register(bus, address, register, payload, true)?;
    *cache = Some(value);
    Ok(())
}

/// Read-modify-write a port register.
fn update_port<B, E, F>(
    cache: &mut Option<u16>,
    bus: &mut B,
    address: u8,
    register: &Register,
    f: F,
) -> Result<(), Error<E>>
where
    B: Write<Error = E> + WriteRead<Error = E>,
    F: FnOnce(u16) -> u16,
{
    let current = cached_port(cache, bus, address, register)?;
    let new = f(current);
    if new == current {
        return Ok(());
    }
    write_port(cache, bus, address, register, new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::delay::MockNoop;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::MockError;
    use std::io::ErrorKind;

    const PWM_ADDR: u8 = 0x40;
    const GPIO_ADDR: u8 = 0x20;

    fn fail() -> MockError {
        MockError::Io(ErrorKind::Other)
    }

    #[test]
    fn rejects_wide_address() {
        assert_eq!(
            Chip::new(0x80, Variant::Pca9685).unwrap_err(),
            Error::OutOfRange
        );
        assert_eq!(
            Chip::from_tag(0x40, "pca1234").unwrap_err(),
            Error::UnsupportedVariant
        );
        let chip = Chip::from_tag(0x40, "16-channel-pwm").unwrap();
        assert_eq!(chip.variant(), Variant::Pca9685);
        assert_eq!(chip.bus_address(), 0x40);
        assert_eq!(chip.mode_state(), ModeState::Unknown);
    }

    #[test]
    fn init_sequence() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(PWM_ADDR, vec![0x01, 0x04]),
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x11]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0x31]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0x21]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0xA1]),
        ]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        chip.init(&mut i2c, &mut delay, &OutputConfig::default())
            .unwrap();
        assert!(matches!(chip.mode_state(), ModeState::Awake(_)));
        i2c.done();
    }

    #[test]
    fn raw_ticks() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x21]),
            I2cTransaction::write(PWM_ADDR, vec![0x0A, 0x00, 0x01, 0x00, 0x03]),
        ]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        chip.set_channel_ticks(&mut i2c, &mut delay, 1, 0x100, 0x300)
            .unwrap();
        assert_eq!(chip.duty_cycle(1).unwrap(), Some(0.125));
        assert!(matches!(
            chip.set_channel_ticks(&mut i2c, &mut delay, 1, 0x2000, 0),
            Err(Error::OutOfRange)
        ));
        i2c.done();
    }

    #[test]
    fn all_channels_at_once() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x21]),
            I2cTransaction::write(PWM_ADDR, vec![0xFA, 0x00, 0x10, 0x00, 0x00]),
        ]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        chip.set_all_duty_cycle(&mut i2c, &mut delay, 1.0).unwrap();
        for channel in 0..16 {
            assert_eq!(chip.duty_cycle(channel).unwrap(), Some(1.0));
        }
        i2c.done();
    }

    #[test]
    fn sleep_only_writes_once() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x21]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0x31]),
        ]);
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        chip.sleep(&mut i2c).unwrap();
        chip.sleep(&mut i2c).unwrap();
        i2c.done();
    }

    #[test]
    fn mode2_read_modify_write() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x01], vec![0x04]),
            I2cTransaction::write(PWM_ADDR, vec![0x01, 0x14]),
            I2cTransaction::write(PWM_ADDR, vec![0x01, 0x10]),
        ]);
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        chip.set_output_inverted(&mut i2c, true).unwrap();
        // Already inverted, so nothing to send
        chip.set_output_inverted(&mut i2c, true).unwrap();
        chip.set_output_driver(&mut i2c, OutputDriver::OpenDrain)
            .unwrap();
        i2c.done();
    }

    #[test]
    fn frequency_read_back() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            PWM_ADDR,
            vec![0xFE],
            vec![121],
        )]);
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        assert_eq!(chip.pwm_frequency(), None);
        let hz = chip.read_pwm_frequency(&mut i2c).unwrap();
        assert!((hz - 50.03).abs() < 0.01);
        assert_eq!(chip.pwm_frequency(), Some(hz));
        i2c.done();
    }

    #[test]
    fn external_oscillator() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x11]),
            I2cTransaction::write(PWM_ADDR, vec![0xFE, 49]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0x01]),
            I2cTransaction::write(PWM_ADDR, vec![0x00, 0x81]),
        ]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685)
            .unwrap()
            .with_oscillator_hz(20_480_000)
            .unwrap();
        chip.set_pwm_frequency(&mut i2c, &mut delay, 100.0).unwrap();
        assert_eq!(chip.pwm_frequency(), Some(100.0));
        i2c.done();
    }

    #[test]
    fn unreachable_frequency_sends_nothing() {
        let mut i2c = I2cMock::new(&[]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        assert!(matches!(
            chip.set_pwm_frequency(&mut i2c, &mut delay, 5000.0),
            Err(Error::OutOfRange)
        ));
        i2c.done();
    }

    #[test]
    fn failed_channel_write_invalidates_mode() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(PWM_ADDR, vec![0x00], vec![0x21]),
            I2cTransaction::write(PWM_ADDR, vec![0x06, 0x00, 0x00, 0x00, 0x04])
                .with_error(fail()),
        ]);
        let mut delay = MockNoop::new();
        let mut chip = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        assert!(matches!(
            chip.set_duty_cycle(&mut i2c, &mut delay, 0, 0.25),
            Err(Error::Bus(_))
        ));
        assert_eq!(chip.mode_state(), ModeState::Unknown);
        assert_eq!(chip.duty_cycle(0).unwrap(), None);
        i2c.done();
    }

    #[test]
    fn wrong_variant() {
        let mut i2c = I2cMock::new(&[]);
        let mut delay = MockNoop::new();
        let mut gpio = Chip::new(GPIO_ADDR, Variant::Pca9538).unwrap();
        assert!(matches!(
            gpio.set_duty_cycle(&mut i2c, &mut delay, 0, 0.5),
            Err(Error::UnsupportedVariant)
        ));
        assert!(matches!(
            gpio.wake(&mut i2c, &mut delay),
            Err(Error::UnsupportedVariant)
        ));
        assert_eq!(gpio.channel(0), Err(Error::UnsupportedVariant));
        let mut pwm = Chip::new(PWM_ADDR, Variant::Pca9685).unwrap();
        assert!(matches!(
            pwm.read_pin(&mut i2c, 0),
            Err(Error::UnsupportedVariant)
        ));
        assert!(pwm.with_oscillator_hz(0).is_err());
        i2c.done();
    }

    #[test]
    fn pin_direction_keeps_siblings() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(GPIO_ADDR, vec![0x06], vec![0xFF, 0xFF]),
            I2cTransaction::write(GPIO_ADDR, vec![0x06, 0xF7, 0xFF]),
            I2cTransaction::write(GPIO_ADDR, vec![0x06, 0xE7, 0xFF]),
            I2cTransaction::write(GPIO_ADDR, vec![0x06, 0xE7, 0x7F]),
        ]);
        let mut chip = Chip::new(GPIO_ADDR, Variant::Pca9535).unwrap();
        chip.set_pin_direction(&mut i2c, 3, Direction::Output)
            .unwrap();
        chip.set_pin_direction(&mut i2c, 4, Direction::Output)
            .unwrap();
        // Already an output
        chip.set_pin_direction(&mut i2c, 4, Direction::Output)
            .unwrap();
        chip.set_pin_direction(&mut i2c, 15, Direction::Output)
            .unwrap();
        assert!(matches!(
            chip.set_pin_direction(&mut i2c, 16, Direction::Output),
            Err(Error::ChannelOutOfRange)
        ));
        i2c.done();
    }

    #[test]
    fn write_and_read_pins() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(GPIO_ADDR, vec![0x01], vec![0x00]),
            I2cTransaction::write(GPIO_ADDR, vec![0x01, 0x04]),
            I2cTransaction::write(GPIO_ADDR, vec![0x01, 0x00]),
            I2cTransaction::write_read(GPIO_ADDR, vec![0x00], vec![0x80]),
            I2cTransaction::write_read(GPIO_ADDR, vec![0x00], vec![0x80]),
        ]);
        let mut chip = Chip::new(GPIO_ADDR, Variant::Pca9538).unwrap();
        chip.write_pin(&mut i2c, 2, PinState::High).unwrap();
        chip.write_pin(&mut i2c, 2, PinState::Low).unwrap();
        assert_eq!(chip.read_pin(&mut i2c, 7).unwrap(), PinState::High);
        assert_eq!(chip.read_pin(&mut i2c, 6).unwrap(), PinState::Low);
        i2c.done();
    }

    #[test]
    fn failed_pin_write_keeps_cache() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write_read(GPIO_ADDR, vec![0x01], vec![0x00]),
            I2cTransaction::write(GPIO_ADDR, vec![0x01, 0x01]).with_error(fail()),
            I2cTransaction::write(GPIO_ADDR, vec![0x01, 0x02]),
        ]);
        let mut chip = Chip::new(GPIO_ADDR, Variant::Pca9538).unwrap();
        assert!(matches!(
            chip.write_pin(&mut i2c, 0, PinState::High),
            Err(Error::Bus(_))
        ));
        // Pin 0 must not have been remembered as high
        chip.write_pin(&mut i2c, 1, PinState::High).unwrap();
        i2c.done();
    }

    #[test]
    fn whole_ports() {
        let mut i2c = I2cMock::new(&[
            I2cTransaction::write(GPIO_ADDR, vec![0x06, 0x00, 0xFF]),
            I2cTransaction::write(GPIO_ADDR, vec![0x02, 0x34, 0x12]),
            I2cTransaction::write_read(GPIO_ADDR, vec![0x04], vec![0x00, 0x00]),
            I2cTransaction::write(GPIO_ADDR, vec![0x04, 0x00, 0x01]),
            I2cTransaction::write_read(GPIO_ADDR, vec![0x00], vec![0x00, 0xA5]),
        ]);
        let mut chip = Chip::new(GPIO_ADDR, Variant::Pca9535).unwrap();
        chip.set_port_direction(&mut i2c, 0xFF00).unwrap();
        chip.write_port(&mut i2c, 0x1234).unwrap();
        chip.set_pin_polarity(&mut i2c, 8, true).unwrap();
        assert_eq!(chip.read_port(&mut i2c).unwrap(), 0xA500);
        i2c.done();
    }

    #[test]
    fn narrow_port_rejects_wide_value() {
        let mut i2c = I2cMock::new(&[]);
        let mut chip = Chip::new(GPIO_ADDR, Variant::Pca9538).unwrap();
        assert!(matches!(
            chip.write_port(&mut i2c, 0x100),
            Err(Error::OutOfRange)
        ));
        i2c.done();
    }
}

//
// End of file
//
