//! Errors reported by the driver.

use core::convert::Infallible;

//
// Public Types
//

/// Everything that can go wrong when talking to a PCA chip.
///
/// `E` is the error type of the I²C bus. The pure layers ([`crate::convert`],
/// [`crate::codec`] and [`crate::registers`]) never touch the bus, so they
/// report `Error<Infallible>` and the driver widens that with
/// [`Error::lift`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E = Infallible> {
    /// The bus reported a failure (NACK, arbitration loss, timeout...)
    Bus(E),
    /// The requested value cannot be represented by the chip
    OutOfRange,
    /// The channel or pin index is beyond what this variant provides
    ChannelOutOfRange,
    /// The variant is unknown, or does not support the operation
    UnsupportedVariant,
    /// The chip replied with the wrong number of bytes
    MalformedResponse,
}

//
// impls on Public Types
//

impl Error<Infallible> {
    /// Convert a bus-free error into one carrying a bus error type.
    pub fn lift<E>(self) -> Error<E> {
        match self {
            Error::Bus(never) => match never {},
            Error::OutOfRange => Error::OutOfRange,
            Error::ChannelOutOfRange => Error::ChannelOutOfRange,
            Error::UnsupportedVariant => Error::UnsupportedVariant,
            Error::MalformedResponse => Error::MalformedResponse,
        }
    }
}

impl<E> Error<E> {
    /// Did this error come from the bus, rather than from a bad argument?
    pub fn is_bus_error(&self) -> bool {
        matches!(self, Error::Bus(_) | Error::MalformedResponse)
    }
}


//
// End of file
//
