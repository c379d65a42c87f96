//! Moves frames built by [`crate::codec`] over the I²C bus.

use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::codec::{self, Frames, MAX_PAYLOAD};
use crate::registers::Register;
use crate::Error;

/// Write `payload` into `register`.
///
/// Stops at the first frame the bus rejects.
pub(crate) fn write_register<B, E>(
    bus: &mut B,
    address: u8,
    register: &Register,
    payload: &[u8],
    auto_increment: bool,
) -> Result<(), Error<E>>
where
    B: Write<Error = E>,
{
    let frames: Frames =
        codec::encode_write(register, payload, auto_increment).map_err(Error::lift::<E>)?;
    for frame in frames.iter() {
        #[cfg(feature = "defmt")]
        defmt::debug!("PCA 0x{:02x} write {=[u8]:x}", address, &frame[..]);
        bus.write(address, frame).map_err(Error::Bus)?;
    }
    Ok(())
}

/// Read the whole of `register`.
///
/// Without auto-increment a multi-byte register is read one byte at a time.
pub(crate) fn read_register<B, E>(
    bus: &mut B,
    address: u8,
    register: &Register,
    auto_increment: bool,
) -> Result<u32, Error<E>>
where
    B: WriteRead<Error = E>,
{
    let width = usize::from(register.width);
    let mut buffer = [0u8; MAX_PAYLOAD];
    let reply = buffer.get_mut(..width).ok_or(Error::<E>::OutOfRange)?;
    if width == 1 || (register.auto_increment && auto_increment) {
        let request = codec::encode_read(register, width).map_err(Error::lift::<E>)?;
        bus.write_read(address, &request, reply)
            .map_err(Error::Bus)?;
    } else {
        for (offset, byte) in (0u8..).zip(reply.iter_mut()) {
            let request = [register.address + offset];
            bus.write_read(address, &request, core::slice::from_mut(byte))
                .map_err(Error::Bus)?;
        }
    }
    #[cfg(feature = "defmt")]
    defmt::debug!(
        "PCA 0x{:02x} read 0x{:02x} = {=[u8]:x}",
        address,
        register.address,
        &reply[..]
    );
    codec::decode_read(register, reply).map_err(Error::lift::<E>)
}

//
// End of file
//
