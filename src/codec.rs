//! Framing of register reads and writes.
//!
//! These functions only build and check byte sequences. Putting them on the
//! bus is the caller's job.

use crate::registers::Register;
use crate::Error;

//
// Public Types
//

/// One I²C write: the register address followed by up to four data bytes.
pub type Frame = heapless::Vec<u8, MAX_FRAME>;

/// The writes needed to update one register.
pub type Frames = heapless::Vec<Frame, MAX_PAYLOAD>;

//
// Public Data
//

/// Largest number of data bytes in a single register access.
pub const MAX_PAYLOAD: usize = 4;

/// Largest frame: register address plus payload.
pub const MAX_FRAME: usize = MAX_PAYLOAD + 1;

//
// Public Functions
//

/// Build the write(s) that put `payload` into `register`.
///
/// If the register can be auto-incremented and `auto_increment` says the chip
/// currently has that turned on, this is a single frame, so the chip sees
/// every byte in one transaction. Otherwise each byte gets its own frame,
/// addressed one register further on than the last.
pub fn encode_write(
    register: &Register,
    payload: &[u8],
    auto_increment: bool,
) -> Result<Frames, Error> {
    if payload.is_empty() || payload.len() > usize::from(register.width) {
        return Err(Error::OutOfRange);
    }
    let mut frames = Frames::new();
    if payload.len() == 1 || (register.auto_increment && auto_increment) {
        let mut frame = Frame::new();
        frame
            .push(register.address)
            .map_err(|_| Error::OutOfRange)?;
        frame
            .extend_from_slice(payload)
            .map_err(|_| Error::OutOfRange)?;
        frames.push(frame).map_err(|_| Error::OutOfRange)?;
    } else {
        for (offset, byte) in (0u8..).zip(payload) {
            let mut frame = Frame::new();
            frame
                .extend_from_slice(&[register.address + offset, *byte])
                .map_err(|_| Error::OutOfRange)?;
            frames.push(frame).map_err(|_| Error::OutOfRange)?;
        }
    }
    Ok(frames)
}

/// Build the write half of a register read of `length` bytes.
///
/// This is just the register address. The bus sends it, then a repeated
/// start, then clocks in `length` bytes.
pub fn encode_read(register: &Register, length: usize) -> Result<Frame, Error> {
    if length == 0 || length > usize::from(register.width) {
        return Err(Error::OutOfRange);
    }
    let mut frame = Frame::new();
    frame
        .push(register.address)
        .map_err(|_| Error::OutOfRange)?;
    Ok(frame)
}

/// Turn the bytes read back from `register` into a value.
///
/// Bytes are little-endian. Reserved bits are dropped.
pub fn decode_read(register: &Register, bytes: &[u8]) -> Result<u32, Error> {
    if bytes.len() != usize::from(register.width) {
        return Err(Error::MalformedResponse);
    }
    let value = bytes
        .iter()
        .rev()
        .fold(0u32, |acc, byte| acc << 8 | u32::from(*byte));
    Ok(value & register.mask)
}


//
// End of file
//
