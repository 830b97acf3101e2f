// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers

use crate::error::Error;

/// Reverse the byte order of a 16 bit value.
///
/// Modbus transmits every multi-byte field big-endian, so on little-endian
/// hosts this converts between wire and host order (and back).
#[must_use]
pub const fn swap16(value: u16) -> u16 {
    value.rotate_left(8)
}

/// Turn a bool into a u16 coil value
#[must_use]
pub const fn bool_to_u16_coil(state: bool) -> u16 {
    if state { 0xFF00 } else { 0x0000 }
}

/// Turn a u16 coil value into a boolean value.
pub const fn u16_coil_to_bool(coil: u16) -> Result<bool, Error> {
    match coil {
        0xFF00 => Ok(true),
        0x0000 => Ok(false),
        _ => Err(Error::CoilValue(coil)),
    }
}

/// Calculate the number of bytes required for a given number of coils.
#[must_use]
pub const fn packed_coils_len(bitcount: usize) -> usize {
    bitcount.div_ceil(8)
}

/// Read bit `idx` out of a packed (LSB first) bit field.
///
/// Bits beyond the end of `bytes` read as `false`.
#[must_use]
pub fn get_bit(bytes: &[u8], idx: usize) -> bool {
    bytes
        .get(idx / 8)
        .is_some_and(|byte| (byte >> (idx % 8)) & 0b1 > 0)
}

/// Set or clear bit `idx` in a packed (LSB first) bit field.
pub fn set_bit(bytes: &mut [u8], idx: usize, state: bool) -> Result<(), Error> {
    let byte = bytes.get_mut(idx / 8).ok_or(Error::BufferSize)?;
    if state {
        *byte |= 1 << (idx % 8);
    } else {
        *byte &= !(1 << (idx % 8));
    }
    Ok(())
}

/// Pack coils into a byte array.
///
/// It returns the number of bytes used to pack the coils.
pub fn pack_coils(coils: &[bool], bytes: &mut [u8]) -> Result<usize, Error> {
    let packed_size = packed_coils_len(coils.len());
    if bytes.len() < packed_size {
        return Err(Error::BufferSize);
    }
    bytes[..packed_size].fill(0);
    for (i, b) in coils.iter().enumerate() {
        set_bit(bytes, i, *b)?;
    }
    Ok(packed_size)
}
