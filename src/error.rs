// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

/// modbus-engine Error
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid coil value
    CoilValue(u16),
    /// Invalid buffer size
    BufferSize,
    /// The allocator could not provide the requested number of bytes
    Allocation(usize),
    /// Invalid or unsupported function code
    FnCode(u8),
    /// Invalid exception code
    ExceptionCode(u8),
    /// Invalid CRC
    Crc(u16, u16),
    /// Length Mismatch
    LengthMismatch(usize, usize),
    /// Protocol not Modbus
    ProtocolNotModbus(u16),
    /// Number of items out of the range allowed for the function
    Quantity(usize),
    /// Items would run past the last addressable index
    AddressRange(u16, usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            CoilValue(v) => write!(f, "Invalid coil value: {v}"),
            BufferSize => write!(f, "Invalid buffer size"),
            Allocation(size) => write!(f, "Failed to allocate {size} byte(s)"),
            FnCode(fn_code) => write!(f, "Invalid function code: 0x{fn_code:0>2X}"),
            ExceptionCode(code) => write!(f, "Invalid exception code: 0x{code:0>2X}"),
            Crc(expected, actual) => write!(
                f,
                "Invalid CRC: expected = 0x{expected:0>4X}, actual = 0x{actual:0>4X}"
            ),
            LengthMismatch(expected, actual) => write!(
                f,
                "Length Mismatch: expected {expected} byte(s), got {actual}"
            ),
            ProtocolNotModbus(protocol_id) => {
                write!(f, "Protocol not Modbus(0), received {protocol_id} instead")
            }
            Quantity(cnt) => write!(f, "Invalid quantity: {cnt}"),
            AddressRange(start, cnt) => {
                write!(f, "Address range overflow: {cnt} item(s) from {start}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_crc_error() {
        assert_eq!(
            Error::Crc(0x1234, 0xABCD).to_string(),
            "Invalid CRC: expected = 0x1234, actual = 0xABCD"
        );
    }

    #[test]
    fn display_fn_code_error() {
        assert_eq!(
            Error::FnCode(0x2B).to_string(),
            "Invalid function code: 0x2B"
        );
    }
}
