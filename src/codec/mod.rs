// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{error::*, frame::*};

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

type Result<T> = core::result::Result<T, Error>;

/// The bit that marks a function code as an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// The transport envelope around a PDU.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No envelope: the frame is the bare PDU.
    Pdu,
    /// Slave address in front, CRC behind.
    #[cfg(feature = "rtu")]
    Rtu,
    /// MBAP header in front (carrying the echoed fields).
    #[cfg(feature = "tcp")]
    Tcp(tcp::Header),
}

impl Framing {
    /// Number of envelope bytes in front of the PDU.
    #[must_use]
    pub const fn header_len(&self) -> usize {
        match self {
            Self::Pdu => 0,
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::HEADER_LEN,
            #[cfg(feature = "tcp")]
            Self::Tcp(_) => tcp::HEADER_LEN,
        }
    }

    /// Number of envelope bytes behind the PDU.
    #[must_use]
    pub const fn trailer_len(&self) -> usize {
        match self {
            #[cfg(feature = "rtu")]
            Self::Rtu => rtu::CRC_LEN,
            _ => 0,
        }
    }

    /// Size of a frame carrying a PDU of `pdu_len` bytes.
    #[must_use]
    pub const fn frame_len(&self, pdu_len: usize) -> usize {
        self.header_len() + pdu_len + self.trailer_len()
    }

    /// The PDU part of a frame built with this framing.
    pub fn pdu_mut<'f>(&self, frame: &'f mut [u8]) -> Result<&'f mut [u8]> {
        let end = frame
            .len()
            .checked_sub(self.trailer_len())
            .ok_or(Error::BufferSize)?;
        frame
            .get_mut(self.header_len()..end)
            .ok_or(Error::BufferSize)
    }

    /// Fill in the envelope of a frame whose PDU has been written.
    ///
    /// `slave` is only used by framings that carry an address byte.
    #[cfg_attr(not(feature = "rtu"), allow(unused_variables))]
    pub fn seal(&self, slave: SlaveId, frame: &mut [u8]) -> Result<()> {
        match self {
            Self::Pdu => Ok(()),
            #[cfg(feature = "rtu")]
            Self::Rtu => {
                *frame.first_mut().ok_or(Error::BufferSize)? = slave;
                rtu::stamp_crc(frame)
            }
            #[cfg(feature = "tcp")]
            Self::Tcp(hdr) => tcp::write_header(*hdr, frame),
        }
    }
}

/// Encode an exception PDU for `function`.
#[must_use]
pub const fn encode_exception_pdu(function: u8, exception: Exception) -> [u8; 2] {
    [function | EXCEPTION_BIT, exception as u8]
}

/// Decode an exception PDU into the original function code and the exception.
pub fn decode_exception_pdu(bytes: &[u8]) -> Result<(u8, Exception)> {
    let [fn_err_code, code] = *bytes else {
        return Err(Error::BufferSize);
    };
    if fn_err_code & EXCEPTION_BIT == 0 {
        return Err(Error::FnCode(fn_err_code));
    }
    let exception = Exception::try_from(code)?;
    Ok((fn_err_code & !EXCEPTION_BIT, exception))
}
