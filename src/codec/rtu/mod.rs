// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use super::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// Slave address + function code + CRC
pub const MIN_FRAME_LEN: usize = 4;

/// Bytes in front of the PDU.
pub const HEADER_LEN: usize = 1;

/// Bytes behind the PDU.
pub const CRC_LEN: usize = 2;

/// An extracted RTU PDU frame.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub slave: SlaveId,
    pub pdu: &'a [u8],
}

/// Decode a complete RTU frame.
///
/// The whole buffer is expected to be exactly one frame.
pub fn decode(buf: &[u8]) -> Result<DecodedFrame<'_>> {
    if buf.len() < MIN_FRAME_LEN || buf.len() > MAX_FRAME_LEN {
        return Err(Error::BufferSize);
    }
    let (adu_buf, crc_buf) = buf.split_at(buf.len() - CRC_LEN);
    // Read trailing CRC and verify ADU
    let expected_crc = LittleEndian::read_u16(crc_buf);
    let actual_crc = crc16(adu_buf);
    if expected_crc != actual_crc {
        #[cfg(feature = "log")]
        log::warn!(
            "Dropping RTU frame: {}",
            Error::Crc(expected_crc, actual_crc)
        );
        return Err(Error::Crc(expected_crc, actual_crc));
    }
    let (slave_id, pdu_data) = adu_buf.split_at(HEADER_LEN);
    Ok(DecodedFrame {
        slave: slave_id[0],
        pdu: pdu_data,
    })
}

/// Write the CRC of all preceding bytes into the last two bytes of `frame`.
pub fn stamp_crc(frame: &mut [u8]) -> Result<()> {
    if frame.len() < CRC_LEN + 1 {
        return Err(Error::BufferSize);
    }
    let (adu_buf, crc_buf) = frame.split_at_mut(frame.len() - CRC_LEN);
    LittleEndian::write_u16(crc_buf, crc16(adu_buf));
    Ok(())
}

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The low byte is transmitted first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Derive the PDU length out of the ADU request buffer.
///
/// Returns `None` if the function code is unknown or the buffer is
/// too short to tell.
#[must_use]
pub const fn request_pdu_len(adu_buf: &[u8]) -> Option<usize> {
    if adu_buf.len() < 2 {
        return None;
    }
    match adu_buf[1] {
        0x01..=0x06 => Some(5),
        0x07 | 0x0B | 0x0C | 0x11 => Some(1),
        0x0F | 0x10 if adu_buf.len() > 6 => Some(6 + adu_buf[6] as usize),
        0x16 => Some(7),
        0x18 => Some(3),
        0x17 if adu_buf.len() > 10 => Some(10 + adu_buf[10] as usize),
        _ => None,
    }
}

/// Extract the PDU length out of the ADU response buffer.
pub fn response_pdu_len(adu_buf: &[u8]) -> Result<Option<usize>> {
    if adu_buf.len() < 2 {
        return Ok(None);
    }
    let fn_code = adu_buf[1];
    let len = match fn_code {
        0x01..=0x04 | 0x0C | 0x17 => {
            if adu_buf.len() > 2 {
                Some(2 + adu_buf[2] as usize)
            } else {
                // incomplete frame
                None
            }
        }
        0x05 | 0x06 | 0x0B | 0x0F | 0x10 => Some(5),
        0x07 | 0x81..=0xAB => Some(2),
        0x16 => Some(7),
        0x18 => {
            if adu_buf.len() > 3 {
                Some(3 + BigEndian::read_u16(&adu_buf[2..=3]) as usize)
            } else {
                // incomplete frame
                None
            }
        }
        _ => return Err(Error::FnCode(fn_code)),
    };
    Ok(len)
}
