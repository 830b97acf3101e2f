// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP

use super::*;
use byteorder::{BigEndian, ByteOrder};

// [MODBUS MESSAGING ON TCP/IP IMPLEMENTATION GUIDE V1.0b](http://modbus.org/docs/Modbus_Messaging_Implementation_Guide_V1_0b.pdf), page 18
// "a MODBUS request needs a maximum of 256 bytes + the MBAP header size"
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PDU_LEN;

/// Size of the MBAP header (including the unit id).
pub const HEADER_LEN: usize = 7;

/// Unit id used when a server is addressed directly rather than through a gateway.
pub const UNIT_ID_DIRECT: UnitId = 0xFF;

pub type TransactionId = u16;
pub type UnitId = u8;

/// The MBAP header fields a response has to echo.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub transaction_id: TransactionId,
    pub unit_id: UnitId,
}

/// An extracted TCP PDU frame.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub hdr: Header,
    pub pdu: &'a [u8],
}

/// Decode a complete TCP frame.
///
/// There is no checksum, so the length field must match the number of
/// bytes following it exactly.
pub fn decode(buf: &[u8]) -> Result<DecodedFrame<'_>> {
    if buf.len() <= HEADER_LEN || buf.len() > MAX_FRAME_LEN {
        return Err(Error::BufferSize);
    }
    let (adu_buf, pdu_data) = buf.split_at(HEADER_LEN);
    let (transaction_buf, adu_buf) = adu_buf.split_at(2);
    let (protocol_buf, adu_buf) = adu_buf.split_at(2);
    let (length_buf, adu_buf) = adu_buf.split_at(2);
    let protocol_id = BigEndian::read_u16(protocol_buf);
    if protocol_id != 0 {
        return Err(Error::ProtocolNotModbus(protocol_id));
    }
    let m_length = BigEndian::read_u16(length_buf) as usize;
    if m_length != pdu_data.len() + 1 {
        return Err(Error::LengthMismatch(m_length, pdu_data.len() + 1));
    }
    Ok(DecodedFrame {
        hdr: Header {
            transaction_id: BigEndian::read_u16(transaction_buf),
            unit_id: adu_buf[0],
        },
        pdu: pdu_data,
    })
}

/// Write the MBAP header in front of the PDU that fills the rest of `frame`.
pub fn write_header(hdr: Header, frame: &mut [u8]) -> Result<()> {
    if frame.len() <= HEADER_LEN || frame.len() > MAX_FRAME_LEN {
        return Err(Error::BufferSize);
    }
    let length = (frame.len() - HEADER_LEN + 1) as u16;
    BigEndian::write_u16(&mut frame[0..2], hdr.transaction_id);
    BigEndian::write_u16(&mut frame[2..4], 0); //MODBUS Protocol
    BigEndian::write_u16(&mut frame[4..6], length);
    frame[6] = hdr.unit_id;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_write_single_register_request() {
        let buf = &[
            0x00, // Transaction id
            0x2a, // Transaction id
            0x00, // Protocol id
            0x00, // Protocol id
            0x00, // length
            0x06, // length
            0x12, // unit id
            0x06, // function code
            0x22, // addr
            0x22, // addr
            0xAB, // value
            0xCD, // value
        ];
        let DecodedFrame { hdr, pdu } = decode(buf).unwrap();
        assert_eq!(hdr.transaction_id, 42);
        assert_eq!(hdr.unit_id, 0x12);
        assert_eq!(pdu, &[0x06, 0x22, 0x22, 0xAB, 0xCD]);
    }

    #[test]
    fn decode_wrong_protocol() {
        let buf = &[
            0x00, 0x2a, // Transaction id
            0x00, 0x01, // Protocol id
            0x00, 0x06, // length
            0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD,
        ];
        assert_eq!(decode(buf), Err(Error::ProtocolNotModbus(1)));
    }

    #[test]
    fn decode_length_mismatch() {
        let buf = &[
            0x00, 0x2a, // Transaction id
            0x00, 0x00, // Protocol id
            0x00, 0x07, // length (one byte too many)
            0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD,
        ];
        assert_eq!(decode(buf), Err(Error::LengthMismatch(7, 6)));
    }

    #[test]
    fn decode_header_only() {
        assert_eq!(
            decode(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x12]),
            Err(Error::BufferSize)
        );
    }

    #[test]
    fn decode_oversized_frame() {
        assert_eq!(decode(&[0; MAX_FRAME_LEN + 1]), Err(Error::BufferSize));

        // Consistent length field, but the PDU exceeds 253 bytes
        let mut buf = [0; MAX_FRAME_LEN + 1];
        buf[..8].copy_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0xFF, 0x12, 0x10]);
        assert_eq!(decode(&buf), Err(Error::BufferSize));
        assert_eq!(
            decode(&buf[..MAX_FRAME_LEN]),
            Err(Error::LengthMismatch(255, 254))
        );
    }

    #[test]
    fn write_mbap_header() {
        let buf = &mut [0, 0, 0, 0, 0, 0, 0, 0x06, 0x22, 0x22, 0xAB, 0xCD];
        let hdr = Header {
            transaction_id: 42,
            unit_id: 0x12,
        };
        write_header(hdr, buf).unwrap();
        assert_eq!(&buf[..7], &[0x00, 0x2a, 0x00, 0x00, 0x00, 0x06, 0x12]);

        assert_eq!(write_header(hdr, &mut [0; 7]), Err(Error::BufferSize));
    }
}
