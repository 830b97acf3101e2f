// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use byteorder::{BigEndian, ByteOrder};
use modbus_engine::{
    AccessArgs, AccessError, BROADCAST_ADDRESS, DEFAULT_FUNCTIONS, Master, Query, Slave, rtu,
    util::swap16,
};
use proptest::prelude::*;

fn permissive(args: &AccessArgs) -> Result<u16, AccessError> {
    match args.query {
        Query::ReadCheck | Query::WriteCheck => Ok(1),
        Query::Read => Ok(args.index),
        Query::Write => Ok(0),
    }
}

proptest! {
    #[test]
    fn crc_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        prop_assert_eq!(rtu::crc16(&data), rtu::crc16(&data));
    }

    #[test]
    fn crc_detects_swapped_neighbours(
        mut data in proptest::collection::vec(any::<u8>(), 2..256),
        pos in any::<prop::sample::Index>(),
    ) {
        let i = pos.index(data.len() - 1);
        prop_assume!(data[i] != data[i + 1]);
        let before = rtu::crc16(&data);
        data.swap(i, i + 1);
        prop_assert_ne!(before, rtu::crc16(&data));
    }

    #[test]
    fn swap16_is_an_involution(x in any::<u16>()) {
        prop_assert_eq!(swap16(swap16(x)), x);
    }

    #[test]
    fn read_request_decodes_back(
        slave in 1u8..=247,
        first in 0u16..=0xFF00,
        count in 1u16..=125,
    ) {
        let mut master = Master::new();
        let frame = master.request_read_input_registers(slave, first, count).unwrap();
        let rtu::DecodedFrame { slave: decoded, pdu } = rtu::decode(frame).unwrap();
        prop_assert_eq!(decoded, slave);
        prop_assert_eq!(pdu[0], 0x04);
        prop_assert_eq!(BigEndian::read_u16(&pdu[1..3]), first);
        prop_assert_eq!(BigEndian::read_u16(&pdu[3..5]), count);
    }

    #[test]
    fn slave_never_panics(data in proptest::collection::vec(any::<u8>(), 0..300)) {
        let mut slave = Slave::new(0x01, DEFAULT_FUNCTIONS, permissive);
        let _ = slave.parse_request_rtu(&data);
        let _ = slave.parse_request_tcp(&data);
        let _ = slave.parse_request_pdu(0x01, &data);
    }

    #[test]
    fn slave_never_panics_on_sealed_frames(pdu in proptest::collection::vec(any::<u8>(), 1..253)) {
        let mut slave = Slave::new(0x01, DEFAULT_FUNCTIONS, permissive);
        let mut frame = vec![0x01];
        frame.extend_from_slice(&pdu);
        frame.extend_from_slice(&rtu::crc16(&frame).to_le_bytes());
        let _ = slave.parse_request_rtu(&frame);
    }

    #[test]
    fn broadcasts_are_never_answered(pdu in proptest::collection::vec(any::<u8>(), 1..253)) {
        let mut slave = Slave::new(0x01, DEFAULT_FUNCTIONS, permissive);
        let mut frame = vec![BROADCAST_ADDRESS];
        frame.extend_from_slice(&pdu);
        frame.extend_from_slice(&rtu::crc16(&frame).to_le_bytes());
        let _ = slave.parse_request_rtu(&frame);
        prop_assert!(slave.response().is_empty());
    }

    #[test]
    fn master_never_panics(data in proptest::collection::vec(any::<u8>(), 0..300)) {
        let mut master = Master::new();
        master.request_read_coils(0x01, 0, 16).unwrap();
        let _ = master.parse_response(&data);
        let _ = master.parse_read_holding_registers(&data);
    }
}
