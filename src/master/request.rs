// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use byteorder::{BigEndian, ByteOrder};

use super::Master;
use crate::{
    buffer::{Allocator, BufferPurpose},
    codec::rtu,
    error::Error,
    frame::*,
    util::*,
};

type Result<T> = core::result::Result<T, Error>;

const fn check_quantity(count: usize, max: usize) -> Result<()> {
    if count == 0 || count > max {
        return Err(Error::Quantity(count));
    }
    Ok(())
}

impl<A: Allocator> Master<A> {
    /// Build a read coils (`0x01`) request.
    pub fn request_read_coils(
        &mut self,
        slave: SlaveId,
        first: Address,
        count: Quantity,
    ) -> Result<&[u8]> {
        self.read_request(FunctionCode::ReadCoils, slave, first, count, MAX_READ_BITS)
    }

    /// Build a read discrete inputs (`0x02`) request.
    pub fn request_read_discrete_inputs(
        &mut self,
        slave: SlaveId,
        first: Address,
        count: Quantity,
    ) -> Result<&[u8]> {
        self.read_request(
            FunctionCode::ReadDiscreteInputs,
            slave,
            first,
            count,
            MAX_READ_BITS,
        )
    }

    /// Build a read holding registers (`0x03`) request.
    pub fn request_read_holding_registers(
        &mut self,
        slave: SlaveId,
        first: Address,
        count: Quantity,
    ) -> Result<&[u8]> {
        self.read_request(
            FunctionCode::ReadHoldingRegisters,
            slave,
            first,
            count,
            MAX_READ_REGISTERS,
        )
    }

    /// Build a read input registers (`0x04`) request.
    pub fn request_read_input_registers(
        &mut self,
        slave: SlaveId,
        first: Address,
        count: Quantity,
    ) -> Result<&[u8]> {
        self.read_request(
            FunctionCode::ReadInputRegisters,
            slave,
            first,
            count,
            MAX_READ_REGISTERS,
        )
    }

    /// Build a write single coil (`0x05`) request.
    pub fn request_write_single_coil(
        &mut self,
        slave: SlaveId,
        index: Address,
        state: bool,
    ) -> Result<&[u8]> {
        self.build(FunctionCode::WriteSingleCoil, slave, 5, |pdu| {
            BigEndian::write_u16(&mut pdu[1..3], index);
            BigEndian::write_u16(&mut pdu[3..5], bool_to_u16_coil(state));
            Ok(())
        })
    }

    /// Build a write single register (`0x06`) request.
    pub fn request_write_single_register(
        &mut self,
        slave: SlaveId,
        index: Address,
        value: u16,
    ) -> Result<&[u8]> {
        self.build(FunctionCode::WriteSingleRegister, slave, 5, |pdu| {
            BigEndian::write_u16(&mut pdu[1..3], index);
            BigEndian::write_u16(&mut pdu[3..5], value);
            Ok(())
        })
    }

    /// Build a write multiple coils (`0x0F`) request.
    pub fn request_write_multiple_coils(
        &mut self,
        slave: SlaveId,
        first: Address,
        coils: &[bool],
    ) -> Result<&[u8]> {
        check_quantity(coils.len(), MAX_WRITE_BITS)?;
        check_range(first, coils.len())?;
        let byte_count = packed_coils_len(coils.len());
        self.build(
            FunctionCode::WriteMultipleCoils,
            slave,
            6 + byte_count,
            |pdu| {
                BigEndian::write_u16(&mut pdu[1..3], first);
                BigEndian::write_u16(&mut pdu[3..5], coils.len() as u16);
                pdu[5] = byte_count as u8;
                pack_coils(coils, &mut pdu[6..])?;
                Ok(())
            },
        )
    }

    /// Build a write multiple registers (`0x10`) request.
    pub fn request_write_multiple_registers(
        &mut self,
        slave: SlaveId,
        first: Address,
        values: &[u16],
    ) -> Result<&[u8]> {
        check_quantity(values.len(), MAX_WRITE_REGISTERS)?;
        check_range(first, values.len())?;
        let byte_count = values.len() * 2;
        self.build(
            FunctionCode::WriteMultipleRegisters,
            slave,
            6 + byte_count,
            |pdu| {
                BigEndian::write_u16(&mut pdu[1..3], first);
                BigEndian::write_u16(&mut pdu[3..5], values.len() as u16);
                pdu[5] = byte_count as u8;
                BigEndian::write_u16_into(values, &mut pdu[6..]);
                Ok(())
            },
        )
    }

    /// Build a mask write register (`0x16`) request.
    pub fn request_mask_write_register(
        &mut self,
        slave: SlaveId,
        index: Address,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<&[u8]> {
        self.build(FunctionCode::MaskWriteRegister, slave, 7, |pdu| {
            BigEndian::write_u16(&mut pdu[1..3], index);
            BigEndian::write_u16(&mut pdu[3..5], and_mask);
            BigEndian::write_u16(&mut pdu[5..7], or_mask);
            Ok(())
        })
    }

    fn read_request(
        &mut self,
        function: FunctionCode,
        slave: SlaveId,
        first: Address,
        count: Quantity,
        max: usize,
    ) -> Result<&[u8]> {
        check_quantity(count.into(), max)?;
        check_range(first, count.into())?;
        self.build(function, slave, 5, |pdu| {
            BigEndian::write_u16(&mut pdu[1..3], first);
            BigEndian::write_u16(&mut pdu[3..5], count);
            Ok(())
        })
    }

    /// Allocate an RTU frame, let `encode` fill the PDU payload and stamp
    /// the checksum.
    fn build<F>(
        &mut self,
        function: FunctionCode,
        slave: SlaveId,
        pdu_len: usize,
        encode: F,
    ) -> Result<&[u8]>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        self.reset();
        let frame = self.request.allocate(
            rtu::HEADER_LEN + pdu_len + rtu::CRC_LEN,
            BufferPurpose::Request,
        )?;
        frame[0] = slave;
        let pdu = &mut frame[rtu::HEADER_LEN..rtu::HEADER_LEN + pdu_len];
        pdu[0] = function.value();
        if let Err(err) = encode(pdu).and_then(|()| rtu::stamp_crc(frame)) {
            self.free_request();
            return Err(err);
        }
        Ok(self.request.as_slice())
    }
}
