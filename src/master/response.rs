// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use alloc::vec::Vec;

use byteorder::{BigEndian, ByteOrder};

use super::{Master, ResponseStatus};
use crate::{
    buffer::Allocator,
    codec::{EXCEPTION_BIT, decode_exception_pdu, rtu},
    error::Error,
    frame::*,
    util::*,
};

type Result<T> = core::result::Result<T, Error>;

impl<A: Allocator> Master<A> {
    /// Parse a response by routing it to the parser of its function code.
    ///
    /// Returns [`Error::FnCode`] for function codes without a parser.
    pub fn parse_response(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        let function = *frame.get(1).ok_or(Error::BufferSize)? & !EXCEPTION_BIT;
        match FunctionCode::new(function) {
            FunctionCode::Custom(code) => Err(Error::FnCode(code)),
            known => self.parse(known, frame),
        }
    }

    /// Parse the response to a read coils (`0x01`) request.
    pub fn parse_read_coils(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::ReadCoils, frame)
    }

    /// Parse the response to a read discrete inputs (`0x02`) request.
    pub fn parse_read_discrete_inputs(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::ReadDiscreteInputs, frame)
    }

    /// Parse the response to a read holding registers (`0x03`) request.
    pub fn parse_read_holding_registers(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::ReadHoldingRegisters, frame)
    }

    /// Parse the response to a read input registers (`0x04`) request.
    pub fn parse_read_input_registers(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::ReadInputRegisters, frame)
    }

    /// Parse the response to a write single coil (`0x05`) request.
    pub fn parse_write_single_coil(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::WriteSingleCoil, frame)
    }

    /// Parse the response to a write single register (`0x06`) request.
    pub fn parse_write_single_register(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::WriteSingleRegister, frame)
    }

    /// Parse the response to a write multiple coils (`0x0F`) request.
    pub fn parse_write_multiple_coils(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::WriteMultipleCoils, frame)
    }

    /// Parse the response to a write multiple registers (`0x10`) request.
    pub fn parse_write_multiple_registers(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::WriteMultipleRegisters, frame)
    }

    /// Parse the response to a mask write register (`0x16`) request.
    pub fn parse_mask_write_register(&mut self, frame: &[u8]) -> Result<ResponseStatus> {
        self.parse(FunctionCode::MaskWriteRegister, frame)
    }

    /// Validate `frame` against the remembered request in three stages:
    /// exact length, checksum and echoed fields.
    fn parse(&mut self, function: FunctionCode, frame: &[u8]) -> Result<ResponseStatus> {
        let pdu_len = rtu::response_pdu_len(frame)?.ok_or(Error::BufferSize)?;
        let frame_len = rtu::HEADER_LEN + pdu_len + rtu::CRC_LEN;
        if frame.len() != frame_len {
            return Err(Error::LengthMismatch(frame_len, frame.len()));
        }

        let rtu::DecodedFrame { slave, pdu } = match rtu::decode(frame) {
            Ok(decoded) => decoded,
            Err(err @ Error::Crc(..)) => {
                self.exception = Some(ExceptionRecord {
                    slave: frame[0],
                    function: frame[1] & !EXCEPTION_BIT,
                    exception: Exception::ChecksumFailure,
                });
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let request = self.request.as_slice();
        let req_end = request.len().saturating_sub(rtu::CRC_LEN);
        let Some(req_pdu) = request.get(rtu::HEADER_LEN..req_end) else {
            return Ok(self.mismatch());
        };
        if slave != request[0]
            || req_pdu.first() != Some(&function.value())
            || pdu[0] & !EXCEPTION_BIT != function.value()
        {
            return Ok(self.mismatch());
        }

        if pdu[0] & EXCEPTION_BIT != 0 {
            let (function, exception) = decode_exception_pdu(pdu)?;
            #[cfg(feature = "log")]
            log::debug!(
                "Slave {slave} answered function {function:#04X} with exception: {exception}"
            );
            self.exception = Some(ExceptionRecord {
                slave,
                function,
                exception,
            });
            self.error = true;
            self.finished = true;
            return Ok(ResponseStatus::Exception(exception));
        }

        match decode_records(function, slave, req_pdu, pdu)? {
            Some(data) => {
                self.data = data;
                self.error = false;
                self.finished = true;
                Ok(ResponseStatus::Parsed)
            }
            None => Ok(self.mismatch()),
        }
    }

    fn mismatch(&mut self) -> ResponseStatus {
        #[cfg(feature = "log")]
        log::warn!("Response does not match the request");
        self.error = true;
        self.finished = true;
        ResponseStatus::Mismatch
    }
}

/// Unpack the values of a validated response.
///
/// Returns `None` if a field echoed from the request does not match.
fn decode_records(
    function: FunctionCode,
    slave: SlaveId,
    req: &[u8],
    rsp: &[u8],
) -> Result<Option<Vec<DataRecord>>> {
    let record = |data_type, index, value| DataRecord {
        slave,
        data_type,
        index,
        value,
    };
    let mut data = Vec::new();
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
            let Some(data_type) = function.data_type() else {
                return Err(Error::FnCode(function.value()));
            };
            let first = BigEndian::read_u16(&req[1..3]);
            let count = BigEndian::read_u16(&req[3..5]) as usize;
            if rsp[1] as usize != packed_coils_len(count) {
                return Ok(None);
            }
            reserve(&mut data, count)?;
            let bits = &rsp[2..];
            for i in 0..count {
                let index = first.wrapping_add(i as u16);
                data.push(record(data_type, index, u16::from(get_bit(bits, i))));
            }
        }
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            let Some(data_type) = function.data_type() else {
                return Err(Error::FnCode(function.value()));
            };
            let first = BigEndian::read_u16(&req[1..3]);
            let count = BigEndian::read_u16(&req[3..5]) as usize;
            if rsp[1] as usize != count * 2 {
                return Ok(None);
            }
            reserve(&mut data, count)?;
            for (i, value) in rsp[2..].chunks_exact(2).enumerate() {
                let index = first.wrapping_add(i as u16);
                data.push(record(data_type, index, BigEndian::read_u16(value)));
            }
        }
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
            if rsp[1..5] != req[1..5] {
                return Ok(None);
            }
            let index = BigEndian::read_u16(&rsp[1..3]);
            let value = BigEndian::read_u16(&rsp[3..5]);
            let written = if function == FunctionCode::WriteSingleCoil {
                record(DataType::Coil, index, u16::from(u16_coil_to_bool(value)?))
            } else {
                record(DataType::HoldingRegister, index, value)
            };
            reserve(&mut data, 1)?;
            data.push(written);
        }
        FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
            if rsp[1..5] != req[1..5] {
                return Ok(None);
            }
        }
        FunctionCode::MaskWriteRegister => {
            if rsp[1..7] != req[1..7] {
                return Ok(None);
            }
        }
        FunctionCode::Custom(code) => return Err(Error::FnCode(code)),
    }
    Ok(Some(data))
}

fn reserve(data: &mut Vec<DataRecord>, count: usize) -> Result<()> {
    data.try_reserve_exact(count)
        .map_err(|_| Error::Allocation(count * core::mem::size_of::<DataRecord>()))
}
