// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function handlers and the standard data access functions.

use core::fmt;

use byteorder::{BigEndian, ByteOrder};

use super::access::{AccessArgs, Query, RegisterAccess};
use crate::{
    buffer::{Allocator, BufferPurpose, FrameBuffer},
    codec::Framing,
    error::Error,
    frame::*,
    util::*,
};

/// Why a handler did not produce a regular response.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request is answered with an exception response.
    Exception(Exception),
    /// The request could not be processed locally; nothing is sent.
    Error(Error),
}

impl From<Exception> for Fault {
    fn from(ex: Exception) -> Self {
        Self::Exception(ex)
    }
}

impl From<Error> for Fault {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Exception(ex) => write!(f, "Exception: {ex}"),
            Self::Error(err) => fmt::Display::fmt(err, f),
        }
    }
}

/// Everything a handler may touch while processing one request.
pub struct Context<'a> {
    slave: SlaveId,
    function: u8,
    framing: Framing,
    access: &'a mut dyn RegisterAccess,
    response: &'a mut FrameBuffer<dyn Allocator + 'a>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        slave: SlaveId,
        function: u8,
        framing: Framing,
        access: &'a mut dyn RegisterAccess,
        response: &'a mut FrameBuffer<dyn Allocator + 'a>,
    ) -> Self {
        Self {
            slave,
            function,
            framing,
            access,
            response,
        }
    }

    /// The address the request was sent to.
    #[must_use]
    pub const fn slave(&self) -> SlaveId {
        self.slave
    }

    /// The function code of the request.
    #[must_use]
    pub const fn function(&self) -> u8 {
        self.function
    }

    /// Issue a single query to the register accessor.
    ///
    /// An accessor failure becomes [`Exception::ServerDeviceFailure`].
    pub fn access(
        &mut self,
        data_type: DataType,
        query: Query,
        index: Address,
        value: u16,
    ) -> Result<u16, Fault> {
        let args = AccessArgs {
            data_type,
            query,
            index,
            value,
            function: self.function,
        };
        self.access
            .access(&args)
            .map_err(|_| Fault::Exception(Exception::ServerDeviceFailure))
    }

    /// Run `query` (a check) on every index of a range.
    ///
    /// Fails with [`Exception::IllegalDataAddress`] if the range leaves the
    /// address space or any index is refused.
    pub fn check_range(
        &mut self,
        data_type: DataType,
        query: Query,
        first: Address,
        count: usize,
    ) -> Result<(), Fault> {
        debug_assert!(query.is_check());
        check_range(first, count).map_err(|_| Exception::IllegalDataAddress)?;
        for index in indices(first, count) {
            if self.access(data_type, query, index, 0)? == 0 {
                return Err(Exception::IllegalDataAddress.into());
            }
        }
        Ok(())
    }

    pub fn read(&mut self, data_type: DataType, index: Address) -> Result<u16, Fault> {
        self.access(data_type, Query::Read, index, 0)
    }

    pub fn write(&mut self, data_type: DataType, index: Address, value: u16) -> Result<(), Fault> {
        self.access(data_type, Query::Write, index, value)
            .map(|_| ())
    }

    /// Allocate a response PDU of `pdu_len` bytes.
    ///
    /// The function code is already filled in. The transport envelope is
    /// added after the handler returns.
    pub fn respond(&mut self, pdu_len: usize) -> Result<&mut [u8], Fault> {
        if pdu_len == 0 || pdu_len > MAX_PDU_LEN {
            return Err(Error::BufferSize.into());
        }
        let frame = self
            .response
            .allocate(self.framing.frame_len(pdu_len), BufferPurpose::Response)?;
        let pdu = self.framing.pdu_mut(frame)?;
        pdu[0] = self.function;
        Ok(pdu)
    }

    /// Respond with a copy of `pdu`.
    pub fn respond_with(&mut self, pdu: &[u8]) -> Result<(), Fault> {
        self.respond(pdu.len())?.copy_from_slice(pdu);
        Ok(())
    }
}

/// Processes requests for one function code.
///
/// `pdu` starts with the function code. The handler validates the payload,
/// accesses the data store through the [`Context`] and either calls
/// [`Context::respond`] or returns a [`Fault`].
pub trait FunctionHandler {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault>;
}

/// Associates a function code with its handler.
#[derive(Clone, Copy)]
pub struct FunctionEntry<'h> {
    pub function: u8,
    pub handler: &'h dyn FunctionHandler,
}

impl<'h> FunctionEntry<'h> {
    pub const fn new(function: u8, handler: &'h dyn FunctionHandler) -> Self {
        Self { function, handler }
    }
}

impl fmt::Debug for FunctionEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

/// Handlers for all standard data access functions.
pub const DEFAULT_FUNCTIONS: &[FunctionEntry<'static>] = &[
    FunctionEntry::new(0x01, &ReadBits(DataType::Coil)),
    FunctionEntry::new(0x02, &ReadBits(DataType::DiscreteInput)),
    FunctionEntry::new(0x03, &ReadRegisters(DataType::HoldingRegister)),
    FunctionEntry::new(0x04, &ReadRegisters(DataType::InputRegister)),
    FunctionEntry::new(0x05, &WriteSingleCoil),
    FunctionEntry::new(0x06, &WriteSingleRegister),
    FunctionEntry::new(0x0F, &WriteMultipleCoils),
    FunctionEntry::new(0x10, &WriteMultipleRegisters),
    FunctionEntry::new(0x16, &MaskWriteRegister),
];

fn indices(first: Address, count: usize) -> impl Iterator<Item = Address> {
    (0..count).map(move |i| first.wrapping_add(i as u16))
}

/// Read the start address and quantity of a request.
fn read_range(pdu: &[u8]) -> (Address, usize) {
    (
        BigEndian::read_u16(&pdu[1..3]),
        BigEndian::read_u16(&pdu[3..5]) as usize,
    )
}

/// Read coils (`0x01`) or discrete inputs (`0x02`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBits(pub DataType);

impl FunctionHandler for ReadBits {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() != 5 {
            return Err(Exception::IllegalDataValue.into());
        }
        let (first, count) = read_range(pdu);
        if count == 0 || count > MAX_READ_BITS {
            return Err(Exception::IllegalDataValue.into());
        }
        ctx.check_range(self.0, Query::ReadCheck, first, count)?;

        let mut bits = [0u8; packed_coils_len(MAX_READ_BITS)];
        for (i, index) in indices(first, count).enumerate() {
            let value = ctx.read(self.0, index)?;
            set_bit(&mut bits, i, value != 0)?;
        }
        let byte_count = packed_coils_len(count);
        let rsp = ctx.respond(2 + byte_count)?;
        rsp[1] = byte_count as u8;
        rsp[2..].copy_from_slice(&bits[..byte_count]);
        Ok(())
    }
}

/// Read holding registers (`0x03`) or input registers (`0x04`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRegisters(pub DataType);

impl FunctionHandler for ReadRegisters {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() != 5 {
            return Err(Exception::IllegalDataValue.into());
        }
        let (first, count) = read_range(pdu);
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(Exception::IllegalDataValue.into());
        }
        ctx.check_range(self.0, Query::ReadCheck, first, count)?;

        let mut words = [0u16; MAX_READ_REGISTERS];
        for (word, index) in words.iter_mut().zip(indices(first, count)) {
            *word = ctx.read(self.0, index)?;
        }
        let rsp = ctx.respond(2 + count * 2)?;
        rsp[1] = (count * 2) as u8;
        BigEndian::write_u16_into(&words[..count], &mut rsp[2..]);
        Ok(())
    }
}

/// Write single coil (`0x05`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoil;

impl FunctionHandler for WriteSingleCoil {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() != 5 {
            return Err(Exception::IllegalDataValue.into());
        }
        let index = BigEndian::read_u16(&pdu[1..3]);
        let state = u16_coil_to_bool(BigEndian::read_u16(&pdu[3..5]))
            .map_err(|_| Exception::IllegalDataValue)?;
        ctx.check_range(DataType::Coil, Query::WriteCheck, index, 1)?;
        ctx.write(DataType::Coil, index, u16::from(state))?;
        ctx.respond_with(pdu)
    }
}

/// Write single register (`0x06`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegister;

impl FunctionHandler for WriteSingleRegister {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() != 5 {
            return Err(Exception::IllegalDataValue.into());
        }
        let index = BigEndian::read_u16(&pdu[1..3]);
        let value = BigEndian::read_u16(&pdu[3..5]);
        ctx.check_range(DataType::HoldingRegister, Query::WriteCheck, index, 1)?;
        ctx.write(DataType::HoldingRegister, index, value)?;
        ctx.respond_with(pdu)
    }
}

/// Write multiple coils (`0x0F`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoils;

impl FunctionHandler for WriteMultipleCoils {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() < 6 {
            return Err(Exception::IllegalDataValue.into());
        }
        let (first, count) = read_range(pdu);
        let byte_count = pdu[5] as usize;
        if count == 0
            || count > MAX_WRITE_BITS
            || byte_count != packed_coils_len(count)
            || pdu.len() != 6 + byte_count
        {
            return Err(Exception::IllegalDataValue.into());
        }
        ctx.check_range(DataType::Coil, Query::WriteCheck, first, count)?;

        let bits = &pdu[6..];
        for (i, index) in indices(first, count).enumerate() {
            ctx.write(DataType::Coil, index, u16::from(get_bit(bits, i)))?;
        }
        ctx.respond_with(&pdu[..5])
    }
}

/// Write multiple registers (`0x10`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegisters;

impl FunctionHandler for WriteMultipleRegisters {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() < 6 {
            return Err(Exception::IllegalDataValue.into());
        }
        let (first, count) = read_range(pdu);
        let byte_count = pdu[5] as usize;
        if count == 0
            || count > MAX_WRITE_REGISTERS
            || byte_count != count * 2
            || pdu.len() != 6 + byte_count
        {
            return Err(Exception::IllegalDataValue.into());
        }
        ctx.check_range(DataType::HoldingRegister, Query::WriteCheck, first, count)?;

        for (value, index) in pdu[6..].chunks_exact(2).zip(indices(first, count)) {
            ctx.write(DataType::HoldingRegister, index, BigEndian::read_u16(value))?;
        }
        ctx.respond_with(&pdu[..5])
    }
}

/// Mask write register (`0x16`)
///
/// The new value is `(current & and_mask) | (or_mask & !and_mask)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteRegister;

impl FunctionHandler for MaskWriteRegister {
    fn handle(&self, ctx: &mut Context<'_>, pdu: &[u8]) -> Result<(), Fault> {
        if pdu.len() != 7 {
            return Err(Exception::IllegalDataValue.into());
        }
        let index = BigEndian::read_u16(&pdu[1..3]);
        let and_mask = BigEndian::read_u16(&pdu[3..5]);
        let or_mask = BigEndian::read_u16(&pdu[5..7]);
        ctx.check_range(DataType::HoldingRegister, Query::ReadCheck, index, 1)?;
        ctx.check_range(DataType::HoldingRegister, Query::WriteCheck, index, 1)?;

        let current = ctx.read(DataType::HoldingRegister, index)?;
        let value = (current & and_mask) | (or_mask & !and_mask);
        ctx.write(DataType::HoldingRegister, index, value)?;
        ctx.respond_with(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::HeapAllocator;
    use crate::slave::access::AccessError;

    /// Ten holding registers / coils at indices `0..10`; index 7 is read-only.
    #[derive(Default)]
    struct Store {
        registers: [u16; 10],
        coils: [bool; 10],
        writes: usize,
    }

    impl RegisterAccess for Store {
        fn access(&mut self, args: &AccessArgs) -> Result<u16, AccessError> {
            let idx = args.index as usize;
            if idx >= 10 {
                return Ok(0);
            }
            match args.query {
                Query::ReadCheck => Ok(1),
                Query::WriteCheck => Ok(u16::from(idx != 7)),
                Query::Read => match args.data_type {
                    DataType::Coil | DataType::DiscreteInput => Ok(u16::from(self.coils[idx])),
                    _ => Ok(self.registers[idx]),
                },
                Query::Write => {
                    self.writes += 1;
                    match args.data_type {
                        DataType::Coil => self.coils[idx] = args.value != 0,
                        _ => self.registers[idx] = args.value,
                    }
                    Ok(0)
                }
            }
        }
    }

    fn run(
        handler: &dyn FunctionHandler,
        store: &mut Store,
        pdu: &[u8],
    ) -> (Result<(), Fault>, alloc::vec::Vec<u8>) {
        let mut response = FrameBuffer::new(HeapAllocator::default());
        let result = {
            let mut ctx = Context::new(0x11, pdu[0], Framing::Pdu, store, &mut response);
            handler.handle(&mut ctx, pdu)
        };
        (result, response.as_slice().to_vec())
    }

    #[test]
    fn read_holding_registers() {
        let mut store = Store::default();
        store.registers[2] = 0xABCD;
        store.registers[3] = 0x0102;
        let (res, rsp) = run(
            &ReadRegisters(DataType::HoldingRegister),
            &mut store,
            &[0x03, 0x00, 0x02, 0x00, 0x02],
        );
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, &[0x03, 0x04, 0xAB, 0xCD, 0x01, 0x02]);
    }

    #[test]
    fn read_registers_with_invalid_quantity() {
        let mut store = Store::default();
        let handler = ReadRegisters(DataType::InputRegister);
        let (res, rsp) = run(&handler, &mut store, &[0x04, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataValue)));
        assert!(rsp.is_empty());
        let (res, _) = run(&handler, &mut store, &[0x04, 0x00, 0x00, 0x00, 126]);
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataValue)));
        let (res, _) = run(&handler, &mut store, &[0x04, 0x00, 0x00, 0x00]);
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataValue)));
    }

    #[test]
    fn read_registers_out_of_range() {
        let mut store = Store::default();
        let (res, _) = run(
            &ReadRegisters(DataType::HoldingRegister),
            &mut store,
            &[0x03, 0x00, 0x08, 0x00, 0x03],
        );
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataAddress)));
        let (res, _) = run(
            &ReadRegisters(DataType::HoldingRegister),
            &mut store,
            &[0x03, 0xFF, 0xFF, 0x00, 0x02],
        );
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataAddress)));
    }

    #[test]
    fn read_coils() {
        let mut store = Store::default();
        store.coils[0] = true;
        store.coils[2] = true;
        store.coils[9] = true;
        let (res, rsp) = run(
            &ReadBits(DataType::Coil),
            &mut store,
            &[0x01, 0x00, 0x00, 0x00, 0x0A],
        );
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, &[0x01, 0x02, 0b0000_0101, 0b10]);
    }

    #[test]
    fn write_single_coil() {
        let mut store = Store::default();
        let pdu = &[0x05, 0x00, 0x03, 0xFF, 0x00];
        let (res, rsp) = run(&WriteSingleCoil, &mut store, pdu);
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, pdu);
        assert!(store.coils[3]);

        let (res, _) = run(
            &WriteSingleCoil,
            &mut store,
            &[0x05, 0x00, 0x03, 0x12, 0x34],
        );
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataValue)));
    }

    #[test]
    fn write_single_read_only_register() {
        let mut store = Store::default();
        let (res, rsp) = run(
            &WriteSingleRegister,
            &mut store,
            &[0x06, 0x00, 0x07, 0x00, 0x01],
        );
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataAddress)));
        assert!(rsp.is_empty());
        assert_eq!(store.writes, 0);
    }

    #[test]
    fn write_multiple_registers_is_all_or_nothing() {
        let mut store = Store::default();
        let pdu = &[
            0x10, 0x00, 0x05, 0x00, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03,
        ];
        let (res, _) = run(&WriteMultipleRegisters, &mut store, pdu);
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataAddress)));
        assert_eq!(store.writes, 0);
        assert_eq!(store.registers, [0; 10]);

        let pdu = &[
            0x10, 0x00, 0x01, 0x00, 0x03, 0x06, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03,
        ];
        let (res, rsp) = run(&WriteMultipleRegisters, &mut store, pdu);
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, &pdu[..5]);
        assert_eq!(&store.registers[1..4], &[1, 2, 3]);
    }

    #[test]
    fn write_multiple_registers_with_wrong_byte_count() {
        let mut store = Store::default();
        let pdu = &[0x10, 0x00, 0x01, 0x00, 0x02, 0x05, 0xAB, 0xCD, 0xEF, 0x12];
        let (res, _) = run(&WriteMultipleRegisters, &mut store, pdu);
        assert_eq!(res, Err(Fault::Exception(Exception::IllegalDataValue)));
    }

    #[test]
    fn write_multiple_coils() {
        let mut store = Store::default();
        let pdu = &[0x0F, 0x00, 0x01, 0x00, 0x04, 0x01, 0b_0000_1101];
        let (res, rsp) = run(&WriteMultipleCoils, &mut store, pdu);
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, &pdu[..5]);
        assert_eq!(&store.coils[1..5], &[true, false, true, true]);
    }

    #[test]
    fn mask_write_register() {
        let mut store = Store::default();
        store.registers[4] = 0x12;
        let pdu = &[0x16, 0x00, 0x04, 0x00, 0xF2, 0x00, 0x25];
        let (res, rsp) = run(&MaskWriteRegister, &mut store, pdu);
        assert_eq!(res, Ok(()));
        assert_eq!(rsp, pdu);
        assert_eq!(store.registers[4], 0x17);
    }

    #[test]
    fn accessor_failure_is_a_device_failure() {
        let mut failing = |_: &AccessArgs| Err::<u16, _>(AccessError);
        let mut response = FrameBuffer::new(HeapAllocator::default());
        let mut ctx = Context::new(0x11, 0x03, Framing::Pdu, &mut failing, &mut response);
        assert_eq!(
            ctx.read(DataType::HoldingRegister, 0),
            Err(Fault::Exception(Exception::ServerDeviceFailure))
        );
    }

    #[test]
    fn default_table_covers_standard_functions() {
        let codes: alloc::vec::Vec<u8> = DEFAULT_FUNCTIONS.iter().map(|e| e.function).collect();
        assert_eq!(
            codes,
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10, 0x16]
        );
    }
}
