// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::{convert::TryFrom, fmt};

use crate::error::Error;

/// Slave ID
pub type SlaveId = u8;

/// Station address that addresses all slaves at once.
///
/// Requests sent to it are executed but never answered.
pub const BROADCAST_ADDRESS: SlaveId = 0;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// Maximum number of coils or discrete inputs in one read request.
pub const MAX_READ_BITS: usize = 2000;

/// Maximum number of registers in one read request.
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of coils in one write request.
pub const MAX_WRITE_BITS: usize = 1968;

/// Maximum number of registers in one write request.
pub const MAX_WRITE_REGISTERS: usize = 123;

/// Maximum size of a PDU (function code + payload).
pub const MAX_PDU_LEN: usize = 253;

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Modbus Function Code: `01` (`0x01`).
    ReadCoils,

    /// Modbus Function Code: `02` (`0x02`).
    ReadDiscreteInputs,

    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `05` (`0x05`).
    WriteSingleCoil,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `15` (`0x0F`).
    WriteMultipleCoils,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Modbus Function Code: `22` (`0x16`).
    MaskWriteRegister,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            0x16 => Self::MaskWriteRegister,
            code => Self::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::MaskWriteRegister => 0x16,
            Self::Custom(code) => code,
        }
    }

    /// The type of data the function operates on, if it is a data access function.
    #[must_use]
    pub const fn data_type(self) -> Option<DataType> {
        match self {
            Self::ReadCoils | Self::WriteSingleCoil | Self::WriteMultipleCoils => {
                Some(DataType::Coil)
            }
            Self::ReadDiscreteInputs => Some(DataType::DiscreteInput),
            Self::ReadHoldingRegisters
            | Self::WriteSingleRegister
            | Self::WriteMultipleRegisters
            | Self::MaskWriteRegister => Some(DataType::HoldingRegister),
            Self::ReadInputRegisters => Some(DataType::InputRegister),
            Self::Custom(_) => None,
        }
    }
}

impl From<u8> for FunctionCode {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> Self {
        code.value()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// The kind of data a register access refers to.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Read/write single bit
    Coil,
    /// Read-only single bit
    DiscreteInput,
    /// Read/write 16 bit register
    HoldingRegister,
    /// Read-only 16 bit register
    InputRegister,
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    NegativeAcknowledge = 0x07,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
    /// Not part of the protocol: marks a frame whose CRC did not match.
    ///
    /// It is never sent over the wire.
    ChecksumFailure = 0xFF,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::NegativeAcknowledge => "Negative acknowledge",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
            Self::ChecksumFailure => "Checksum failure",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

#[cfg(all(feature = "defmt", target_os = "none"))]
impl defmt::Format for Exception {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.get_name())
    }
}

impl TryFrom<u8> for Exception {
    type Error = Error;

    /// Decode an exception code received over the wire.
    fn try_from(code: u8) -> Result<Self, Error> {
        use Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(Error::ExceptionCode(code));
            }
        };
        Ok(ex)
    }
}

/// An exception together with the exchange it belongs to.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord {
    pub slave: SlaveId,
    /// Function code of the request (without the exception bit)
    pub function: u8,
    pub exception: Exception,
}

/// A single value reported by a slave, normalized by the master.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRecord {
    pub slave: SlaveId,
    pub data_type: DataType,
    pub index: Address,
    /// Register value, or `0`/`1` for coils and discrete inputs
    pub value: u16,
}

/// Check that `count` items starting at `start` stay within the address space.
pub(crate) const fn check_range(start: Address, count: usize) -> Result<(), Error> {
    if start as usize + count > 0x1_0000 {
        return Err(Error::AddressRange(start, count));
    }
    Ok(())
}
