// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract between function handlers and the application's data store.

use core::fmt;

use crate::frame::{Address, DataType, Exception, SlaveId};

/// What a register access asks for.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// May the register be read?
    ReadCheck,
    /// May the register be written?
    WriteCheck,
    /// Read the register
    Read,
    /// Write the register
    Write,
}

impl Query {
    /// Check queries must be answered without side effects.
    #[must_use]
    pub const fn is_check(self) -> bool {
        matches!(self, Self::ReadCheck | Self::WriteCheck)
    }
}

/// Arguments of a single register access.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessArgs {
    pub data_type: DataType,
    pub query: Query,
    pub index: Address,
    /// The value to write (`0`/`1` for coils); `0` for all other queries
    pub value: u16,
    /// Function code of the request that caused the access
    pub function: u8,
}

/// The data store refused or failed an access.
///
/// It is answered with a [`Exception::ServerDeviceFailure`].
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessError;

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Register access failed")
    }
}

/// Reads and writes the application's coils and registers.
///
/// The slave never owns the data; every access goes through this trait.
///
/// - [`Query::ReadCheck`] and [`Query::WriteCheck`] return a non-zero value
///   if the corresponding [`Query::Read`] or [`Query::Write`] would succeed
///   and `0` otherwise. They must not change any state.
/// - [`Query::Read`] returns the current value (`0`/`1` for bits).
/// - [`Query::Write`] stores [`AccessArgs::value`]; the returned value is
///   ignored.
///
/// Handlers check a whole range before they write any part of it, so a
/// write request is either applied completely or not at all as long as the
/// checks are honest.
pub trait RegisterAccess {
    fn access(&mut self, args: &AccessArgs) -> Result<u16, AccessError>;
}

impl<F> RegisterAccess for F
where
    F: FnMut(&AccessArgs) -> Result<u16, AccessError>,
{
    fn access(&mut self, args: &AccessArgs) -> Result<u16, AccessError> {
        self(args)
    }
}

/// Gets notified about every exception response a slave builds.
pub trait ExceptionListener {
    fn on_exception(&mut self, slave: SlaveId, function: u8, exception: Exception);
}

/// Ignores all exceptions.
impl ExceptionListener for () {
    fn on_exception(&mut self, _: SlaveId, _: u8, _: Exception) {}
}

impl<F> ExceptionListener for F
where
    F: FnMut(SlaveId, u8, Exception),
{
    fn on_exception(&mut self, slave: SlaveId, function: u8, exception: Exception) {
        self(slave, function, exception);
    }
}
