// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]
#![no_std]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod buffer;
mod codec;
mod error;
mod frame;
#[cfg(feature = "rtu")]
mod master;
mod slave;
pub mod util;

#[cfg(feature = "rtu")]
pub use codec::rtu;
#[cfg(feature = "tcp")]
pub use codec::tcp;
pub use codec::{EXCEPTION_BIT, Framing, decode_exception_pdu, encode_exception_pdu};
pub use error::*;
pub use frame::*;
#[cfg(feature = "rtu")]
pub use master::*;
pub use slave::*;
