// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slave (server) side request processing.
//!
//! A [`Slave`] takes one complete request frame, dispatches it to the
//! [`FunctionHandler`] registered for its function code and leaves the
//! response frame (if any) in its response buffer.

mod access;
mod handlers;

pub use self::{access::*, handlers::*};

#[cfg(feature = "rtu")]
use crate::codec::rtu;
#[cfg(feature = "tcp")]
use crate::codec::tcp;
use crate::{
    buffer::{Allocator, BufferPurpose, FrameBuffer, HeapAllocator},
    codec::{Framing, encode_exception_pdu},
    error::Error,
    frame::*,
};

type Result<T> = core::result::Result<T, Error>;

/// A Modbus slave with a fixed address and a table of function handlers.
///
/// The slave borrows its handler table and owns the register accessor,
/// which doubles as the application context.
#[derive(Debug)]
pub struct Slave<'f, R, A = HeapAllocator, E = ()> {
    address: SlaveId,
    functions: &'f [FunctionEntry<'f>],
    access: R,
    listener: E,
    response: FrameBuffer<A>,
}

impl<'f, R> Slave<'f, R>
where
    R: RegisterAccess,
{
    /// Create a slave that answers to `address`.
    ///
    /// `functions` is searched front to back; the first entry with a
    /// matching function code wins.
    pub fn new(address: SlaveId, functions: &'f [FunctionEntry<'f>], access: R) -> Self {
        Self {
            address,
            functions,
            access,
            listener: (),
            response: FrameBuffer::new(HeapAllocator::default()),
        }
    }
}

impl<'f, R, A, E> Slave<'f, R, A, E> {
    /// Replace the allocator backing the response buffer.
    pub fn with_allocator<B: Allocator>(self, allocator: B) -> Slave<'f, R, B, E> {
        let Self {
            address,
            functions,
            access,
            listener,
            response: _,
        } = self;
        Slave {
            address,
            functions,
            access,
            listener,
            response: FrameBuffer::new(allocator),
        }
    }

    /// Get notified about every exception response.
    pub fn with_exception_listener<L: ExceptionListener>(self, listener: L) -> Slave<'f, R, A, L> {
        let Self {
            address,
            functions,
            access,
            listener: _,
            response,
        } = self;
        Slave {
            address,
            functions,
            access,
            listener,
            response,
        }
    }

    #[must_use]
    pub const fn address(&self) -> SlaveId {
        self.address
    }

    pub fn set_address(&mut self, address: SlaveId) {
        self.address = address;
    }

    #[must_use]
    pub const fn register_access(&self) -> &R {
        &self.access
    }

    pub fn register_access_mut(&mut self) -> &mut R {
        &mut self.access
    }

    #[must_use]
    pub const fn exception_listener(&self) -> &E {
        &self.listener
    }

    /// Consume the slave and return the register accessor.
    pub fn into_register_access(self) -> R {
        self.access
    }
}

impl<R, A, E> Slave<'_, R, A, E>
where
    A: Allocator,
{
    /// The response to the last processed request.
    ///
    /// Empty if there is nothing to send back.
    #[must_use]
    pub fn response(&self) -> &[u8] {
        self.response.as_slice()
    }

    pub fn free_response(&mut self) {
        self.response.free(BufferPurpose::Response);
    }
}

impl<R, A, E> Slave<'_, R, A, E>
where
    R: RegisterAccess,
    A: Allocator,
    E: ExceptionListener,
{
    /// Process a bare request PDU addressed to `slave`.
    ///
    /// No address filtering takes place. A request to the broadcast address
    /// is executed but never answered.
    pub fn parse_request_pdu(&mut self, slave: SlaveId, pdu: &[u8]) -> Result<()> {
        self.free_response();
        self.process(Framing::Pdu, slave, pdu)
    }

    /// Process a complete RTU request frame.
    ///
    /// Frames for other slaves are ignored without error. A frame with a
    /// bad checksum is rejected and never answered.
    #[cfg(feature = "rtu")]
    pub fn parse_request_rtu(&mut self, frame: &[u8]) -> Result<()> {
        self.free_response();
        let rtu::DecodedFrame { slave, pdu } = rtu::decode(frame)?;
        if slave != self.address && slave != BROADCAST_ADDRESS {
            #[cfg(feature = "log")]
            log::debug!("Ignoring RTU request for slave {slave}");
            return Ok(());
        }
        match rtu::request_pdu_len(frame) {
            Some(pdu_len) if pdu_len != pdu.len() => {
                #[cfg(feature = "log")]
                log::warn!(
                    "Dropping RTU request: PDU length {} != {pdu_len}",
                    pdu.len()
                );
                return Err(Error::LengthMismatch(
                    rtu::HEADER_LEN + pdu_len + rtu::CRC_LEN,
                    frame.len(),
                ));
            }
            _ => {}
        }
        self.process(Framing::Rtu, slave, pdu)
    }

    /// Process a complete TCP request frame.
    ///
    /// The response echoes the transaction id and the unit id. Besides the
    /// slave's own address the unit ids [`BROADCAST_ADDRESS`] and
    /// [`tcp::UNIT_ID_DIRECT`] are accepted.
    #[cfg(feature = "tcp")]
    pub fn parse_request_tcp(&mut self, frame: &[u8]) -> Result<()> {
        self.free_response();
        let tcp::DecodedFrame { hdr, pdu } = tcp::decode(frame)?;
        let unit_id = hdr.unit_id;
        if unit_id != self.address && unit_id != BROADCAST_ADDRESS && unit_id != tcp::UNIT_ID_DIRECT
        {
            #[cfg(feature = "log")]
            log::debug!("Ignoring TCP request for unit {unit_id}");
            return Ok(());
        }
        self.process(Framing::Tcp(hdr), unit_id, pdu)
    }

    /// Build an exception response into the response buffer.
    ///
    /// The exception listener is notified once the frame is complete. If the
    /// frame cannot be built the listener is not called.
    pub fn build_exception(
        &mut self,
        framing: Framing,
        slave: SlaveId,
        function: u8,
        exception: Exception,
    ) -> Result<()> {
        let pdu = encode_exception_pdu(function, exception);
        let frame = self
            .response
            .allocate(framing.frame_len(pdu.len()), BufferPurpose::Response)?;
        if let Err(err) = framing.pdu_mut(frame).map(|dst| dst.copy_from_slice(&pdu)) {
            self.free_response();
            return Err(err);
        }
        self.seal(framing, slave)?;
        #[cfg(feature = "log")]
        log::debug!("Responding to function {function:#04X} with exception: {exception}");
        self.listener.on_exception(slave, function, exception);
        Ok(())
    }

    fn process(&mut self, framing: Framing, slave: SlaveId, pdu: &[u8]) -> Result<()> {
        let Some(&function) = pdu.first() else {
            return Err(Error::BufferSize);
        };
        if pdu.len() > MAX_PDU_LEN {
            return Err(Error::BufferSize);
        }
        let broadcast = slave == BROADCAST_ADDRESS;
        let functions = self.functions;

        let Some(entry) = functions.iter().find(|e| e.function == function) else {
            #[cfg(feature = "log")]
            log::debug!("Unsupported function code {function:#04X}");
            return self.reject(
                framing,
                slave,
                function,
                Exception::IllegalFunction,
                broadcast,
            );
        };

        let result = {
            let mut ctx = Context::new(
                slave,
                function,
                framing,
                &mut self.access,
                &mut self.response,
            );
            entry.handler.handle(&mut ctx, pdu)
        };

        match result {
            Ok(()) if broadcast || self.response.is_empty() => {
                self.free_response();
                Ok(())
            }
            Ok(()) => self.seal(framing, slave),
            Err(Fault::Exception(exception)) => {
                self.reject(framing, slave, function, exception, broadcast)
            }
            Err(Fault::Error(err)) => {
                #[cfg(feature = "log")]
                log::error!("Failed to process function {function:#04X}: {err}");
                self.free_response();
                Err(err)
            }
        }
    }

    fn reject(
        &mut self,
        framing: Framing,
        slave: SlaveId,
        function: u8,
        exception: Exception,
        broadcast: bool,
    ) -> Result<()> {
        self.free_response();
        if broadcast {
            #[cfg(feature = "log")]
            log::debug!("Suppressing exception {exception} for broadcast request");
            return Ok(());
        }
        self.build_exception(framing, slave, function, exception)
    }

    fn seal(&mut self, framing: Framing, slave: SlaveId) -> Result<()> {
        let sealed = framing.seal(slave, self.response.as_mut_slice());
        if sealed.is_err() {
            self.free_response();
        }
        sealed
    }
}
