// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master (client) side: RTU request builders and response parsers.
//!
//! A [`Master`] is one request/response session. Every builder replaces the
//! remembered request; the matching response is then validated against it.

mod request;
mod response;

use alloc::vec::Vec;

use crate::{
    buffer::{Allocator, BufferPurpose, FrameBuffer, HeapAllocator},
    frame::*,
};

/// Outcome of a response that passed the length and checksum checks.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The response matches the request and its values were stored.
    Parsed,
    /// The echoed fields do not match the request.
    Mismatch,
    /// The slave answered with an exception.
    Exception(Exception),
}

/// State of a single master session.
#[derive(Debug, Clone)]
pub struct Master<A = HeapAllocator> {
    request: FrameBuffer<A>,
    finished: bool,
    error: bool,
    exception: Option<ExceptionRecord>,
    data: Vec<DataRecord>,
}

impl Master {
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(HeapAllocator::default())
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Master<A> {
    /// Create a session whose request frames live in `allocator`.
    pub const fn with_allocator(allocator: A) -> Self {
        Self {
            request: FrameBuffer::new(allocator),
            finished: false,
            error: false,
            exception: None,
            data: Vec::new(),
        }
    }

    /// The last request frame built.
    #[must_use]
    pub fn request(&self) -> &[u8] {
        self.request.as_slice()
    }

    pub fn free_request(&mut self) {
        self.request.free(BufferPurpose::Request);
    }

    /// A response to the current request has been processed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// The last processed response was a mismatch or an exception.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error
    }

    #[must_use]
    pub const fn exception(&self) -> Option<&ExceptionRecord> {
        self.exception.as_ref()
    }

    /// Values of the response to the current request.
    ///
    /// Building a request clears them; only a response that passes all
    /// checks fills them in again.
    #[must_use]
    pub fn data(&self) -> &[DataRecord] {
        &self.data
    }

    /// Take the values of the response to the current request.
    pub fn take_data(&mut self) -> Vec<DataRecord> {
        core::mem::take(&mut self.data)
    }

    fn reset(&mut self) {
        self.finished = false;
        self.error = false;
        self.exception = None;
        self.data.clear();
    }
}
