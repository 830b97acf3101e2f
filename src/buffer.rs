// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame buffers and the allocators backing them.

use alloc::vec::Vec;

use crate::error::Error;

/// What a buffer is requested for.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPurpose {
    /// An outgoing request built by a master
    Request,
    /// An outgoing response built by a slave
    Response,
}

/// Storage strategy for a [`FrameBuffer`].
///
/// An allocator manages a single memory region. Embedded users can back it
/// with a static pool ([`FixedAllocator`]) instead of the heap.
pub trait Allocator {
    /// Make at least `size` bytes available.
    ///
    /// A `size` of zero releases the memory and must not fail. Implementations
    /// must not report success with less than `size` usable bytes.
    fn allocate(&mut self, size: usize, purpose: BufferPurpose) -> Result<(), Error>;

    /// The currently allocated memory.
    fn memory(&self) -> &[u8];

    /// The currently allocated memory.
    fn memory_mut(&mut self) -> &mut [u8];
}

/// Grows and shrinks a heap buffer to exactly the requested size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapAllocator {
    data: Vec<u8>,
}

impl Allocator for HeapAllocator {
    fn allocate(&mut self, size: usize, _purpose: BufferPurpose) -> Result<(), Error> {
        if size == 0 {
            self.data = Vec::new();
            return Ok(());
        }
        self.data
            .try_reserve_exact(size.saturating_sub(self.data.len()))
            .map_err(|_| Error::Allocation(size))?;
        self.data.resize(size, 0);
        self.data.shrink_to(size);
        Ok(())
    }

    fn memory(&self) -> &[u8] {
        &self.data
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Serves frames out of a fixed array of `N` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedAllocator<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> FixedAllocator<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { data: [0; N] }
    }
}

impl<const N: usize> Default for FixedAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Allocator for FixedAllocator<N> {
    fn allocate(&mut self, size: usize, _purpose: BufferPurpose) -> Result<(), Error> {
        if size > N {
            return Err(Error::Allocation(size));
        }
        Ok(())
    }

    fn memory(&self) -> &[u8] {
        &self.data
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// An explicitly sized frame on top of an [`Allocator`].
///
/// The buffer is empty until [`FrameBuffer::allocate`] is called. An empty
/// buffer means "nothing to send".
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer<A: ?Sized> {
    len: usize,
    allocator: A,
}

impl<A: Allocator> FrameBuffer<A> {
    pub const fn new(allocator: A) -> Self {
        Self { len: 0, allocator }
    }

    /// The allocator backing this buffer.
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<A: Allocator + ?Sized> FrameBuffer<A> {
    /// Reserve exactly `size` zeroed bytes and return them.
    ///
    /// The previous contents are discarded. On failure the buffer is empty.
    pub fn allocate(&mut self, size: usize, purpose: BufferPurpose) -> Result<&mut [u8], Error> {
        self.len = 0;
        self.allocator.allocate(size, purpose)?;
        let memory = self
            .allocator
            .memory_mut()
            .get_mut(..size)
            .ok_or(Error::Allocation(size))?;
        memory.fill(0);
        self.len = size;
        Ok(memory)
    }

    /// Release the frame. Freeing an empty buffer is a no-op.
    pub fn free(&mut self, purpose: BufferPurpose) {
        if self.len == 0 {
            return;
        }
        self.len = 0;
        if let Err(_err) = self.allocator.allocate(0, purpose) {
            #[cfg(feature = "log")]
            log::warn!("Failed to release {purpose:?} buffer: {_err}");
        }
    }

    /// The bytes of the current frame.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.allocator.memory()[..self.len]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut self.allocator.memory_mut()[..len]
    }

    /// Number of bytes in the current frame.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there is no frame.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}
