//! Raw memory primitives for buffers crossing the native boundary.
//!
//! Every allocation comes from the C heap so the native library can
//! release what we hand it (and we can release what it hands us). An
//! allocation never records its own length; callers carry it next to the
//! pointer, usually in a sibling count field of the native record.

use bytemuck::Pod;
use std::alloc::{handle_alloc_error, Layout};
use std::mem::{size_of, ManuallyDrop};
use std::ptr::{self, NonNull};
use thiserror::Error;

use crate::registry;

/// Width of a native pointer slot.
pub const POINTER_SIZE: usize = size_of::<*mut u8>();

/// Errors raised by the bounds-checked [`UnmanagedBuffer`] view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("access of {size} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        size: usize,
        len: usize,
    },
}

/// Allocate a zero-initialized unmanaged region of `size` bytes.
///
/// A zero-byte request still returns a unique, freeable pointer. Running
/// out of memory aborts through [`handle_alloc_error`].
pub fn allocate(size: usize) -> *mut u8 {
    allocate_non_null(size).as_ptr()
}

fn allocate_non_null(size: usize) -> NonNull<u8> {
    // calloc(0) may legally hand back null.
    let request = size.max(1);
    let raw = unsafe { libc::calloc(request, 1) } as *mut u8;
    match NonNull::new(raw) {
        Some(ptr) => ptr,
        None => handle_alloc_error(
            Layout::from_size_align(request, 1).unwrap_or_else(|_| Layout::new::<u8>()),
        ),
    }
}

/// Release a region obtained from [`allocate`] or from the native library.
///
/// # Safety
/// `ptr` must be null or a live C-heap allocation that is not freed again.
pub unsafe fn free(ptr: *mut u8) {
    if !ptr.is_null() {
        libc::free(ptr.cast());
    }
}

/// Copy `size` bytes from `src` to `dst`. Overlapping regions are allowed.
///
/// # Safety
/// Both regions must be valid for `size` bytes; nothing is bounds-checked.
#[inline]
pub unsafe fn copy(dst: *mut u8, src: *const u8, size: usize) {
    ptr::copy(src, dst, size);
}

/// Fill `size` bytes at `dst` with `fill`.
///
/// # Safety
/// `dst` must be valid for `size` writable bytes.
#[inline]
pub unsafe fn clear(dst: *mut u8, fill: u8, size: usize) {
    ptr::write_bytes(dst, fill, size);
}

/// Native byte size of a layout that is moved by raw copy.
#[inline]
pub const fn size_of_blittable<T>() -> usize {
    size_of::<T>()
}

/// Native byte size of a layout that may need a custom marshaler.
///
/// Falls back to the plain structure size when the global registry has no
/// marshaler declared for `T`.
pub fn size_of_via_marshaler<T: 'static>() -> usize {
    registry::global().native_size_of::<T>()
}

/// Read a pointer slot.
///
/// # Safety
/// `at` must be valid for [`POINTER_SIZE`] readable bytes.
#[inline]
pub unsafe fn read_ptr(at: *const u8) -> *mut u8 {
    ptr::read_unaligned(at as *const *mut u8)
}

/// Write a pointer slot.
///
/// # Safety
/// `at` must be valid for [`POINTER_SIZE`] writable bytes.
#[inline]
pub unsafe fn write_ptr(at: *mut u8, value: *mut u8) {
    ptr::write_unaligned(at as *mut *mut u8, value);
}

/// Owned unmanaged allocation with an explicit length.
///
/// Every accessor is checked against `len`, so mistakes surface as
/// [`MemoryError`] instead of silent corruption. Dropping the buffer frees
/// it; [`UnmanagedBuffer::into_raw`] hands ownership to native code.
#[derive(Debug)]
pub struct UnmanagedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer exclusively owns its allocation.
unsafe impl Send for UnmanagedBuffer {}

impl UnmanagedBuffer {
    /// Allocate a zeroed buffer of `len` bytes.
    pub fn allocate(len: usize) -> Self {
        Self {
            ptr: allocate_non_null(len),
            len,
        }
    }

    /// Adopt an existing allocation.
    ///
    /// # Safety
    /// `ptr` must be a live C-heap allocation of at least `len` bytes that
    /// nothing else will free.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Give up ownership, returning the raw pointer. The caller must free it.
    pub fn into_raw(self) -> *mut u8 {
        let this = ManuallyDrop::new(self);
        this.ptr.as_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: usize, size: usize) -> Result<(), MemoryError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                offset,
                size,
                len: self.len,
            }),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the allocation spans `len` initialized (zeroed) bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `src` into the buffer at `offset`.
    pub fn copy_from(&mut self, offset: usize, src: &[u8]) -> Result<(), MemoryError> {
        self.check(offset, src.len())?;
        self.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Fill `size` bytes at `offset` with `fill`.
    pub fn fill(&mut self, offset: usize, size: usize, fill: u8) -> Result<(), MemoryError> {
        self.check(offset, size)?;
        self.bytes_mut()[offset..offset + size].fill(fill);
        Ok(())
    }

    pub fn write_pod<T: Pod>(&mut self, offset: usize, value: &T) -> Result<(), MemoryError> {
        self.copy_from(offset, bytemuck::bytes_of(value))
    }

    pub fn read_pod<T: Pod>(&self, offset: usize) -> Result<T, MemoryError> {
        self.check(offset, size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(
            &self.bytes()[offset..offset + size_of::<T>()],
        ))
    }

    pub fn write_ptr(&mut self, offset: usize, value: *mut u8) -> Result<(), MemoryError> {
        self.check(offset, POINTER_SIZE)?;
        // SAFETY: slot range checked above.
        unsafe { write_ptr(self.ptr.as_ptr().add(offset), value) };
        Ok(())
    }

    pub fn read_ptr(&self, offset: usize) -> Result<*mut u8, MemoryError> {
        self.check(offset, POINTER_SIZE)?;
        // SAFETY: slot range checked above.
        Ok(unsafe { read_ptr(self.ptr.as_ptr().add(offset)) })
    }

    /// Addresses of consecutive `stride`-byte records that fit in the buffer.
    pub fn record_addresses(&self, stride: usize) -> impl Iterator<Item = NonNull<u8>> + '_ {
        let count = if stride == 0 { 0 } else { self.len / stride };
        (0..count).map(move |index| {
            // SAFETY: index * stride + stride <= len, so the address is in bounds
            // and derived from a non-null base.
            unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index * stride)) }
        })
    }
}

impl Drop for UnmanagedBuffer {
    fn drop(&mut self) {
        unsafe { free(self.ptr.as_ptr()) }
    }
}
