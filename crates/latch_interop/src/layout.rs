//! Sequential field walker for `repr(C)` native records.
//!
//! Custom marshalers use [`FieldCursor`] to place each field at the offset
//! a C compiler would give it: natural alignment before every field and
//! the record padded to its widest alignment at the end.

use std::mem::{align_of, size_of};
use std::ptr;

use crate::native_string::{
    read_native_string, write_native_string, NativeString, NATIVE_STRING_ALIGN,
    NATIVE_STRING_SIZE,
};

#[inline]
const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Walks the fields of a native record in declaration order.
#[derive(Debug)]
pub struct FieldCursor {
    base: *mut u8,
    offset: usize,
    align: usize,
}

impl FieldCursor {
    /// Cursor over the record at `base`.
    ///
    /// # Safety
    /// Every subsequent read or write must stay inside the record at `base`.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self {
            base,
            offset: 0,
            align: 1,
        }
    }

    /// Cursor that only measures; it never touches memory.
    pub fn sizing() -> Self {
        Self {
            base: ptr::null_mut(),
            offset: 0,
            align: 1,
        }
    }

    fn advance(&mut self, size: usize, align: usize) -> usize {
        let at = align_up(self.offset, align);
        self.offset = at + size;
        self.align = self.align.max(align);
        at
    }

    /// Offset of the next field of type `T`, advancing past it.
    pub fn skip<T>(&mut self) -> usize {
        self.advance(size_of::<T>(), align_of::<T>())
    }

    /// Offset of the next inline native string, advancing past it.
    pub fn skip_string(&mut self) -> usize {
        self.advance(NATIVE_STRING_SIZE, NATIVE_STRING_ALIGN)
    }

    /// Total record size, including trailing padding.
    pub fn size(&self) -> usize {
        align_up(self.offset, self.align)
    }

    /// # Safety
    /// The cursor must have been created over writable memory.
    pub unsafe fn write<T: Copy>(&mut self, value: T) {
        let at = self.skip::<T>();
        ptr::write_unaligned(self.base.add(at) as *mut T, value);
    }

    /// # Safety
    /// The cursor must have been created over memory holding a valid `T` here.
    pub unsafe fn read<T: Copy>(&mut self) -> T {
        let at = self.skip::<T>();
        ptr::read_unaligned(self.base.add(at) as *const T)
    }

    /// # Safety
    /// The cursor must have been created over writable memory.
    pub unsafe fn write_string(&mut self, value: &NativeString) {
        let at = self.skip_string();
        write_native_string(value.as_str(), self.base.add(at));
    }

    /// # Safety
    /// The cursor must have been created over readable memory.
    pub unsafe fn read_string(&mut self) -> NativeString {
        let at = self.skip_string();
        read_native_string(self.base.add(at))
    }
}
