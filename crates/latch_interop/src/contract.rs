//! Capability contract for bridgeable types.
//!
//! A type joins the marshaling engine by describing its native counterpart
//! ([`Marshalable::Native`]) and how to convert to and from it. The engine
//! never looks at domain fields; it only moves native records around.

use std::ptr::NonNull;

/// Two-way conversion between a managed value and its native layout.
///
/// Implementors must be default-constructible: values read from native
/// memory start as `Default::default()` and are then populated through
/// [`Marshalable::from_native`].
///
/// Round trip: `from_native(&to_native(..))` must restore every field the
/// native layout carries. Derived or cached state may be recomputed.
pub trait Marshalable: Default {
    /// Native record for this type.
    ///
    /// When [`Marshalable::is_native_blittable`] is true the value's bytes
    /// are the native bytes and are copied verbatim. Otherwise the engine
    /// looks for a custom marshaler declared for this layout and falls back
    /// to a plain structure copy if none exists, so a non-blittable layout
    /// without a marshaler must still be plain `repr(C)` data.
    type Native: 'static;

    /// Whether [`Marshalable::Native`] moves by raw byte copy.
    fn is_native_blittable(&self) -> bool;

    /// Produce the native record.
    ///
    /// `this_ptr` is the address the record is about to be written to, for
    /// layouts that embed their own address (children pointing back at a
    /// parent, for example). Most implementations ignore it. Any child
    /// buffers allocated here become owned by the native record and are
    /// released by [`Marshalable::free_native`].
    fn to_native(&self, this_ptr: Option<NonNull<u8>>) -> Self::Native;

    /// Overwrite every managed field from `native`.
    ///
    /// Must be idempotent: applying the same record twice leaves the value
    /// as if it had been applied once.
    fn from_native(&mut self, native: &Self::Native);

    /// Release the child buffers owned by the native record at `ptr`, and
    /// the record's own allocation when `free_top_level` is set.
    ///
    /// # Safety
    /// `ptr` must be null or address a record produced for this type whose
    /// buffers have not already been released.
    unsafe fn free_native(ptr: *mut u8, free_top_level: bool);
}
