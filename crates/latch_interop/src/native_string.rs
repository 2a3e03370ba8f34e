//! Fixed-capacity native string.
//!
//! The native side stores text inline as a `u32` byte length followed by a
//! fixed 1024-byte UTF-8 buffer. That shape cannot be produced by copying a
//! Rust `String`, so it crosses the boundary through [`NativeStringMarshaler`].

use std::fmt;
use std::mem::size_of;
use std::ptr;

use crate::registry::CustomMarshaler;

/// Capacity of the inline text buffer, terminator included.
pub const MAX_STRING_LENGTH: usize = 1024;

/// Total native size: length prefix plus inline buffer.
pub const NATIVE_STRING_SIZE: usize = size_of::<u32>() + MAX_STRING_LENGTH;

/// Alignment of the native record (that of its `u32` length prefix).
pub const NATIVE_STRING_ALIGN: usize = std::mem::align_of::<u32>();

/// Managed view of a native fixed-capacity string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NativeString(String);

impl NativeString {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Byte length the text occupies once encoded (after truncation).
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.0)
    }
}

impl From<&str> for NativeString {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

impl From<String> for NativeString {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for NativeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marshaler for [`NativeString`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeStringMarshaler;

impl CustomMarshaler<NativeString> for NativeStringMarshaler {
    fn native_data_size(&self) -> usize {
        NATIVE_STRING_SIZE
    }

    unsafe fn decode(&self, src: *const u8) -> NativeString {
        read_native_string(src)
    }

    unsafe fn encode(&self, value: &NativeString, dst: *mut u8) {
        write_native_string(value.as_str(), dst);
    }
}

/// Length of the longest prefix of `text` that fits the buffer with room
/// for a NUL, cut on a char boundary.
pub fn encoded_len(text: &str) -> usize {
    let mut len = text.len().min(MAX_STRING_LENGTH - 1);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Encode `text` as a native string record at `dst`.
///
/// # Safety
/// `dst` must be valid for [`NATIVE_STRING_SIZE`] writable bytes.
pub unsafe fn write_native_string(text: &str, dst: *mut u8) {
    let len = encoded_len(text);
    ptr::write_unaligned(dst as *mut u32, len as u32);
    let data = dst.add(size_of::<u32>());
    ptr::copy_nonoverlapping(text.as_ptr(), data, len);
    ptr::write_bytes(data.add(len), 0, MAX_STRING_LENGTH - len);
}

/// Decode a native string record at `src`.
///
/// A recorded length beyond the buffer is clamped; invalid UTF-8 is
/// replaced rather than rejected.
///
/// # Safety
/// `src` must be valid for [`NATIVE_STRING_SIZE`] readable bytes.
pub unsafe fn read_native_string(src: *const u8) -> NativeString {
    let len = (ptr::read_unaligned(src as *const u32) as usize).min(MAX_STRING_LENGTH);
    let bytes = std::slice::from_raw_parts(src.add(size_of::<u32>()), len);
    NativeString(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFFu8; NATIVE_STRING_SIZE];
        unsafe { NativeStringMarshaler.encode(&NativeString::from(text), bytes.as_mut_ptr()) };
        bytes
    }

    #[test]
    fn encodes_length_prefix_and_terminator() {
        let bytes = encode("diffuse");
        assert_eq!(u32::from_ne_bytes(bytes[..4].try_into().unwrap()), 7);
        assert_eq!(&bytes[4..11], b"diffuse");
        assert!(bytes[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn round_trips_text() {
        let bytes = encode("Körper/Mesh 01");
        let decoded = unsafe { NativeStringMarshaler.decode(bytes.as_ptr()) };
        assert_eq!(decoded.as_str(), "Körper/Mesh 01");
    }

    #[test]
    fn empty_string_round_trips() {
        let bytes = encode("");
        let decoded = unsafe { read_native_string(bytes.as_ptr()) };
        assert_eq!(decoded, NativeString::default());
    }

    #[test]
    fn truncates_on_char_boundary() {
        // 1022 ASCII bytes followed by a two-byte char: only 1023 bytes fit.
        let text = format!("{}é", "a".repeat(MAX_STRING_LENGTH - 2));
        let native = NativeString::new(text.clone());
        assert_eq!(native.encoded_len(), MAX_STRING_LENGTH - 2);

        let bytes = encode(&text);
        let decoded = unsafe { read_native_string(bytes.as_ptr()) };
        assert_eq!(decoded.as_str(), &text[..MAX_STRING_LENGTH - 2]);
        assert_eq!(bytes[NATIVE_STRING_SIZE - 1], 0);
    }

    #[test]
    fn bogus_length_is_clamped() {
        let mut bytes = vec![b'x'; NATIVE_STRING_SIZE];
        bytes[..4].copy_from_slice(&u32::MAX.to_ne_bytes());
        let decoded = unsafe { read_native_string(bytes.as_ptr()) };
        assert_eq!(decoded.as_str().len(), MAX_STRING_LENGTH);
    }
}
