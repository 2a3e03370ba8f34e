//! Mesh face: a polygon given as indices into the mesh's vertex arrays.

use latch_interop::{marshal, memory, Marshalable};
use std::ptr::{self, NonNull};

/// Native face record: index count plus a pointer to the index buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FaceNative {
    pub num_indices: u32,
    pub indices: *mut u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Face {
    indices: Vec<u32>,
}

impl Face {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn indices_mut(&mut self) -> &mut Vec<u32> {
        &mut self.indices
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn has_indices(&self) -> bool {
        !self.indices.is_empty()
    }
}

impl Marshalable for Face {
    type Native = FaceNative;

    fn is_native_blittable(&self) -> bool {
        true
    }

    fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> FaceNative {
        FaceNative {
            num_indices: self.indices.len() as u32,
            indices: marshal::to_native_pod_array(&self.indices).cast(),
        }
    }

    fn from_native(&mut self, native: &FaceNative) {
        // SAFETY: the record was read from live native memory; its index
        // buffer holds `num_indices` entries.
        self.indices = unsafe {
            marshal::from_native_pod_array(native.indices.cast(), native.num_indices as usize)
        };
    }

    unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
        if ptr.is_null() {
            return;
        }
        let native = ptr::read_unaligned(ptr as *const FaceNative);
        memory::free(native.indices.cast());
        if free_top_level {
            memory::free(ptr);
        }
    }
}
