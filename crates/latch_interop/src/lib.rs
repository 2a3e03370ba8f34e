//! Latch Interop
//!
//! Managed/native marshaling engine used by the engine's native-library
//! bindings:
//! - Capability contract every bridgeable type implements
//! - Raw memory primitives over the C heap
//! - Custom marshaler registry for layouts that are not raw-copyable
//! - Generic single value / array conversion with explicit layouts
//!
//! ```ignore
//! use latch_interop::{marshal, ArrayLayout};
//!
//! let native = marshal::to_native_array(&faces, ArrayLayout::Values);
//! // ... hand `native` to the library ...
//! unsafe { marshal::free_native_array_of::<Face>(native, faces.len(), ArrayLayout::Values) };
//! ```

pub mod contract;
pub mod layout;
pub mod marshal;
pub mod memory;
pub mod native_string;
pub mod registry;

pub use contract::Marshalable;
pub use layout::FieldCursor;
pub use marshal::ArrayLayout;
pub use memory::{MemoryError, UnmanagedBuffer, POINTER_SIZE};
pub use native_string::{NativeString, NativeStringMarshaler, MAX_STRING_LENGTH};
pub use registry::{CustomMarshaler, MarshalerRegistry, RegistryError};

/// Interop crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
