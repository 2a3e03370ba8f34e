//! Latch Scene
//!
//! Managed scene types and their native-library records:
//! - Plain-data math records (`Vector3D`, `Color4D`, `Matrix4x4`)
//! - Faces, materials, cameras and the node hierarchy
//!
//! Call [`init`] once before marshaling any of the non-blittable types so
//! their custom marshalers are declared with the global registry.

pub mod camera;
pub mod face;
pub mod material;
pub mod native;
pub mod node;

pub use camera::{Camera, CameraMarshaler, CameraNative};
pub use face::{Face, FaceNative};
pub use material::{
    Material, MaterialNative, MaterialProperty, MaterialPropertyMarshaler,
    MaterialPropertyNative, PropertyType,
};
pub use native::{Color4D, Matrix4x4, Vector3D};
pub use node::{Node, NodeMarshaler, NodeNative};

use latch_interop::{registry, MarshalerRegistry, RegistryError};
use once_cell::sync::OnceCell;
use tracing::info;

/// Declare the marshalers for this crate's non-blittable layouts.
pub fn register_marshalers(registry: &MarshalerRegistry) -> Result<(), RegistryError> {
    registry.declare::<MaterialPropertyNative, MaterialPropertyMarshaler>()?;
    registry.declare::<CameraNative, CameraMarshaler>()?;
    registry.declare::<NodeNative, NodeMarshaler>()?;
    Ok(())
}

/// Register with the global registry. Safe to call any number of times;
/// only the first call declares anything.
pub fn init() -> Result<(), RegistryError> {
    static INIT: OnceCell<Result<(), RegistryError>> = OnceCell::new();
    INIT.get_or_init(|| {
        let result = register_marshalers(registry::global());
        if result.is_ok() {
            info!("scene marshalers registered");
        }
        result
    })
    .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use latch_interop::CustomMarshaler;

    #[test]
    fn init_is_idempotent() {
        init().unwrap();
        init().unwrap();
        assert!(registry::global().has_marshaler::<NodeNative>());
        assert!(registry::global().has_marshaler::<CameraNative>());
    }

    #[test]
    fn private_registry_rejects_second_registration() {
        let registry = MarshalerRegistry::new();
        register_marshalers(&registry).unwrap();
        assert!(matches!(
            register_marshalers(&registry),
            Err(RegistryError::DuplicateDeclaration { .. })
        ));
        assert_eq!(registry.native_size_of::<CameraNative>(), CameraMarshaler.native_data_size());
    }
}
