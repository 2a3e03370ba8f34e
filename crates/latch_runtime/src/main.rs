//! Latch Runtime
//!
//! Boots the interop layer and pushes a sample scene through a native
//! round trip. Usage: `latch [settings.json] [asset-file]`

use anyhow::{ensure, Context, Result};
use glam::{Mat4, Vec3, Vec4};
use latch_asset::AssetSettings;
use latch_interop::{marshal, ArrayLayout};
use latch_scene::{Camera, Face, Material, Node};

fn sample_scene() -> (Node, Vec<Material>, Vec<Camera>, Vec<Face>) {
    let mut root = Node::new("root");
    let body = root.add_child(Node::new("body").with_meshes(vec![0]));
    body.add_child(
        Node::new("turret")
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)))
            .with_meshes(vec![1]),
    );

    let mut material = Material::new();
    material.set_name("Hull");
    material.set_color_diffuse(Vec4::new(0.4, 0.45, 0.5, 1.0));
    material.set_shininess(24.0);

    let camera = Camera {
        position: Vec3::new(0.0, 3.0, -8.0),
        ..Camera::new("chase")
    };

    let faces = vec![Face::new(vec![0, 1, 2]), Face::new(vec![2, 3, 0])];
    (root, vec![material], vec![camera], faces)
}

fn round_trip() -> Result<()> {
    let (root, materials, cameras, faces) = sample_scene();

    let native_root = marshal::to_native_ptr(Some(&root));
    let native_materials = marshal::to_native_array(&materials, ArrayLayout::Pointers);
    let native_cameras = marshal::to_native_array(&cameras, ArrayLayout::Pointers);
    let native_faces = marshal::to_native_array(&faces, ArrayLayout::Values);

    // SAFETY: every pointer above was produced by the matching `to_native_*`
    // call with the same count and layout, and is freed exactly once.
    let (root_back, materials_back, cameras_back, faces_back) = unsafe {
        let back = (
            marshal::from_native_ptr::<Node>(native_root),
            marshal::from_native_array::<Material>(
                native_materials,
                materials.len(),
                ArrayLayout::Pointers,
            ),
            marshal::from_native_array::<Camera>(
                native_cameras,
                cameras.len(),
                ArrayLayout::Pointers,
            ),
            marshal::from_native_array::<Face>(native_faces, faces.len(), ArrayLayout::Values),
        );
        marshal::free_native_ptr::<Node>(native_root);
        marshal::free_native_array_of::<Material>(
            native_materials,
            materials.len(),
            ArrayLayout::Pointers,
        );
        marshal::free_native_array_of::<Camera>(
            native_cameras,
            cameras.len(),
            ArrayLayout::Pointers,
        );
        marshal::free_native_array_of::<Face>(native_faces, faces.len(), ArrayLayout::Values);
        back
    };

    ensure!(root_back.as_ref() == Some(&root), "node hierarchy changed in transit");
    ensure!(materials_back == materials, "materials changed in transit");
    ensure!(cameras_back == cameras, "cameras changed in transit");
    ensure!(faces_back == faces, "faces changed in transit");

    tracing::info!(
        nodes = root.descendant_count() + 1,
        materials = materials.len(),
        cameras = cameras.len(),
        faces = faces.len(),
        "scene round trip verified"
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Latch Interop v{}", latch_interop::VERSION);

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => AssetSettings::load(&path)
            .with_context(|| format!("loading settings from {path}"))?,
        None => AssetSettings::default(),
    };

    latch_scene::init().context("registering scene marshalers")?;
    round_trip()?;

    if let Some(asset) = args.next() {
        let bytes = latch_asset::load_bytes(&asset, &settings)
            .with_context(|| format!("reading {asset}"))?;
        tracing::info!(path = %asset, len = bytes.len(), "asset loaded");
    }

    Ok(())
}
