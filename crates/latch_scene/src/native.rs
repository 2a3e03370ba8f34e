//! Plain-data native records shared by the scene types.
//!
//! These match the native library's math structs byte for byte and move
//! by raw copy. Conversions to `glam` happen at the managed surface.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vector3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vector3D {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vector3D> for Vec3 {
    fn from(v: Vector3D) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Color4D {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl From<Vec4> for Color4D {
    fn from(c: Vec4) -> Self {
        Self {
            r: c.x,
            g: c.y,
            b: c.z,
            a: c.w,
        }
    }
}

impl From<Color4D> for Vec4 {
    fn from(c: Color4D) -> Self {
        Vec4::new(c.r, c.g, c.b, c.a)
    }
}

/// Row-major 4x4 matrix, as the native library stores it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Matrix4x4 {
    pub rows: [[f32; 4]; 4],
}

impl From<Mat4> for Matrix4x4 {
    fn from(m: Mat4) -> Self {
        // glam is column-major; the transpose's columns are our rows.
        Self {
            rows: m.transpose().to_cols_array_2d(),
        }
    }
}

impl From<Matrix4x4> for Mat4 {
    fn from(m: Matrix4x4) -> Self {
        Mat4::from_cols_array_2d(&m.rows).transpose()
    }
}
