//! Scene camera.

use crate::native::Vector3D;
use glam::{Mat4, Vec3};
use latch_interop::{memory, CustomMarshaler, FieldCursor, Marshalable, NativeString};
use std::f32::consts::FRAC_PI_4;
use std::ptr::NonNull;

/// Native camera record. `look_at` is a direction relative to the camera,
/// not a target point.
#[derive(Debug, Default)]
pub struct CameraNative {
    pub name: NativeString,
    pub position: Vector3D,
    pub up: Vector3D,
    pub look_at: Vector3D,
    pub horizontal_fov: f32,
    pub clip_plane_near: f32,
    pub clip_plane_far: f32,
    pub aspect: f32,
    pub orthographic_width: f32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CameraMarshaler;

impl CustomMarshaler<CameraNative> for CameraMarshaler {
    fn native_data_size(&self) -> usize {
        let mut cursor = FieldCursor::sizing();
        cursor.skip_string();
        cursor.skip::<Vector3D>();
        cursor.skip::<Vector3D>();
        cursor.skip::<Vector3D>();
        for _ in 0..5 {
            cursor.skip::<f32>();
        }
        cursor.size()
    }

    unsafe fn decode(&self, src: *const u8) -> CameraNative {
        let mut cursor = FieldCursor::new(src as *mut u8);
        CameraNative {
            name: cursor.read_string(),
            position: cursor.read(),
            up: cursor.read(),
            look_at: cursor.read(),
            horizontal_fov: cursor.read(),
            clip_plane_near: cursor.read(),
            clip_plane_far: cursor.read(),
            aspect: cursor.read(),
            orthographic_width: cursor.read(),
        }
    }

    unsafe fn encode(&self, value: &CameraNative, dst: *mut u8) {
        let mut cursor = FieldCursor::new(dst);
        cursor.write_string(&value.name);
        cursor.write(value.position);
        cursor.write(value.up);
        cursor.write(value.look_at);
        cursor.write(value.horizontal_fov);
        cursor.write(value.clip_plane_near);
        cursor.write(value.clip_plane_far);
        cursor.write(value.aspect);
        cursor.write(value.orthographic_width);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: String,
    pub position: Vec3,
    pub up: Vec3,
    pub direction: Vec3,
    /// Half-angle of the horizontal field of view, in radians.
    pub field_of_view: f32,
    pub clip_plane_near: f32,
    pub clip_plane_far: f32,
    /// Width over height; zero means "derive from the viewport".
    pub aspect_ratio: f32,
    /// Zero for perspective cameras.
    pub orthographic_width: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            up: Vec3::Y,
            direction: Vec3::Z,
            field_of_view: FRAC_PI_4,
            clip_plane_near: 0.1,
            clip_plane_far: 1000.0,
            aspect_ratio: 0.0,
            orthographic_width: 0.0,
        }
    }
}

impl Camera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_orthographic(&self) -> bool {
        self.orthographic_width > 0.0
    }

    /// Right-handed view matrix looking along `direction`.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }
}

impl Marshalable for Camera {
    type Native = CameraNative;

    fn is_native_blittable(&self) -> bool {
        false
    }

    fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> CameraNative {
        CameraNative {
            name: NativeString::new(self.name.clone()),
            position: self.position.into(),
            up: self.up.into(),
            look_at: self.direction.into(),
            horizontal_fov: self.field_of_view,
            clip_plane_near: self.clip_plane_near,
            clip_plane_far: self.clip_plane_far,
            aspect: self.aspect_ratio,
            orthographic_width: self.orthographic_width,
        }
    }

    fn from_native(&mut self, native: &CameraNative) {
        self.name = native.name.as_str().to_owned();
        self.position = native.position.into();
        self.up = native.up.into();
        self.direction = native.look_at.into();
        self.field_of_view = native.horizontal_fov;
        self.clip_plane_near = native.clip_plane_near;
        self.clip_plane_far = native.clip_plane_far;
        self.aspect_ratio = native.aspect;
        self.orthographic_width = native.orthographic_width;
    }

    unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
        if free_top_level {
            memory::free(ptr);
        }
    }
}
