//! Materials and their typed properties.
//!
//! A material is a flat list of properties keyed by name plus texture slot.
//! Each property records the kind of data it holds and stores it as raw
//! bytes; typed setters refuse to write a value of a different kind.

use bytemuck::Pod;
use glam::{Vec3, Vec4};
use latch_interop::{
    marshal, memory, native_string, ArrayLayout, CustomMarshaler, FieldCursor, Marshalable,
    NativeString,
};
use std::mem::size_of;
use std::ptr::{self, NonNull};

pub const MATERIAL_NAME_KEY: &str = "?mat.name";
pub const COLOR_DIFFUSE_KEY: &str = "$clr.diffuse";
pub const SHININESS_KEY: &str = "$mat.shininess";
pub const TWO_SIDED_KEY: &str = "$mat.twosided";

/// Kind of data a property holds, with the native library's tag values.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PropertyType {
    Float = 1,
    Double = 2,
    String = 3,
    Integer = 4,
    #[default]
    Buffer = 5,
}

impl PropertyType {
    /// Unknown tags are treated as opaque buffers.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Float,
            2 => Self::Double,
            3 => Self::String,
            4 => Self::Integer,
            _ => Self::Buffer,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// Native property record as seen from Rust. The inline key string makes
/// it non-blittable; [`MaterialPropertyMarshaler`] writes the real layout.
#[derive(Debug)]
pub struct MaterialPropertyNative {
    pub key: NativeString,
    pub semantic: u32,
    pub index: u32,
    pub data_length: u32,
    pub property_type: u32,
    pub data: *mut u8,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MaterialPropertyMarshaler;

impl CustomMarshaler<MaterialPropertyNative> for MaterialPropertyMarshaler {
    fn native_data_size(&self) -> usize {
        let mut cursor = FieldCursor::sizing();
        cursor.skip_string();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        cursor.skip::<*mut u8>();
        cursor.size()
    }

    unsafe fn decode(&self, src: *const u8) -> MaterialPropertyNative {
        let mut cursor = FieldCursor::new(src as *mut u8);
        MaterialPropertyNative {
            key: cursor.read_string(),
            semantic: cursor.read(),
            index: cursor.read(),
            data_length: cursor.read(),
            property_type: cursor.read(),
            data: cursor.read(),
        }
    }

    unsafe fn encode(&self, value: &MaterialPropertyNative, dst: *mut u8) {
        let mut cursor = FieldCursor::new(dst);
        cursor.write_string(&value.key);
        cursor.write(value.semantic);
        cursor.write(value.index);
        cursor.write(value.data_length);
        cursor.write(value.property_type);
        cursor.write(value.data);
    }
}

/// Typed material property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialProperty {
    name: String,
    property_type: PropertyType,
    texture_type: u32,
    texture_index: u32,
    raw_data: Vec<u8>,
}

impl MaterialProperty {
    /// Empty property of the given kind.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            ..Self::default()
        }
    }

    pub fn with_raw_data(
        name: impl Into<String>,
        property_type: PropertyType,
        raw_data: Vec<u8>,
    ) -> Self {
        Self {
            raw_data,
            ..Self::new(name, property_type)
        }
    }

    /// Bind the property to a texture slot.
    pub fn with_texture(mut self, texture_type: u32, texture_index: u32) -> Self {
        self.texture_type = texture_type;
        self.texture_index = texture_index;
        self
    }

    pub fn from_float(name: impl Into<String>, value: f32) -> Self {
        Self::with_pod(name, PropertyType::Float, &[value])
    }

    pub fn from_float_array(name: impl Into<String>, values: &[f32]) -> Self {
        Self::with_pod(name, PropertyType::Float, values)
    }

    pub fn from_double(name: impl Into<String>, value: f64) -> Self {
        Self::with_pod(name, PropertyType::Double, &[value])
    }

    pub fn from_integer(name: impl Into<String>, value: i32) -> Self {
        Self::with_pod(name, PropertyType::Integer, &[value])
    }

    pub fn from_integer_array(name: impl Into<String>, values: &[i32]) -> Self {
        Self::with_pod(name, PropertyType::Integer, values)
    }

    pub fn from_boolean(name: impl Into<String>, value: bool) -> Self {
        Self::from_integer(name, i32::from(value))
    }

    pub fn from_string(name: impl Into<String>, value: &str) -> Self {
        Self::with_raw_data(name, PropertyType::String, encode_string_data(value))
    }

    pub fn from_color4(name: impl Into<String>, value: Vec4) -> Self {
        Self::from_float_array(name, &value.to_array())
    }

    pub fn from_vector3(name: impl Into<String>, value: Vec3) -> Self {
        Self::from_float_array(name, &value.to_array())
    }

    fn with_pod<T: Pod>(name: impl Into<String>, property_type: PropertyType, values: &[T]) -> Self {
        Self::with_raw_data(name, property_type, bytemuck::cast_slice(values).to_vec())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn texture_type(&self) -> u32 {
        self.texture_type
    }

    pub fn texture_index(&self) -> u32 {
        self.texture_index
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn byte_count(&self) -> usize {
        self.raw_data.len()
    }

    /// `name,texture_type,texture_index`; unique within a material.
    pub fn fully_qualified_name(&self) -> String {
        fully_qualified_name(&self.name, self.texture_type, self.texture_index)
    }

    fn store<T: Pod>(&mut self, kind: PropertyType, values: &[T]) -> bool {
        if self.property_type != kind {
            return false;
        }
        self.raw_data = bytemuck::cast_slice(values).to_vec();
        true
    }

    fn load<T: Pod>(&self, kind: PropertyType) -> Vec<T> {
        if self.property_type != kind {
            return Vec::new();
        }
        self.raw_data
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn load_first<T: Pod>(&self, kind: PropertyType) -> Option<T> {
        if self.property_type != kind {
            return None;
        }
        self.raw_data
            .get(..size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
    }

    pub fn set_float_value(&mut self, value: f32) -> bool {
        self.store(PropertyType::Float, &[value])
    }

    pub fn set_float_array_value(&mut self, values: &[f32]) -> bool {
        self.store(PropertyType::Float, values)
    }

    pub fn set_double_value(&mut self, value: f64) -> bool {
        self.store(PropertyType::Double, &[value])
    }

    pub fn set_integer_value(&mut self, value: i32) -> bool {
        self.store(PropertyType::Integer, &[value])
    }

    pub fn set_integer_array_value(&mut self, values: &[i32]) -> bool {
        self.store(PropertyType::Integer, values)
    }

    /// Booleans are stored as integers.
    pub fn set_boolean_value(&mut self, value: bool) -> bool {
        self.set_integer_value(i32::from(value))
    }

    pub fn set_string_value(&mut self, value: &str) -> bool {
        if self.property_type != PropertyType::String {
            return false;
        }
        self.raw_data = encode_string_data(value);
        true
    }

    pub fn set_color4_value(&mut self, value: Vec4) -> bool {
        self.set_float_array_value(&value.to_array())
    }

    pub fn set_vector3_value(&mut self, value: Vec3) -> bool {
        self.set_float_array_value(&value.to_array())
    }

    pub fn get_float_value(&self) -> Option<f32> {
        self.load_first(PropertyType::Float)
    }

    pub fn get_float_array_value(&self) -> Vec<f32> {
        self.load(PropertyType::Float)
    }

    pub fn get_double_value(&self) -> Option<f64> {
        self.load_first(PropertyType::Double)
    }

    pub fn get_integer_value(&self) -> Option<i32> {
        self.load_first(PropertyType::Integer)
    }

    pub fn get_integer_array_value(&self) -> Vec<i32> {
        self.load(PropertyType::Integer)
    }

    pub fn get_boolean_value(&self) -> Option<bool> {
        self.get_integer_value().map(|value| value != 0)
    }

    pub fn get_string_value(&self) -> Option<String> {
        if self.property_type != PropertyType::String {
            return None;
        }
        decode_string_data(&self.raw_data)
    }

    pub fn get_color4_value(&self) -> Option<Vec4> {
        match self.get_float_array_value().as_slice() {
            [r, g, b, a, ..] => Some(Vec4::new(*r, *g, *b, *a)),
            _ => None,
        }
    }

    pub fn get_vector3_value(&self) -> Option<Vec3> {
        match self.get_float_array_value().as_slice() {
            [x, y, z, ..] => Some(Vec3::new(*x, *y, *z)),
            _ => None,
        }
    }
}

fn fully_qualified_name(name: &str, texture_type: u32, texture_index: u32) -> String {
    format!("{name},{texture_type},{texture_index}")
}

/// String property payload: `u32` length, UTF-8 bytes, NUL.
fn encode_string_data(text: &str) -> Vec<u8> {
    let len = native_string::encoded_len(text);
    let mut data = Vec::with_capacity(size_of::<u32>() + len + 1);
    data.extend_from_slice(&(len as u32).to_ne_bytes());
    data.extend_from_slice(&text.as_bytes()[..len]);
    data.push(0);
    data
}

fn decode_string_data(data: &[u8]) -> Option<String> {
    let prefix: [u8; 4] = data.get(..size_of::<u32>())?.try_into().ok()?;
    let text = &data[size_of::<u32>()..];
    let len = (u32::from_ne_bytes(prefix) as usize).min(text.len());
    Some(String::from_utf8_lossy(&text[..len]).into_owned())
}

impl Marshalable for MaterialProperty {
    type Native = MaterialPropertyNative;

    fn is_native_blittable(&self) -> bool {
        false
    }

    fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> MaterialPropertyNative {
        MaterialPropertyNative {
            key: NativeString::new(self.name.clone()),
            semantic: self.texture_type,
            index: self.texture_index,
            data_length: self.raw_data.len() as u32,
            property_type: self.property_type.as_raw(),
            data: marshal::to_native_pod_array(&self.raw_data),
        }
    }

    fn from_native(&mut self, native: &MaterialPropertyNative) {
        self.name = native.key.as_str().to_owned();
        self.texture_type = native.semantic;
        self.texture_index = native.index;
        self.property_type = PropertyType::from_raw(native.property_type);
        // SAFETY: `data` holds `data_length` bytes owned by the native record.
        self.raw_data =
            unsafe { marshal::from_native_pod_array(native.data, native.data_length as usize) };
    }

    unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
        if ptr.is_null() {
            return;
        }
        let mut cursor = FieldCursor::new(ptr);
        cursor.skip_string();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        cursor.skip::<u32>();
        let data: *mut u8 = cursor.read();
        memory::free(data);
        if free_top_level {
            memory::free(ptr);
        }
    }
}

/// Native material record: array of property pointers, count, capacity.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct MaterialNative {
    pub properties: *mut u8,
    pub num_properties: u32,
    pub num_allocated: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    properties: Vec<MaterialProperty>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn properties(&self) -> &[MaterialProperty] {
        &self.properties
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }

    fn position(&self, name: &str, texture_type: u32, texture_index: u32) -> Option<usize> {
        self.properties.iter().position(|p| {
            p.name == name && p.texture_type == texture_type && p.texture_index == texture_index
        })
    }

    /// Add a property, replacing (and returning) one with the same
    /// fully qualified name.
    pub fn add_property(&mut self, property: MaterialProperty) -> Option<MaterialProperty> {
        match self.position(&property.name, property.texture_type, property.texture_index) {
            Some(index) => Some(std::mem::replace(&mut self.properties[index], property)),
            None => {
                self.properties.push(property);
                None
            }
        }
    }

    pub fn remove_property(
        &mut self,
        name: &str,
        texture_type: u32,
        texture_index: u32,
    ) -> Option<MaterialProperty> {
        self.position(name, texture_type, texture_index)
            .map(|index| self.properties.remove(index))
    }

    /// Non-texture property by name.
    pub fn property(&self, name: &str) -> Option<&MaterialProperty> {
        self.texture_property(name, 0, 0)
    }

    pub fn texture_property(
        &self,
        name: &str,
        texture_type: u32,
        texture_index: u32,
    ) -> Option<&MaterialProperty> {
        self.position(name, texture_type, texture_index)
            .map(|index| &self.properties[index])
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut MaterialProperty> {
        self.position(name, 0, 0)
            .map(move |index| &mut self.properties[index])
    }

    pub fn name(&self) -> Option<String> {
        self.property(MATERIAL_NAME_KEY)?.get_string_value()
    }

    pub fn set_name(&mut self, name: &str) {
        self.add_property(MaterialProperty::from_string(MATERIAL_NAME_KEY, name));
    }

    pub fn color_diffuse(&self) -> Option<Vec4> {
        self.property(COLOR_DIFFUSE_KEY)?.get_color4_value()
    }

    pub fn set_color_diffuse(&mut self, color: Vec4) {
        self.add_property(MaterialProperty::from_color4(COLOR_DIFFUSE_KEY, color));
    }

    pub fn shininess(&self) -> Option<f32> {
        self.property(SHININESS_KEY)?.get_float_value()
    }

    pub fn set_shininess(&mut self, shininess: f32) {
        self.add_property(MaterialProperty::from_float(SHININESS_KEY, shininess));
    }

    pub fn is_two_sided(&self) -> bool {
        self.property(TWO_SIDED_KEY)
            .and_then(MaterialProperty::get_boolean_value)
            .unwrap_or(false)
    }

    pub fn set_two_sided(&mut self, two_sided: bool) {
        self.add_property(MaterialProperty::from_boolean(TWO_SIDED_KEY, two_sided));
    }
}

impl Marshalable for Material {
    type Native = MaterialNative;

    fn is_native_blittable(&self) -> bool {
        true
    }

    fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> MaterialNative {
        let count = self.properties.len() as u32;
        MaterialNative {
            properties: marshal::to_native_array(&self.properties, ArrayLayout::Pointers),
            num_properties: count,
            num_allocated: count,
        }
    }

    fn from_native(&mut self, native: &MaterialNative) {
        // SAFETY: `properties` holds `num_properties` pointer slots.
        self.properties = unsafe {
            marshal::from_native_array(
                native.properties,
                native.num_properties as usize,
                ArrayLayout::Pointers,
            )
        };
    }

    unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
        if ptr.is_null() {
            return;
        }
        let native = ptr::read_unaligned(ptr as *const MaterialNative);
        marshal::free_native_array_of::<MaterialProperty>(
            native.properties,
            native.num_properties as usize,
            ArrayLayout::Pointers,
        );
        if free_top_level {
            memory::free(ptr);
        }
    }
}
