//! Scene graph node.
//!
//! Children cross the boundary as an array of pointers to separately
//! allocated node records. Each child record carries a back-pointer to its
//! parent, which is only known once the parent's own record has an address.

use crate::native::Matrix4x4;
use glam::Mat4;
use latch_interop::{
    marshal, memory, ArrayLayout, CustomMarshaler, FieldCursor, Marshalable, NativeString,
    POINTER_SIZE,
};
use std::ptr::{self, NonNull};
use tracing::trace;

/// Native node record.
#[derive(Debug)]
pub struct NodeNative {
    pub name: NativeString,
    pub transformation: Matrix4x4,
    pub parent: *mut u8,
    pub num_children: u32,
    pub children: *mut u8,
    pub num_meshes: u32,
    pub meshes: *mut u32,
    pub metadata: *mut u8,
}

impl Default for NodeNative {
    fn default() -> Self {
        Self {
            name: NativeString::default(),
            transformation: Matrix4x4::default(),
            parent: ptr::null_mut(),
            num_children: 0,
            children: ptr::null_mut(),
            num_meshes: 0,
            meshes: ptr::null_mut(),
            metadata: ptr::null_mut(),
        }
    }
}

/// Field offsets of the native node record.
struct NodeOffsets {
    parent: usize,
    num_children: usize,
    children: usize,
    num_meshes: usize,
    meshes: usize,
    size: usize,
}

fn node_offsets() -> NodeOffsets {
    let mut cursor = FieldCursor::sizing();
    cursor.skip_string();
    cursor.skip::<Matrix4x4>();
    let parent = cursor.skip::<*mut u8>();
    let num_children = cursor.skip::<u32>();
    let children = cursor.skip::<*mut u8>();
    let num_meshes = cursor.skip::<u32>();
    let meshes = cursor.skip::<*mut u32>();
    cursor.skip::<*mut u8>();
    NodeOffsets {
        parent,
        num_children,
        children,
        num_meshes,
        meshes,
        size: cursor.size(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NodeMarshaler;

impl CustomMarshaler<NodeNative> for NodeMarshaler {
    fn native_data_size(&self) -> usize {
        node_offsets().size
    }

    unsafe fn decode(&self, src: *const u8) -> NodeNative {
        let mut cursor = FieldCursor::new(src as *mut u8);
        NodeNative {
            name: cursor.read_string(),
            transformation: cursor.read(),
            parent: cursor.read(),
            num_children: cursor.read(),
            children: cursor.read(),
            num_meshes: cursor.read(),
            meshes: cursor.read(),
            metadata: cursor.read(),
        }
    }

    unsafe fn encode(&self, value: &NodeNative, dst: *mut u8) {
        let mut cursor = FieldCursor::new(dst);
        cursor.write_string(&value.name);
        cursor.write(value.transformation);
        cursor.write(value.parent);
        cursor.write(value.num_children);
        cursor.write(value.children);
        cursor.write(value.num_meshes);
        cursor.write(value.meshes);
        cursor.write(value.metadata);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    /// Transform relative to the parent node.
    pub transform: Mat4,
    pub children: Vec<Node>,
    /// Indices into the scene's mesh list.
    pub mesh_indices: Vec<u32>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_meshes(mut self, mesh_indices: Vec<u32>) -> Self {
        self.mesh_indices = mesh_indices;
        self
    }

    pub fn add_child(&mut self, child: Node) -> &mut Node {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn has_meshes(&self) -> bool {
        !self.mesh_indices.is_empty()
    }

    /// Depth-first search of this node and its descendants.
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_node(name))
    }

    pub fn find_node_mut(&mut self, name: &str) -> Option<&mut Node> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_node_mut(name))
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    /// Transform of a descendant in this node's space.
    pub fn world_transform_of(&self, name: &str) -> Option<Mat4> {
        if self.name == name {
            return Some(self.transform);
        }
        self.children
            .iter()
            .find_map(|child| child.world_transform_of(name))
            .map(|local| self.transform * local)
    }
}

impl Marshalable for Node {
    type Native = NodeNative;

    fn is_native_blittable(&self) -> bool {
        false
    }

    fn to_native(&self, this_ptr: Option<NonNull<u8>>) -> NodeNative {
        let children = marshal::to_native_array(&self.children, ArrayLayout::Pointers);

        if let Some(this) = this_ptr {
            let parent_offset = node_offsets().parent;
            for index in 0..self.children.len() {
                // SAFETY: `children` was just built with one record pointer
                // per child, each a node record with a parent slot.
                unsafe {
                    let child = memory::read_ptr(children.add(index * POINTER_SIZE));
                    memory::write_ptr(child.add(parent_offset), this.as_ptr());
                }
            }
        }

        NodeNative {
            name: NativeString::new(self.name.clone()),
            transformation: self.transform.into(),
            parent: ptr::null_mut(),
            num_children: self.children.len() as u32,
            children,
            num_meshes: self.mesh_indices.len() as u32,
            meshes: marshal::to_native_pod_array(&self.mesh_indices).cast(),
            metadata: ptr::null_mut(),
        }
    }

    fn from_native(&mut self, native: &NodeNative) {
        self.name = native.name.as_str().to_owned();
        self.transform = native.transformation.into();
        // SAFETY: the record was decoded from live native memory; its arrays
        // hold the recorded number of entries.
        unsafe {
            self.children = marshal::from_native_array(
                native.children,
                native.num_children as usize,
                ArrayLayout::Pointers,
            );
            self.mesh_indices =
                marshal::from_native_pod_array(native.meshes.cast(), native.num_meshes as usize);
        }
    }

    unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
        if ptr.is_null() {
            return;
        }
        let offsets = node_offsets();
        let num_children = ptr::read_unaligned(ptr.add(offsets.num_children) as *const u32);
        let children = memory::read_ptr(ptr.add(offsets.children));
        let num_meshes = ptr::read_unaligned(ptr.add(offsets.num_meshes) as *const u32);
        let meshes = memory::read_ptr(ptr.add(offsets.meshes));

        marshal::free_native_array_of::<Node>(
            children,
            num_children as usize,
            ArrayLayout::Pointers,
        );
        memory::free(meshes);
        trace!(num_children, num_meshes, "freed native node");

        if free_top_level {
            memory::free(ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn setup() {
        crate::init().expect("scene marshalers register");
    }

    fn sample_tree() -> Node {
        let mut root = Node::new("root");
        let arm = root.add_child(
            Node::new("arm").with_transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))),
        );
        arm.add_child(
            Node::new("hand")
                .with_transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)))
                .with_meshes(vec![3, 4]),
        );
        root.add_child(Node::new("head").with_meshes(vec![0]));
        root
    }

    unsafe fn child_at(record: *mut u8, index: usize) -> *mut u8 {
        let children = memory::read_ptr(record.add(node_offsets().children));
        memory::read_ptr(children.add(index * POINTER_SIZE))
    }

    unsafe fn parent_of(record: *mut u8) -> *mut u8 {
        memory::read_ptr(record.add(node_offsets().parent))
    }

    #[test]
    fn children_point_back_at_parent() {
        setup();
        let root = sample_tree();
        let ptr = marshal::to_native_ptr(Some(&root));

        unsafe {
            assert!(parent_of(ptr).is_null());
            let arm = child_at(ptr, 0);
            let head = child_at(ptr, 1);
            assert_eq!(parent_of(arm), ptr);
            assert_eq!(parent_of(head), ptr);
            let hand = child_at(arm, 0);
            assert_eq!(parent_of(hand), arm);

            marshal::free_native_ptr::<Node>(ptr);
        }
    }

    #[test]
    fn tree_round_trips() {
        setup();
        let root = sample_tree();
        let ptr = marshal::to_native_ptr(Some(&root));
        let back: Node = unsafe { marshal::from_native_ptr(ptr) }.unwrap();
        assert_eq!(back, root);
        assert_eq!(back.descendant_count(), 3);
        assert_eq!(back.find_node("hand").unwrap().mesh_indices, vec![3, 4]);
        unsafe { marshal::free_native_ptr::<Node>(ptr) };
    }

    #[test]
    fn leaf_has_null_arrays() {
        setup();
        let ptr = marshal::to_native_ptr(Some(&Node::new("leaf")));
        let native = unsafe { NodeMarshaler.decode(ptr) };
        assert_eq!(native.num_children, 0);
        assert!(native.children.is_null());
        assert!(native.meshes.is_null());
        assert!(native.metadata.is_null());
        unsafe { marshal::free_native_ptr::<Node>(ptr) };
    }

    #[test]
    fn transforms_compose_down_the_tree() {
        let root = sample_tree();
        let hand = root.world_transform_of("hand").unwrap();
        assert_eq!(hand.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 0.0));
        assert!(root.world_transform_of("missing").is_none());
    }

    #[test]
    fn find_node_mut_edits_in_place() {
        let mut root = sample_tree();
        root.find_node_mut("head").unwrap().mesh_indices.push(7);
        assert_eq!(root.find_node("head").unwrap().mesh_indices, vec![0, 7]);
        assert!(root.has_children());
        assert_eq!(root.child_count(), 2);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn record_size_matches_native_layout() {
        // 1028 string + 64 matrix, then pointer-aligned fields.
        assert_eq!(NodeMarshaler.native_data_size(), 1144);
    }
}
