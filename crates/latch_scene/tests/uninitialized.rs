//! Marshaling scene types before `latch_scene::init()` has run.
//!
//! Lives in its own test binary so the global registry starts empty.

use latch_interop::{marshal, CustomMarshaler};
use latch_scene::{Camera, Node, NodeMarshaler};
use std::panic;

#[test]
fn scene_types_need_init_and_init_still_succeeds_afterwards() {
    let node = Node::new("root").with_meshes(vec![1]);

    let sized = panic::catch_unwind(marshal::native_size_of::<Node>);
    assert!(sized.is_err(), "sizing an undeclared node must not fall back to a struct copy");

    let written = panic::catch_unwind(|| marshal::to_native_ptr(Some(&Camera::new("eye"))));
    assert!(written.is_err());

    latch_scene::init().expect("init after a failed marshal");
    assert_eq!(marshal::native_size_of::<Node>(), NodeMarshaler.native_data_size());

    let ptr = marshal::to_native_ptr(Some(&node));
    let back: Node = unsafe { marshal::from_native_ptr(ptr) }.unwrap();
    assert_eq!(back, node);
    unsafe { marshal::free_native_ptr::<Node>(ptr) };
}
