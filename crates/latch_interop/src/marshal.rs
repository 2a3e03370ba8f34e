//! Generic marshaling engine.
//!
//! Converts single values, pointer-addressed values and arrays between
//! their managed form and native memory. Each record takes one of two
//! paths:
//!
//! - **blittable**: the native record is written or read as raw bytes.
//! - **custom**: the record goes through the marshaler declared for its
//!   layout in the global [`registry`], or a plain structure copy when
//!   none is declared.
//!
//! Everything that allocates hands ownership to the caller. Nothing here
//! frees memory unless asked to through one of the `free_*` functions, and
//! reads never take ownership of the memory they read from.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;
use std::ptr::{self, NonNull};
use tracing::trace;

use crate::contract::Marshalable;
use crate::memory::{self, UnmanagedBuffer, POINTER_SIZE};
use crate::registry;

/// How a native array stores its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLayout {
    /// Contiguous run of native records.
    Values,
    /// Contiguous run of pointers, each to a separately allocated record.
    Pointers,
}

impl ArrayLayout {
    pub fn from_pointers_flag(array_of_pointers: bool) -> Self {
        if array_of_pointers {
            Self::Pointers
        } else {
            Self::Values
        }
    }

    #[inline]
    pub fn is_pointers(self) -> bool {
        matches!(self, Self::Pointers)
    }

    /// Byte distance between consecutive slots.
    #[inline]
    pub fn stride(self, native_size: usize) -> usize {
        match self {
            Self::Values => native_size,
            Self::Pointers => POINTER_SIZE,
        }
    }
}

fn native_size<T: Marshalable>(blittable: bool) -> usize {
    if blittable {
        memory::size_of_blittable::<T::Native>()
    } else {
        memory::size_of_via_marshaler::<T::Native>()
    }
}

/// Native record size for `T`.
pub fn native_size_of<T: Marshalable>() -> usize {
    native_size::<T>(T::default().is_native_blittable())
}

fn array_bytes(count: usize, stride: usize) -> usize {
    count
        .checked_mul(stride)
        .unwrap_or_else(|| panic!("native array of {count} x {stride} bytes overflows usize"))
}

/// Write `native` at `dst` through the raw or custom path.
///
/// Panics when the custom path has no marshaler and `N` cannot be copied
/// as plain data.
///
/// # Safety
/// `dst` must be valid for the native size of `N` on the chosen path.
unsafe fn write_native<N: 'static>(blittable: bool, native: N, dst: *mut u8) {
    if !blittable {
        match registry::global().lookup::<N>() {
            Some(marshaler) => {
                marshaler.encode(&native, dst);
                return;
            }
            None => registry::plain_copy_guard::<N>(),
        }
    }
    ptr::write_unaligned(dst as *mut N, native);
}

/// Read a native record at `src` through the raw or custom path.
///
/// # Safety
/// `src` must hold a record of layout `N` on the chosen path.
unsafe fn read_native<N: 'static>(blittable: bool, src: *const u8) -> N {
    if !blittable {
        match registry::global().lookup::<N>() {
            Some(marshaler) => return marshaler.decode(src),
            None => registry::plain_copy_guard::<N>(),
        }
    }
    ptr::read_unaligned(src as *const N)
}

/// Convert `value` and write its record into `dst`, which must span the
/// value's native size.
fn encode_into<T: Marshalable>(value: &T, dst: NonNull<u8>) {
    let native = value.to_native(Some(dst));
    // SAFETY: callers hand us a slot sized for T's native record.
    unsafe { write_native(value.is_native_blittable(), native, dst.as_ptr()) }
}

/// Marshal a single value into a fresh native allocation.
///
/// Returns null for `None`. The caller owns the result and releases it with
/// [`free_native_ptr`].
pub fn to_native_ptr<T: Marshalable>(value: Option<&T>) -> *mut u8 {
    let Some(value) = value else {
        return ptr::null_mut();
    };
    let buffer = UnmanagedBuffer::allocate(native_size::<T>(value.is_native_blittable()));
    encode_into(value, buffer.as_non_null());
    buffer.into_raw()
}

/// Read a single value from native memory.
///
/// Returns `None` for a null pointer. The source memory is left untouched.
///
/// # Safety
/// `ptr` must be null or address a live native record of `T`'s layout.
pub unsafe fn from_native_ptr<T: Marshalable>(ptr: *const u8) -> Option<T> {
    if ptr.is_null() {
        return None;
    }
    let mut value = T::default();
    let native = read_native::<T::Native>(value.is_native_blittable(), ptr);
    value.from_native(&native);
    Some(value)
}

/// Release a record produced by [`to_native_ptr`], children included.
///
/// # Safety
/// `ptr` must be null or a record of `T`'s layout that was not yet freed.
pub unsafe fn free_native_ptr<T: Marshalable>(ptr: *mut u8) {
    if !ptr.is_null() {
        T::free_native(ptr, true);
    }
}

/// Marshal a slice into a native array.
///
/// An empty slice yields null rather than an empty allocation.
pub fn to_native_array<T: Marshalable>(values: &[T], layout: ArrayLayout) -> *mut u8 {
    write_array(values.iter().map(Some), values.len(), layout)
}

/// Marshal a slice with absent elements into a native array.
///
/// With [`ArrayLayout::Pointers`] an absent element becomes a null slot and
/// no record is allocated for it. With [`ArrayLayout::Values`] its record is
/// left zero-filled.
pub fn to_native_array_nullable<T: Marshalable>(
    values: &[Option<T>],
    layout: ArrayLayout,
) -> *mut u8 {
    write_array(values.iter().map(Option::as_ref), values.len(), layout)
}

fn write_array<'a, T, I>(elements: I, count: usize, layout: ArrayLayout) -> *mut u8
where
    T: Marshalable + 'a,
    I: Iterator<Item = Option<&'a T>>,
{
    if count == 0 {
        return ptr::null_mut();
    }

    let native_size = native_size_of::<T>();
    let stride = layout.stride(native_size);
    let buffer = UnmanagedBuffer::allocate(array_bytes(count, stride));

    for (slot, element) in buffer.record_addresses(stride).zip(elements) {
        let Some(element) = element else {
            continue;
        };
        match layout {
            ArrayLayout::Values => encode_into(element, slot),
            ArrayLayout::Pointers => {
                let record = to_native_ptr(Some(element));
                // SAFETY: slot is a POINTER_SIZE record inside the buffer.
                unsafe { memory::write_ptr(slot.as_ptr(), record) };
            }
        }
    }

    buffer.into_raw()
}

/// Read `count` elements from a native array.
///
/// Null slots of a pointer array come back as `T::default()`. A null
/// pointer or zero count yields an empty vector.
///
/// # Safety
/// `ptr` must be null or address `count` slots of the given layout.
pub unsafe fn from_native_array<T: Marshalable>(
    ptr: *const u8,
    count: usize,
    layout: ArrayLayout,
) -> Vec<T> {
    read_array::<T>(ptr, count, layout)
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}

/// Read `count` elements from a native array, keeping null slots as `None`.
///
/// # Safety
/// `ptr` must be null or address `count` slots of the given layout.
pub unsafe fn from_native_array_nullable<T: Marshalable>(
    ptr: *const u8,
    count: usize,
    layout: ArrayLayout,
) -> Vec<Option<T>> {
    read_array(ptr, count, layout)
}

unsafe fn read_array<T: Marshalable>(
    ptr: *const u8,
    count: usize,
    layout: ArrayLayout,
) -> Vec<Option<T>> {
    if ptr.is_null() || count == 0 {
        return Vec::new();
    }

    let stride = layout.stride(native_size_of::<T>());
    (0..count)
        .map(|index| {
            let slot = ptr.add(index * stride);
            match layout {
                ArrayLayout::Values => from_native_ptr(slot),
                ArrayLayout::Pointers => from_native_ptr(memory::read_ptr(slot)),
            }
        })
        .collect()
}

/// Release a native array, letting `cleanup` release each element first.
///
/// `cleanup` receives the element address and whether that address is its
/// own allocation (pointer arrays) or a slot inside the array (value
/// arrays). Null slots of a pointer array are skipped. The array buffer is
/// freed last.
///
/// Does nothing when `ptr` is null, `count` is zero or no cleanup is given.
///
/// # Safety
/// `ptr` must be null or an array of `count` slots of the given layout,
/// with `native_size` the size of one record, not yet freed.
pub unsafe fn free_native_array(
    ptr: *mut u8,
    count: usize,
    native_size: usize,
    layout: ArrayLayout,
    cleanup: Option<&mut dyn FnMut(*mut u8, bool)>,
) {
    let Some(cleanup) = cleanup else {
        return;
    };
    if ptr.is_null() || count == 0 {
        return;
    }

    let stride = layout.stride(native_size);
    for index in 0..count {
        let slot = ptr.add(index * stride);
        match layout {
            ArrayLayout::Values => cleanup(slot, false),
            ArrayLayout::Pointers => {
                let record = memory::read_ptr(slot);
                if !record.is_null() {
                    cleanup(record, true);
                }
            }
        }
    }

    memory::free(ptr);
    trace!(count, ?layout, "freed native array");
}

/// Release a native array of `T` records using `T`'s own cleanup.
///
/// # Safety
/// Same as [`free_native_array`].
pub unsafe fn free_native_array_of<T: Marshalable>(
    ptr: *mut u8,
    count: usize,
    layout: ArrayLayout,
) {
    let mut cleanup = |record: *mut u8, free_top_level: bool| T::free_native(record, free_top_level);
    free_native_array(
        ptr,
        count,
        native_size_of::<T>(),
        layout,
        Some(&mut cleanup),
    );
}

/// Copy plain data into a fresh native array. Empty input yields null.
pub fn to_native_pod_array<T: Pod>(values: &[T]) -> *mut u8 {
    if values.is_empty() {
        return ptr::null_mut();
    }
    let bytes: &[u8] = bytemuck::cast_slice(values);
    let mut buffer = UnmanagedBuffer::allocate(bytes.len());
    buffer.bytes_mut().copy_from_slice(bytes);
    buffer.into_raw()
}

/// Copy `count` plain-data elements out of native memory.
///
/// # Safety
/// `ptr` must be null or valid for `count * size_of::<T>()` readable bytes.
pub unsafe fn from_native_pod_array<T: Pod>(ptr: *const u8, count: usize) -> Vec<T> {
    if ptr.is_null() || count == 0 {
        return Vec::new();
    }
    let size = size_of::<T>();
    if size == 0 {
        return vec![T::zeroed(); count];
    }
    std::slice::from_raw_parts(ptr, array_bytes(count, size))
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native_string::NativeString;
    use crate::layout::FieldCursor;
    use crate::registry::CustomMarshaler;
    use std::cell::RefCell;
    use std::sync::Once;

    // Blittable point.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    struct PointNative {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Point {
        x: f32,
        y: f32,
    }

    impl Point {
        fn new(x: f32, y: f32) -> Self {
            Self { x, y }
        }
    }

    impl Marshalable for Point {
        type Native = PointNative;

        fn is_native_blittable(&self) -> bool {
            true
        }

        fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> PointNative {
            PointNative {
                x: self.x,
                y: self.y,
            }
        }

        fn from_native(&mut self, native: &PointNative) {
            self.x = native.x;
            self.y = native.y;
        }

        unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
            FREED.with(|freed| freed.borrow_mut().push((ptr as usize, free_top_level)));
            if free_top_level {
                memory::free(ptr);
            }
        }
    }

    thread_local! {
        static FREED: RefCell<Vec<(usize, bool)>> = const { RefCell::new(Vec::new()) };
    }

    fn take_freed() -> Vec<(usize, bool)> {
        FREED.with(|freed| std::mem::take(&mut *freed.borrow_mut()))
    }

    // Non-blittable label: inline native string plus a weight.
    #[derive(Debug)]
    struct LabelNative {
        text: NativeString,
        weight: u32,
    }

    #[derive(Default)]
    struct LabelMarshaler;

    fn label_size() -> usize {
        let mut cursor = FieldCursor::sizing();
        cursor.skip_string();
        cursor.skip::<u32>();
        cursor.size()
    }

    impl CustomMarshaler<LabelNative> for LabelMarshaler {
        fn native_data_size(&self) -> usize {
            label_size()
        }

        unsafe fn decode(&self, src: *const u8) -> LabelNative {
            let mut cursor = FieldCursor::new(src as *mut u8);
            LabelNative {
                text: cursor.read_string(),
                weight: cursor.read(),
            }
        }

        unsafe fn encode(&self, value: &LabelNative, dst: *mut u8) {
            let mut cursor = FieldCursor::new(dst);
            cursor.write_string(&value.text);
            cursor.write(value.weight);
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Label {
        text: String,
        weight: u32,
        // Derived, outside the contract.
        shouting: bool,
    }

    impl Label {
        fn new(text: &str, weight: u32) -> Self {
            Self {
                text: text.to_owned(),
                weight,
                shouting: text.chars().all(|c| !c.is_lowercase()),
            }
        }
    }

    impl Marshalable for Label {
        type Native = LabelNative;

        fn is_native_blittable(&self) -> bool {
            false
        }

        fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> LabelNative {
            LabelNative {
                text: NativeString::new(self.text.clone()),
                weight: self.weight,
            }
        }

        fn from_native(&mut self, native: &LabelNative) {
            self.text = native.text.as_str().to_owned();
            self.weight = native.weight;
        }

        unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
            if free_top_level {
                memory::free(ptr);
            }
        }
    }

    // Records the address it was written to.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, Pod, Zeroable)]
    struct AnchorNative {
        this: usize,
    }

    #[derive(Default)]
    struct Anchor {
        recorded: usize,
    }

    impl Marshalable for Anchor {
        type Native = AnchorNative;

        fn is_native_blittable(&self) -> bool {
            true
        }

        fn to_native(&self, this_ptr: Option<NonNull<u8>>) -> AnchorNative {
            AnchorNative {
                this: this_ptr.map_or(0, |p| p.as_ptr() as usize),
            }
        }

        fn from_native(&mut self, native: &AnchorNative) {
            self.recorded = native.this;
        }

        unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
            if free_top_level {
                memory::free(ptr);
            }
        }
    }

    fn declare_test_marshalers() {
        static DECLARE: Once = Once::new();
        DECLARE.call_once(|| {
            registry::global()
                .declare::<LabelNative, LabelMarshaler>()
                .expect("label marshaler declared once");
        });
    }

    #[test]
    fn single_value_round_trip_blittable() {
        let point = Point::new(1.5, -2.0);
        let ptr = to_native_ptr(Some(&point));
        assert!(!ptr.is_null());

        let raw = unsafe { ptr::read_unaligned(ptr as *const PointNative) };
        assert_eq!(raw, PointNative { x: 1.5, y: -2.0 });

        let back: Point = unsafe { from_native_ptr(ptr) }.unwrap();
        assert_eq!(back, point);
        unsafe { memory::free(ptr) };
    }

    #[test]
    fn single_value_round_trip_custom() {
        declare_test_marshalers();
        assert_eq!(native_size_of::<Label>(), label_size());

        let label = Label::new("HELLO", 7);
        let ptr = to_native_ptr(Some(&label));
        let back: Label = unsafe { from_native_ptr(ptr) }.unwrap();
        assert_eq!(back.text, "HELLO");
        assert_eq!(back.weight, 7);
        // Derived state is not carried across.
        assert!(!back.shouting);
        unsafe { free_native_ptr::<Label>(ptr) };
    }

    #[test]
    fn default_values_round_trip() {
        declare_test_marshalers();
        let ptr = to_native_ptr(Some(&Label::default()));
        let back: Label = unsafe { from_native_ptr(ptr) }.unwrap();
        assert_eq!(back, Label::default());
        unsafe { free_native_ptr::<Label>(ptr) };
    }

    #[test]
    fn from_native_is_idempotent() {
        let native = PointNative { x: 3.0, y: 4.0 };
        let mut point = Point::new(9.0, 9.0);
        point.from_native(&native);
        let once = point.clone();
        point.from_native(&native);
        assert_eq!(point, once);
    }

    #[test]
    fn null_single_value_propagates() {
        assert!(to_native_ptr::<Point>(None).is_null());
        assert!(unsafe { from_native_ptr::<Point>(ptr::null()) }.is_none());
        unsafe { free_native_ptr::<Point>(ptr::null_mut()) };
    }

    #[test]
    fn this_ptr_is_the_destination_address() {
        let ptr = to_native_ptr(Some(&Anchor::default()));
        let back: Anchor = unsafe { from_native_ptr(ptr) }.unwrap();
        assert_eq!(back.recorded, ptr as usize);
        unsafe { memory::free(ptr) };

        let anchors = [Anchor::default(), Anchor::default(), Anchor::default()];
        let array = to_native_array(&anchors, ArrayLayout::Values);
        let back: Vec<Anchor> = unsafe { from_native_array(array, 3, ArrayLayout::Values) };
        for (index, anchor) in back.iter().enumerate() {
            assert_eq!(anchor.recorded, array as usize + index * size_of::<AnchorNative>());
        }
        unsafe { memory::free(array) };
    }

    #[test]
    fn empty_arrays_are_null() {
        let empty: [Point; 0] = [];
        assert!(to_native_array(&empty, ArrayLayout::Values).is_null());
        assert!(to_native_array(&empty, ArrayLayout::Pointers).is_null());
        assert!(to_native_array_nullable::<Point>(&[], ArrayLayout::Pointers).is_null());
        assert!(to_native_pod_array::<u32>(&[]).is_null());

        let back: Vec<Point> = unsafe { from_native_array(ptr::null(), 4, ArrayLayout::Values) };
        assert!(back.is_empty());
        let back: Vec<u32> = unsafe { from_native_pod_array(ptr::null(), 4) };
        assert!(back.is_empty());
    }

    #[test]
    fn value_array_uses_native_stride() {
        let points = [Point::new(0.0, 1.0), Point::new(2.0, 3.0), Point::new(4.0, 5.0)];
        let array = to_native_array(&points, ArrayLayout::Values);

        let size = native_size_of::<Point>();
        assert_eq!(size, size_of::<PointNative>());
        for (index, point) in points.iter().enumerate() {
            let record = unsafe { ptr::read_unaligned(array.add(index * size) as *const PointNative) };
            assert_eq!(record, PointNative { x: point.x, y: point.y });
        }

        let back: Vec<Point> = unsafe { from_native_array(array, 3, ArrayLayout::Values) };
        assert_eq!(back, points);
        unsafe { memory::free(array) };
    }

    #[test]
    fn custom_value_array_uses_marshaler_stride() {
        declare_test_marshalers();
        let labels = [Label::new("a", 1), Label::new("bb", 2)];
        let array = to_native_array(&labels, ArrayLayout::Values);
        let second = unsafe { crate::native_string::read_native_string(array.add(label_size())) };
        assert_eq!(second.as_str(), "bb");

        let back: Vec<Label> = unsafe { from_native_array(array, 2, ArrayLayout::Values) };
        assert_eq!(back[0].text, "a");
        assert_eq!(back[1].weight, 2);
        unsafe { free_native_array_of::<Label>(array, 2, ArrayLayout::Values) };
    }

    #[test]
    fn pointer_array_leaves_null_slots_for_absent_elements() {
        // Native consumers may or may not tolerate null slots; they are kept as-is.
        let points = [Some(Point::new(1.0, 1.0)), None, Some(Point::new(3.0, 3.0))];
        let array = to_native_array_nullable(&points, ArrayLayout::Pointers);

        let slots: Vec<*mut u8> = (0..3)
            .map(|index| unsafe { memory::read_ptr(array.add(index * POINTER_SIZE)) })
            .collect();
        assert!(!slots[0].is_null());
        assert!(slots[1].is_null());
        assert!(!slots[2].is_null());
        assert_ne!(slots[0], slots[2]);

        let record = unsafe { ptr::read_unaligned(slots[2] as *const PointNative) };
        assert_eq!(record, PointNative { x: 3.0, y: 3.0 });

        let back: Vec<Option<Point>> =
            unsafe { from_native_array_nullable(array, 3, ArrayLayout::Pointers) };
        assert_eq!(back, points);
        let defaulted: Vec<Point> = unsafe { from_native_array(array, 3, ArrayLayout::Pointers) };
        assert_eq!(defaulted[1], Point::default());

        unsafe { free_native_array_of::<Point>(array, 3, ArrayLayout::Pointers) };
        take_freed();
    }

    #[test]
    fn absent_value_elements_stay_zeroed() {
        let points = [Some(Point::new(1.0, 2.0)), None];
        let array = to_native_array_nullable(&points, ArrayLayout::Values);
        let record = unsafe {
            ptr::read_unaligned(array.add(size_of::<PointNative>()) as *const PointNative)
        };
        assert_eq!(record, PointNative::default());
        unsafe { memory::free(array) };
    }

    #[test]
    fn free_pointer_array_cleans_each_non_null_slot_once() {
        take_freed();
        let points = [Some(Point::new(1.0, 0.0)), None, Some(Point::new(2.0, 0.0)), None];
        let array = to_native_array_nullable(&points, ArrayLayout::Pointers);
        let expected: Vec<(usize, bool)> = [0, 2]
            .iter()
            .map(|&index| {
                let slot = unsafe { memory::read_ptr(array.add(index * POINTER_SIZE)) };
                (slot as usize, true)
            })
            .collect();

        unsafe { free_native_array_of::<Point>(array, points.len(), ArrayLayout::Pointers) };
        assert_eq!(take_freed(), expected);
    }

    #[test]
    fn free_value_array_visits_every_slot() {
        take_freed();
        let points = [Point::default(), Point::default(), Point::default()];
        let array = to_native_array(&points, ArrayLayout::Values);
        let stride = size_of::<PointNative>();

        unsafe { free_native_array_of::<Point>(array, 3, ArrayLayout::Values) };
        let expected: Vec<(usize, bool)> = (0..3)
            .map(|index| (array as usize + index * stride, false))
            .collect();
        assert_eq!(take_freed(), expected);
    }

    #[test]
    fn free_with_nothing_to_do_is_a_noop() {
        let mut calls = 0;
        let mut count_calls = |_: *mut u8, _: bool| calls += 1;
        unsafe {
            free_native_array(ptr::null_mut(), 3, 8, ArrayLayout::Pointers, Some(&mut count_calls));
        }

        let points = [Point::default()];
        let array = to_native_array(&points, ArrayLayout::Pointers);
        unsafe {
            free_native_array(array, 0, 8, ArrayLayout::Pointers, Some(&mut count_calls));
        }
        assert_eq!(calls, 0);
        unsafe { free_native_array_of::<Point>(array, 1, ArrayLayout::Pointers) };
        take_freed();

        // No cleanup: nothing is touched, not even the buffer itself.
        let array = to_native_array(&points, ArrayLayout::Values);
        unsafe { free_native_array(array, 1, 8, ArrayLayout::Values, None) };
        let back: Vec<Point> = unsafe { from_native_array(array, 1, ArrayLayout::Values) };
        assert_eq!(back, points);
        unsafe { memory::free(array) };
    }

    #[test]
    fn pod_arrays_copy_verbatim() {
        let indices = [0u32, 1, 2, 2, 3, 0];
        let array = to_native_pod_array(&indices);
        let raw = unsafe { std::slice::from_raw_parts(array as *const u32, indices.len()) };
        assert_eq!(raw, &indices);

        let back: Vec<u32> = unsafe { from_native_pod_array(array, indices.len()) };
        assert_eq!(back, indices);
        unsafe { memory::free(array) };
    }

    // Non-blittable layouts with no declared marshaler.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct TagNative {
        id: u32,
        weight: f32,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Tag {
        id: u32,
        weight: f32,
    }

    impl Marshalable for Tag {
        type Native = TagNative;

        fn is_native_blittable(&self) -> bool {
            false
        }

        fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> TagNative {
            TagNative {
                id: self.id,
                weight: self.weight,
            }
        }

        fn from_native(&mut self, native: &TagNative) {
            self.id = native.id;
            self.weight = native.weight;
        }

        unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
            if free_top_level {
                memory::free(ptr);
            }
        }
    }

    #[derive(Debug, Default)]
    struct TitleNative {
        text: String,
    }

    #[derive(Debug, Default)]
    struct Title(String);

    impl Marshalable for Title {
        type Native = TitleNative;

        fn is_native_blittable(&self) -> bool {
            false
        }

        fn to_native(&self, _this_ptr: Option<NonNull<u8>>) -> TitleNative {
            TitleNative {
                text: self.0.clone(),
            }
        }

        fn from_native(&mut self, native: &TitleNative) {
            self.0 = native.text.clone();
        }

        unsafe fn free_native(ptr: *mut u8, free_top_level: bool) {
            if free_top_level {
                memory::free(ptr);
            }
        }
    }

    #[test]
    fn plain_layout_without_marshaler_is_structure_copied() {
        let tag = Tag { id: 9, weight: 0.25 };
        assert_eq!(native_size_of::<Tag>(), size_of::<TagNative>());

        let ptr = to_native_ptr(Some(&tag));
        let raw = unsafe { ptr::read_unaligned(ptr as *const TagNative) };
        assert_eq!(raw, TagNative { id: 9, weight: 0.25 });
        let back: Tag = unsafe { from_native_ptr(ptr) }.unwrap();
        assert_eq!(back, tag);
        unsafe { free_native_ptr::<Tag>(ptr) };
    }

    #[test]
    #[should_panic(expected = "no custom marshaler declared")]
    fn owning_layout_without_marshaler_panics() {
        to_native_ptr(Some(&Title("Heading".into())));
    }

    #[test]
    fn owning_layout_absence_is_not_cached() {
        #[allow(dead_code)]
        struct Owned {
            text: String,
        }
        let result = std::panic::catch_unwind(|| registry::global().native_size_of::<Owned>());
        assert!(result.is_err());
        assert!(!registry::global().is_resolved::<Owned>());
    }

    #[test]
    fn layout_flag_maps_to_stride() {
        assert_eq!(ArrayLayout::from_pointers_flag(true), ArrayLayout::Pointers);
        assert_eq!(ArrayLayout::from_pointers_flag(false), ArrayLayout::Values);
        assert!(ArrayLayout::Pointers.is_pointers());
        assert_eq!(ArrayLayout::Values.stride(24), 24);
        assert_eq!(ArrayLayout::Pointers.stride(24), POINTER_SIZE);
    }
}
