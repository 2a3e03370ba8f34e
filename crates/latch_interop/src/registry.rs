// registry.rs - Custom marshaler registry
//
// Native layouts that cannot cross the boundary as a raw byte copy declare a
// marshaler here. Declarations are explicit (made at startup by whoever owns
// the layout type); resolution is lazy and memoized per layout type, absence
// included, so the declaration table is inspected at most once per type.
// Layouts that own drop glue are the exception: with no marshaler they cannot
// be marshaled at all, so their absence is not cached and a late declaration
// still takes effect.

use once_cell::sync::Lazy;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::mem::{needs_drop, size_of};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::native_string::{NativeString, NativeStringMarshaler};

/// Plug-in that encodes and decodes one native layout type `T`.
pub trait CustomMarshaler<T>: Send + Sync {
    /// Exact byte size of the native record.
    fn native_data_size(&self) -> usize;

    /// Decode a native record.
    ///
    /// # Safety
    /// `src` must address `native_data_size()` readable bytes holding a
    /// record of this layout.
    unsafe fn decode(&self, src: *const u8) -> T;

    /// Encode `value` as a native record.
    ///
    /// # Safety
    /// `dst` must address `native_data_size()` writable bytes.
    unsafe fn encode(&self, value: &T, dst: *mut u8);
}

/// Errors that can occur while declaring a custom marshaler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a custom marshaler is already declared for '{layout}'")]
    DuplicateDeclaration { layout: &'static str },

    #[error("'{layout}' was already looked up; its marshaler can no longer change")]
    AlreadyResolved { layout: &'static str },
}

type ErasedMarshaler = Arc<dyn Any + Send + Sync>;
type Resolver = Box<dyn Fn() -> ErasedMarshaler + Send>;

#[derive(Default)]
struct RegistryState {
    declarations: HashMap<TypeId, Resolver>,
    resolved: HashMap<TypeId, Option<ErasedMarshaler>>,
    inspections: usize,
}

/// Registry mapping native layout types to their custom marshalers.
///
/// A single lock guards the declaration table and the resolution cache, so
/// the "check cache, inspect, insert" sequence runs as one atomic step.
#[derive(Default)]
pub struct MarshalerRegistry {
    state: Mutex<RegistryState>,
}

fn erase<T, F>(factory: F) -> Resolver
where
    T: 'static,
    F: Fn() -> Arc<dyn CustomMarshaler<T>> + Send + 'static,
{
    Box::new(move || Arc::new(factory()) as ErasedMarshaler)
}

/// Panic unless a layout without a marshaler may move as a plain structure
/// copy. A layout owning heap data (a `String`, a `Vec`) has no valid bitwise
/// native form.
pub(crate) fn plain_copy_guard<T>() {
    if needs_drop::<T>() {
        panic!(
            "no custom marshaler declared for '{}', and it owns data that cannot be \
             copied into native memory; declare its marshaler before marshaling",
            type_name::<T>()
        );
    }
}

static GLOBAL: Lazy<MarshalerRegistry> = Lazy::new(MarshalerRegistry::with_builtins);

/// Process-wide registry used by the marshaling engine.
pub fn global() -> &'static MarshalerRegistry {
    &GLOBAL
}

impl MarshalerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the marshalers this crate ships declared.
    pub fn with_builtins() -> Self {
        let mut state = RegistryState::default();
        state.declarations.insert(
            TypeId::of::<NativeString>(),
            erase(|| Arc::new(NativeStringMarshaler) as Arc<dyn CustomMarshaler<NativeString>>),
        );
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare `M` as the marshaler for layout `T`, instantiated on first lookup.
    pub fn declare<T, M>(&self) -> Result<(), RegistryError>
    where
        T: 'static,
        M: CustomMarshaler<T> + Default + 'static,
    {
        self.declare_with::<T, _>(|| Arc::new(M::default()) as Arc<dyn CustomMarshaler<T>>)
    }

    /// Declare a factory producing the marshaler for layout `T`.
    ///
    /// The factory runs under the registry lock and must not query the
    /// registry itself.
    pub fn declare_with<T, F>(&self, factory: F) -> Result<(), RegistryError>
    where
        T: 'static,
        F: Fn() -> Arc<dyn CustomMarshaler<T>> + Send + 'static,
    {
        let key = TypeId::of::<T>();
        let layout = type_name::<T>();
        let mut state = self.lock();

        if state.resolved.contains_key(&key) {
            return Err(RegistryError::AlreadyResolved { layout });
        }
        if state.declarations.contains_key(&key) {
            return Err(RegistryError::DuplicateDeclaration { layout });
        }

        state.declarations.insert(key, erase(factory));
        debug!(layout, "declared custom marshaler");
        Ok(())
    }

    /// Look up the marshaler for layout `T`, resolving and caching on first use.
    pub fn lookup<T: 'static>(&self) -> Option<Arc<dyn CustomMarshaler<T>>> {
        let key = TypeId::of::<T>();
        let mut state = self.lock();

        let cached = state.resolved.get(&key).cloned();
        let entry = match cached {
            Some(cached) => cached,
            None => {
                state.inspections += 1;
                let entry = state.declarations.get(&key).map(|resolve| resolve());
                trace!(
                    layout = type_name::<T>(),
                    found = entry.is_some(),
                    "resolved custom marshaler"
                );
                if entry.is_some() || !needs_drop::<T>() {
                    state.resolved.insert(key, entry.clone());
                }
                entry
            }
        };

        entry.and_then(|erased| {
            erased
                .downcast_ref::<Arc<dyn CustomMarshaler<T>>>()
                .cloned()
        })
    }

    pub fn has_marshaler<T: 'static>(&self) -> bool {
        self.lookup::<T>().is_some()
    }

    /// Native size of layout `T`: the marshaler's size if one is declared,
    /// otherwise the plain structure size.
    ///
    /// # Panics
    /// If no marshaler is declared and `T` owns drop glue.
    pub fn native_size_of<T: 'static>(&self) -> usize {
        match self.lookup::<T>() {
            Some(marshaler) => marshaler.native_data_size(),
            None => {
                plain_copy_guard::<T>();
                size_of::<T>()
            }
        }
    }

    /// Number of times the declaration table has been inspected.
    pub fn inspection_count(&self) -> usize {
        self.lock().inspections
    }

    /// Whether layout `T` has a cached lookup result (present or absent).
    pub fn is_resolved<T: 'static>(&self) -> bool {
        self.lock().resolved.contains_key(&TypeId::of::<T>())
    }
}
