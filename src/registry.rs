//! Handle → entity registries.
//!
//! The experience map keeps two of these: node → [`Cell`] and arc →
//! transition. The registry is the single owner of each entity; everything
//! else (the active set, the context, arc traversal) refers to entities by
//! graph handle only.
//!
//! [`Cell`]: crate::cell::Cell

use core::hash::Hash;

use hashbrown::HashMap;

/// Owning map from a graph handle to its domain entity.
#[derive(Clone, Debug)]
pub struct Registry<H, E> {
    entries: HashMap<H, E>,
}

impl<H: Copy + Eq + Hash, E> Registry<H, E> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Bind `entity` to `handle`, returning the previous binding if any.
    pub fn set(&mut self, handle: H, entity: E) -> Option<E> {
        self.entries.insert(handle, entity)
    }

    /// Entity bound to `handle`.
    pub fn get(&self, handle: H) -> Option<&E> {
        self.entries.get(&handle)
    }

    /// Mutable entity bound to `handle`.
    pub fn get_mut(&mut self, handle: H) -> Option<&mut E> {
        self.entries.get_mut(&handle)
    }

    /// Drop the binding for `handle`.
    pub fn remove(&mut self, handle: H) -> Option<E> {
        self.entries.remove(&handle)
    }

    /// `true` if `handle` is bound.
    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all `(handle, entity)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &E)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }
}

impl<H: Copy + Eq + Hash, E> Default for Registry<H, E> {
    fn default() -> Self {
        Self::new()
    }
}
