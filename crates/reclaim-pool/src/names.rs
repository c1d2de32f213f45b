//! Name resolution table.
//!
//! Spawning by logical name lets unrelated call sites share one idle queue
//! without ever exchanging a prototype reference. The first successful load
//! under a name binds it to that prototype's key; later loads under the same
//! name reuse the binding, even if the backend handed back a different object.

use std::collections::HashMap;

use crate::key::PrototypeKey;

/// Logical name -> [`PrototypeKey`] bindings. Stable for the lifetime of the
/// pool state.
#[derive(Debug, Default)]
pub struct NameTable {
    bindings: HashMap<String, PrototypeKey>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The key bound to `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<PrototypeKey> {
        self.bindings.get(name).copied()
    }

    /// Bind `name` to `key` unless it is already bound.
    ///
    /// Returns the effective key: the existing binding if there was one,
    /// otherwise `key`.
    pub fn bind(&mut self, name: &str, key: PrototypeKey) -> PrototypeKey {
        if let Some(&existing) = self.bindings.get(name) {
            return existing;
        }
        self.bindings.insert(name.to_owned(), key);
        key
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
