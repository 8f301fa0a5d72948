//! Two-tier key/value context storage
//!
//! Context entries live in a fixed inline array until a fifth insert spills
//! them into a heap map. The transition is one-way for the lifetime of an
//! error value; once the map exists, the inline entries are no longer
//! authoritative and every read prefers the map.

use std::collections::HashMap;
use std::fmt;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::config;

/// Number of context entries stored inline before spilling to a map.
pub const CONTEXT_INLINE: usize = 4;

/// Typed context value attached to an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Boolean flag (retry/timeout markers use this).
    Bool(bool),
    /// Unsigned integer (occurrence counts use this).
    U64(u64),
    /// Signed integer.
    I64(i64),
    /// Floating point.
    F64(f64),
    /// Arbitrary text.
    Str(String),
    /// Explicit null.
    Null,
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Bool(v) => write!(f, "{}", v),
            ContextValue::U64(v) => write!(f, "{}", v),
            ContextValue::I64(v) => write!(f, "{}", v),
            ContextValue::F64(v) => write!(f, "{}", v),
            ContextValue::Str(v) => f.write_str(v),
            ContextValue::Null => f.write_str("null"),
        }
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Bool(v)
    }
}

impl From<u64> for ContextValue {
    fn from(v: u64) -> Self {
        ContextValue::U64(v)
    }
}

impl From<u32> for ContextValue {
    fn from(v: u32) -> Self {
        ContextValue::U64(v as u64)
    }
}

impl From<usize> for ContextValue {
    fn from(v: usize) -> Self {
        ContextValue::U64(v as u64)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::I64(v)
    }
}

impl From<i32> for ContextValue {
    fn from(v: i32) -> Self {
        ContextValue::I64(v as i64)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::F64(v)
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        ContextValue::Str(v.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        ContextValue::Str(v)
    }
}

/// Ordered inline storage with one-way spill to a keyed map.
#[derive(Debug, Clone)]
pub(crate) enum ContextStore {
    /// Insertion-ordered entries, capacity [`CONTEXT_INLINE`].
    Inline(ArrayVec<(String, ContextValue), CONTEXT_INLINE>),
    /// Overflow map; authoritative once created.
    Spilled(HashMap<String, ContextValue>),
}

impl Default for ContextStore {
    fn default() -> Self {
        ContextStore::Inline(ArrayVec::new())
    }
}

impl ContextStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A duplicate key overwrites in place; the
    /// fifth distinct key allocates the overflow map, copies the inline
    /// entries in order, and redirects all subsequent writes to the map.
    pub(crate) fn insert(&mut self, key: String, value: ContextValue) {
        match self {
            ContextStore::Inline(entries) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                    return;
                }
                if entries.len() < CONTEXT_INLINE {
                    entries.push((key, value));
                    return;
                }
                let hint = config::snapshot().context_size.max(CONTEXT_INLINE + 1);
                let mut map = HashMap::with_capacity(hint);
                for (k, v) in std::mem::take(entries) {
                    map.insert(k, v);
                }
                map.insert(key, value);
                *self = ContextStore::Spilled(map);
            }
            ContextStore::Spilled(map) => {
                map.insert(key, value);
            }
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&ContextValue> {
        match self {
            ContextStore::Inline(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            ContextStore::Spilled(map) => map.get(key),
        }
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ContextStore::Inline(entries) => entries.len(),
            ContextStore::Spilled(map) => map.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the overflow map has been allocated.
    pub(crate) fn spilled(&self) -> bool {
        matches!(self, ContextStore::Spilled(_))
    }

    /// Materialize a keyed map view. Key order is not stable across the
    /// inline-to-map transition.
    pub(crate) fn as_map(&self) -> HashMap<String, ContextValue> {
        match self {
            ContextStore::Inline(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ContextStore::Spilled(map) => map.clone(),
        }
    }

    /// Visit entries without materializing a map. Inline entries arrive in
    /// insertion order; spilled entries in map order.
    pub(crate) fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &ContextValue),
    {
        match self {
            ContextStore::Inline(entries) => {
                for (k, v) in entries {
                    f(k, v);
                }
            }
            ContextStore::Spilled(map) => {
                for (k, v) in map {
                    f(k, v);
                }
            }
        }
    }

    /// Drop every entry and return to the inline variant.
    pub(crate) fn clear(&mut self) {
        *self = ContextStore::Inline(ArrayVec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stores_first_four_inline() {
        let mut store = ContextStore::new();
        store.insert("a".into(), 1i64.into());
        store.insert("b".into(), 2i64.into());
        store.insert("c".into(), 3i64.into());
        store.insert("d".into(), 4i64.into());

        assert_eq!(store.len(), 4);
        assert!(!store.spilled());
    }

    #[test]
    fn test_spills_on_fifth_insert() {
        let mut store = ContextStore::new();
        for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            store.insert(key.to_string(), (i as i64).into());
        }

        assert!(store.spilled());
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_preserves_all_entries_across_spill() {
        let mut store = ContextStore::new();
        let keys = ["a", "b", "c", "d", "e", "f"];
        for (i, key) in keys.iter().enumerate() {
            store.insert(key.to_string(), (i as i64).into());
        }

        let map = store.as_map();
        assert_eq!(map.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(map.get(*key), Some(&ContextValue::I64(i as i64)));
        }
    }

    #[test]
    fn test_duplicate_key_overwrites_inline() {
        let mut store = ContextStore::new();
        store.insert("k".into(), 1i64.into());
        store.insert("k".into(), 2i64.into());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k"), Some(&ContextValue::I64(2)));
    }

    #[test]
    fn test_duplicate_key_overwrites_spilled() {
        let mut store = ContextStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store.insert(key.to_string(), ContextValue::Null);
        }
        store.insert("c".into(), true.into());

        assert_eq!(store.len(), 5);
        assert_eq!(store.get("c"), Some(&ContextValue::Bool(true)));
    }

    #[test]
    fn test_clear_returns_to_inline() {
        let mut store = ContextStore::new();
        for key in ["a", "b", "c", "d", "e"] {
            store.insert(key.to_string(), ContextValue::Null);
        }
        store.clear();

        assert!(store.is_empty());
        assert!(!store.spilled());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(ContextValue::Bool(true).to_string(), "true");
        assert_eq!(ContextValue::U64(5).to_string(), "5");
        assert_eq!(ContextValue::Str("x".into()).to_string(), "x");
        assert_eq!(ContextValue::Null.to_string(), "null");
    }
}
