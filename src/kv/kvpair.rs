// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use derive_new::new;

use super::HexRepr;
use super::Key;
use super::Value;

/// A key/value pair, as returned by reads.
#[derive(new, Clone, Default, Eq, PartialEq)]
pub struct KvPair(pub Key, pub Value);

impl KvPair {
    pub fn key(&self) -> &Key {
        &self.0
    }

    pub fn value(&self) -> &Value {
        &self.1
    }

    pub fn into_key_value(self) -> (Key, Value) {
        (self.0, self.1)
    }
}

impl From<(Key, Value)> for KvPair {
    fn from((key, value): (Key, Value)) -> Self {
        KvPair(key, value)
    }
}

impl fmt::Debug for KvPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let KvPair(key, value) = self;
        write!(f, "KvPair({}, {})", HexRepr(key.as_ref()), HexRepr(value))
    }
}

/// A single buffered write. An empty value is a delete.
///
/// A transaction's mutation set is a mapping from key to value with unique
/// keys; the committer materializes each mutation as a provisional lock
/// during prewrite.
#[derive(new, Clone, Eq, PartialEq)]
pub struct Mutation {
    pub key: Key,
    pub value: Value,
}

impl Mutation {
    pub fn is_delete(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Mutation({}, {})",
            HexRepr(self.key.as_ref()),
            HexRepr(&self.value)
        )
    }
}
