// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use super::HexRepr;

/// The key part of a key/value pair.
///
/// Conceptually a `Key` is an arbitrary byte string; keys compare
/// lexicographically by their raw bytes. Most methods accepting a key accept
/// `impl Into<Key>`, so `String`, `&str`, and `Vec<u8>` arguments all work.
#[derive(Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    pub const EMPTY: Self = Key(Vec::new());

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key(v)
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key(v.into_bytes())
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key(v.as_bytes().to_vec())
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", HexRepr(&self.0))
    }
}
