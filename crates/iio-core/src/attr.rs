//! Ordered attribute collections.
//!
//! An [`Attr`] pairs the logical name callers use (`raw`, `scale`,
//! `sampling_frequency`) with the file that backs it, relative to the device
//! directory (`in_voltage0_raw`, `scan_elements/in_voltage0_en`). Values are
//! never cached: every read goes back to the filesystem.

use std::slice;

/// A named attribute and its backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Logical name exposed to callers.
    pub name: String,
    /// Backing file, relative to the owning device directory.
    pub filename: String,
}

impl Attr {
    /// Create an attribute whose logical name and file differ.
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
        }
    }

    /// Create an attribute stored in a file of the same name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            filename: name.clone(),
            name,
        }
    }
}

/// Ordered collection of attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrStore {
    attrs: Vec<Attr>,
}

impl AttrStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute unless one with the same logical name exists.
    ///
    /// Returns `false` (and leaves the store untouched) on a duplicate.
    pub fn insert(&mut self, attr: Attr) -> bool {
        if self.contains(&attr.name) {
            return false;
        }
        self.attrs.push(attr);
        true
    }

    /// Append an attribute without the uniqueness check.
    pub fn push(&mut self, attr: Attr) {
        self.attrs.push(attr);
    }

    /// Look up an attribute by logical name.
    pub fn find(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Whether an attribute with this logical name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Backing file for a logical name.
    pub fn filename_of(&self, name: &str) -> Option<&str> {
        self.find(name).map(|a| a.filename.as_str())
    }

    /// Sort lexicographically by logical name.
    pub fn sort(&mut self) {
        self.attrs.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Mutable access for in-place renames.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Attr> {
        self.attrs.iter_mut()
    }

    /// Iterate in order.
    pub fn iter(&self) -> slice::Iter<'_, Attr> {
        self.attrs.iter()
    }

    /// Logical names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|a| a.name.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl<'a> IntoIterator for &'a AttrStore {
    type Item = &'a Attr;
    type IntoIter = slice::Iter<'a, Attr>;

    fn into_iter(self) -> Self::IntoIter {
        self.attrs.iter()
    }
}

impl IntoIterator for AttrStore {
    type Item = Attr;
    type IntoIter = std::vec::IntoIter<Attr>;

    fn into_iter(self) -> Self::IntoIter {
        self.attrs.into_iter()
    }
}

impl FromIterator<Attr> for AttrStore {
    fn from_iter<T: IntoIterator<Item = Attr>>(iter: T) -> Self {
        let mut store = AttrStore::new();
        for attr in iter {
            store.insert(attr);
        }
        store
    }
}
