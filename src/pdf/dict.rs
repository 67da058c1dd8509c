//! PDF dictionary implementation

use std::collections::btree_map::{self, BTreeMap};

use super::{Name, ObjectId, PDFObject};

/// PDF dictionary object, keyed by decoded name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<Name, PDFObject>,
}

impl Dictionary {
    /// Create new dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get value by key
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.entries.get(key.as_bytes())
    }

    /// Mutable value for key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut PDFObject> {
        self.entries.get_mut(key.as_bytes())
    }

    /// Check if key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key.as_bytes())
    }

    /// Set value, returning the previous one
    pub fn set(&mut self, key: impl Into<Name>, value: impl Into<PDFObject>) -> Option<PDFObject> {
        self.entries.insert(key.into(), value.into())
    }

    /// Insert under an already decoded name
    pub fn insert(&mut self, key: Name, value: PDFObject) -> Option<PDFObject> {
        self.entries.insert(key, value)
    }

    /// Remove key and return its value
    pub fn remove(&mut self, key: &str) -> Option<PDFObject> {
        self.entries.remove(key.as_bytes())
    }

    /// Entries in key order
    pub fn iter(&self) -> btree_map::Iter<'_, Name, PDFObject> {
        self.entries.iter()
    }

    /// Mutable values in key order
    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, Name, PDFObject> {
        self.entries.values_mut()
    }

    /// Keys in order
    pub fn keys(&self) -> btree_map::Keys<'_, Name, PDFObject> {
        self.entries.keys()
    }

    /// Values in key order
    pub fn values(&self) -> btree_map::Values<'_, Name, PDFObject> {
        self.entries.values()
    }

    /// Get integer value
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64().ok())
    }

    /// Get name value
    pub fn get_name(&self, key: &str) -> Option<&Name> {
        self.get(key).and_then(|v| v.as_name().ok())
    }

    /// Whether `key` holds the given name
    pub fn has_name(&self, key: &str, name: &str) -> bool {
        self.get_name(key)
            .map_or(false, |n| n.as_bytes() == name.as_bytes())
    }

    /// Get reference value
    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(|v| v.as_reference().ok())
    }

    /// Direct array value
    pub fn get_array(&self, key: &str) -> Option<&Vec<PDFObject>> {
        self.get(key).and_then(|v| v.as_array().ok())
    }

    /// Direct dictionary value
    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        match self.get(key) {
            Some(PDFObject::Dictionary(d)) => Some(d),
            _ => None,
        }
    }

    /// Write dictionary to output
    pub fn write_to(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(b"<<");
        for (key, value) in &self.entries {
            key.write_to(output);
            output.push(b' ');
            value.write_to(output);
            output.push(b' ');
        }
        output.extend_from_slice(b">>");
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Name, &'a PDFObject);
    type IntoIter = btree_map::Iter<'a, Name, PDFObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(Name, PDFObject)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Name, PDFObject)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_operations() {
        let mut dict = Dictionary::new();
        dict.set("Type", PDFObject::name("Catalog"));
        dict.set("Count", 3i64);
        dict.set("Pages", ObjectId::new(2, 0));

        assert_eq!(dict.len(), 3);
        assert!(dict.has_name("Type", "Catalog"));
        assert_eq!(dict.get_integer("Count"), Some(3));
        assert_eq!(dict.get_reference("Pages"), Some(ObjectId::new(2, 0)));
        assert_eq!(dict.get_name("Count"), None);

        assert!(dict.remove("Count").is_some());
        assert!(!dict.contains_key("Count"));
    }

    #[test]
    fn test_write_is_sorted_by_key() {
        let mut dict = Dictionary::new();
        dict.set("Size", 4i64);
        dict.set("Root", ObjectId::new(1, 0));
        assert_eq!(
            String::from_utf8_lossy(&PDFObject::from(dict).to_bytes()),
            "<</Root 1 0 R /Size 4 >>"
        );
    }

    #[test]
    fn test_empty_dictionary() {
        assert_eq!(PDFObject::from(Dictionary::new()).to_bytes(), b"<<>>");
    }
}
