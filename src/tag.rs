//! # Device Tags
//!
//! A [`DeviceTag`] is a set of string attributes (e.g. `register_address`,
//! `function_code`, `data_type`) that addresses one point on a device. The
//! attribute vocabulary belongs to the adapter that interprets the tag.
//!
//! Tags are used as map keys, so they carry a total order: fewer attributes
//! sort first, then tags compare lexicographically over their sorted
//! `(key, value)` pairs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An addressable data point, described by its attribute set.
///
/// # Example
///
/// ```rust
/// use southbound::DeviceTag;
///
/// let tag = DeviceTag::new()
///     .with("register_address", "100")
///     .with("data_type", "uint16");
///
/// assert_eq!(tag.attribute("register_address"), Some("100"));
/// assert_eq!(tag, DeviceTag::parse("data_type:uint16,register_address:100").unwrap());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceTag {
    attributes: BTreeMap<String, String>,
}

impl DeviceTag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Insert or replace an attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    #[inline]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse the compact `key:value,key:value` notation.
    ///
    /// Whitespace around keys and values is trimmed; empty segments are
    /// skipped. Returns `None` if a segment has no `:` or an empty key.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tag = DeviceTag::new();
        for segment in text.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            tag.insert(key, value.trim());
        }
        Some(tag)
    }
}

impl Ord for DeviceTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.attributes
            .len()
            .cmp(&other.attributes.len())
            .then_with(|| self.attributes.iter().cmp(other.attributes.iter()))
    }
}

impl PartialOrd for DeviceTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceTag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", key, value)?;
        }
        Ok(())
    }
}
