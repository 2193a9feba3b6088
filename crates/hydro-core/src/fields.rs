//! Named numeric values: component state, parameters, and message bodies.
//!
//! `Fields` is backed by a `BTreeMap` so iteration order is the key order,
//! independent of insertion history.  Snapshots built from it are therefore
//! byte-for-byte reproducible between runs.

use std::collections::BTreeMap;
use std::fmt;

use crate::{CoreError, CoreResult};

// ── Fields ────────────────────────────────────────────────────────────────────

/// An ordered `name -> f64` map, e.g. `{ "water_level": 15.0, "volume": 1.5e7 }`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Fields(BTreeMap<String, f64>);

impl Fields {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    #[inline]
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Like [`get`](Self::get) but fails with [`CoreError::MissingField`].
    pub fn require(&self, name: &str) -> CoreResult<f64> {
        self.get(name).ok_or_else(|| CoreError::MissingField(name.to_owned()))
    }

    /// Insert or overwrite; returns the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    /// Overwrite `self` with every entry of `other`.
    pub fn merge(&mut self, other: &Fields) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), *v);
        }
    }

    /// Keep only the named entries (missing names are skipped).
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Fields {
        names
            .into_iter()
            .filter_map(|n| self.get(n).map(|v| (n.to_owned(), v)))
            .collect()
    }

    /// Fail on the first NaN or infinite entry.
    pub fn ensure_finite(&self) -> CoreResult<()> {
        match self.0.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, value)) => Err(CoreError::NonFinite { name: name.clone(), value: *value }),
            None => Ok(()),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Fields {
    type Item = (String, f64);
    type IntoIter = std::collections::btree_map::IntoIter<String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// Name used by [`Payload::scalar`] for single-value messages.
pub const SCALAR_FIELD: &str = "value";

/// The body of a bus message: scalar fields plus optional named series
/// (forecasts, horizons).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Payload {
    pub values: Fields,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub series: BTreeMap<String, Vec<f64>>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload carrying one value under [`SCALAR_FIELD`].
    pub fn scalar(value: f64) -> Self {
        Self::from_fields(Fields::new().with(SCALAR_FIELD, value))
    }

    pub fn from_fields(values: Fields) -> Self {
        Self { values, series: BTreeMap::new() }
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.set(name, value);
        self
    }

    pub fn with_series(mut self, name: impl Into<String>, series: Vec<f64>) -> Self {
        self.series.insert(name.into(), series);
        self
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name)
    }

    /// The [`SCALAR_FIELD`] entry, if present.
    #[inline]
    pub fn scalar_value(&self) -> Option<f64> {
        self.values.get(SCALAR_FIELD)
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(Vec::as_slice)
    }
}

impl From<Fields> for Payload {
    fn from(values: Fields) -> Self {
        Self::from_fields(values)
    }
}
