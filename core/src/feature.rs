//! Typed feature containers — what the probes discovered, arranged for
//! rule evaluation.
//!
//! A [`Features`] value maps a domain (`cpu`, `kernel`, `pci`, …) to its
//! [`DomainFeatures`]. Each feature inside a domain has exactly one of
//! three shapes, captured by the tagged [`FeatureSet`] variant:
//!
//! - `Keys` — boolean presence features (e.g. loaded kernel modules)
//! - `Values` — single-valued string attributes (e.g. `cpuid.AVX2 = true`)
//! - `Instances` — ordered records with an attribute map each (e.g. PCI
//!   devices)
//!
//! Feature names are case-insensitive: they are stored lowercased and
//! lookups lowercase the query. All containers are ordered maps/sets so
//! that evaluation output never depends on hash-map iteration order.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A set of presence-only feature names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFeatures(BTreeSet<String>);

impl KeyFeatures {
    /// Create an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key.
    pub fn insert(&mut self, key: impl Into<String>) {
        self.0.insert(key.into());
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    /// Iterate keys in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

impl<S: Into<String>> FromIterator<S> for KeyFeatures {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A map of single-valued string attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueFeatures(BTreeMap<String, String>);

impl ValueFeatures {
    /// Create an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute; an existing value is overwritten.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up one attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValueFeatures {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One instance of a structured feature, e.g. a single PCI device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceFeature {
    attributes: ValueFeatures,
}

impl InstanceFeature {
    /// Create an instance with no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance's attribute map.
    #[must_use]
    pub fn attributes(&self) -> &ValueFeatures {
        &self.attributes
    }

    /// Look up one attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)
    }

    /// Set an attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InstanceFeature {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// One feature in one of its three shapes.
///
/// Snapshot wire form is externally tagged:
/// `{"keys": [...]}` / `{"values": {...}}` / `{"instances": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSet {
    /// Presence-only names.
    Keys(KeyFeatures),
    /// Single-valued attributes.
    Values(ValueFeatures),
    /// Ordered structured records.
    Instances(Vec<InstanceFeature>),
}

impl FeatureSet {
    /// Short name of the shape, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Keys(_) => "keys",
            Self::Values(_) => "values",
            Self::Instances(_) => "instances",
        }
    }

    /// The key set, if this is a `Keys` feature.
    #[must_use]
    pub fn as_keys(&self) -> Option<&KeyFeatures> {
        match self {
            Self::Keys(k) => Some(k),
            _ => None,
        }
    }

    /// The value map, if this is a `Values` feature.
    #[must_use]
    pub fn as_values(&self) -> Option<&ValueFeatures> {
        match self {
            Self::Values(v) => Some(v),
            _ => None,
        }
    }

    /// The instance list, if this is an `Instances` feature.
    #[must_use]
    pub fn as_instances(&self) -> Option<&[InstanceFeature]> {
        match self {
            Self::Instances(i) => Some(i),
            _ => None,
        }
    }
}

/// All discovered features of one domain, keyed by lowercased feature name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainFeatures(BTreeMap<String, FeatureSet>);

impl DomainFeatures {
    /// Create an empty domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a feature; the query is lowercased first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureSet> {
        self.0.get(&name.to_lowercase())
    }

    /// Register a key-shaped feature, replacing any previous shape.
    pub fn insert_keys<I, S>(&mut self, name: impl Into<String>, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name, FeatureSet::Keys(keys.into_iter().collect()));
    }

    /// Register a value-shaped feature, replacing any previous shape.
    pub fn insert_values<I, K, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.insert(name, FeatureSet::Values(values.into_iter().collect()));
    }

    /// Register an instance-shaped feature, replacing any previous shape.
    pub fn insert_instances(
        &mut self,
        name: impl Into<String>,
        instances: Vec<InstanceFeature>,
    ) {
        self.insert(name, FeatureSet::Instances(instances));
    }

    /// Register a feature under its lowercased name.
    pub fn insert(&mut self, name: impl Into<String>, feature: FeatureSet) {
        self.0.insert(name.into().to_lowercase(), feature);
    }

    /// Iterate `(name, feature)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureSet)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the domain has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another domain into this one. Same-shape features combine
    /// (keys union, values overwrite key-wise, instances replace by their
    /// `"name"` attribute); a shape change replaces the feature wholesale.
    pub fn merge(&mut self, other: Self) {
        for (name, incoming) in other.0 {
            match self.0.entry(name) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
                btree_map::Entry::Occupied(mut slot) => match (slot.get_mut(), incoming) {
                    (FeatureSet::Keys(old), FeatureSet::Keys(new)) => old.extend(new),
                    (FeatureSet::Values(old), FeatureSet::Values(new)) => old.extend(new),
                    (FeatureSet::Instances(old), FeatureSet::Instances(new)) => {
                        merge_instances(old, new);
                    }
                    (old, incoming) => *old = incoming,
                },
            }
        }
    }
}

/// Elements are identified by their `"name"` attribute; a later element
/// with the same name fully replaces the earlier one (attribute maps are
/// not merged attribute-wise). Elements without a name always append.
fn merge_instances(existing: &mut Vec<InstanceFeature>, incoming: Vec<InstanceFeature>) {
    for instance in incoming {
        let slot = instance.attribute("name").and_then(|name| {
            existing
                .iter_mut()
                .find(|e| e.attribute("name") == Some(name))
        });
        match slot {
            Some(slot) => *slot = instance,
            None => existing.push(instance),
        }
    }
}

/// All discovered features of the node, arranged by domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(BTreeMap<String, DomainFeatures>);

impl Features {
    /// Create an empty feature collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one domain.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&DomainFeatures> {
        self.0.get(name)
    }

    /// Get or create a domain.
    pub fn domain_mut(&mut self, name: impl Into<String>) -> &mut DomainFeatures {
        self.0.entry(name.into()).or_default()
    }

    /// Iterate `(domain, features)` pairs in domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DomainFeatures)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no domain has been discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another collection into this one, domain by domain. Data from
    /// `other` wins on conflict.
    pub fn merge(&mut self, other: Self) {
        for (domain, features) in other.0 {
            self.0.entry(domain).or_default().merge(features);
        }
    }
}

impl IntoIterator for Features {
    type Item = (String, DomainFeatures);
    type IntoIter = btree_map::IntoIter<String, DomainFeatures>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
