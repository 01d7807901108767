//! `MatchExpressionSet` — a named-predicate conjunction over one feature.
//!
//! The set maps attribute names to expressions and is evaluated against a
//! container of matching shape. The `match_get_*` variants return what
//! matched (for template expansion); the boolean wrappers just test
//! non-emptiness.
//!
//! Semantics worth keeping in view:
//!
//! - An EMPTY set matches every key / every value, but NO instance.
//! - The wildcard name `*` applies its expression to every name in the
//!   target and contributes the survivors; it never short-circuits.
//! - A named predicate that fails short-circuits the whole set.

use std::collections::btree_map::{self, BTreeMap};

use serde::Serialize;

use crate::error::MatchError;
use crate::expression::MatchExpression;
use crate::feature::{InstanceFeature, KeyFeatures, ValueFeatures};

/// The wildcard name: applies an expression to every name in the target
/// container. Real attribute names must never be `*`.
pub const MATCH_ALL_NAMES: &str = "*";

/// A key that matched, as exposed to name templates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchedKey {
    /// The matched key.
    #[serde(rename = "Name")]
    pub name: String,
}

/// A value entry that matched, as exposed to name templates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MatchedValue {
    /// The matched attribute name.
    #[serde(rename = "Name")]
    pub name: String,
    /// The attribute's value.
    #[serde(rename = "Value")]
    pub value: String,
}

/// The attribute map of an instance that matched.
pub type MatchedInstance = ValueFeatures;

/// A set of named expressions, all of which must match (see module docs
/// for the empty-set and wildcard exceptions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MatchExpressionSet(BTreeMap<String, MatchExpression>);

impl MatchExpressionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named expression.
    pub fn insert(&mut self, name: impl Into<String>, expression: MatchExpression) {
        self.0.insert(name.into(), expression);
    }

    /// Look up the expression for a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MatchExpression> {
        self.0.get(name)
    }

    /// Iterate `(name, expression)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, MatchExpression> {
        self.0.iter()
    }

    /// Returns the number of expressions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no expressions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every expression in the set.
    ///
    /// # Errors
    ///
    /// Propagates the first failing expression's error.
    pub fn validate(&self) -> Result<(), MatchError> {
        for expression in self.0.values() {
            expression.validate()?;
        }
        Ok(())
    }

    /// Evaluate against a key set, returning the matched keys sorted by
    /// name (duplicates from wildcard + named overlap removed).
    ///
    /// An empty set matches every key. A failing named predicate returns
    /// an empty result without evaluating the rest.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_get_keys(&self, keys: &KeyFeatures) -> Result<Vec<MatchedKey>, MatchError> {
        let mut matched = Vec::with_capacity(self.len().max(keys.len()));

        if self.is_empty() {
            matched.extend(keys.iter().map(|name| MatchedKey { name: name.into() }));
            return Ok(matched);
        }

        for (name, expression) in &self.0 {
            if name == MATCH_ALL_NAMES {
                for key in keys.iter() {
                    if expression.match_scalar(true, key)? {
                        matched.push(MatchedKey { name: key.into() });
                    }
                }
            } else if expression.match_keys(name, keys)? {
                matched.push(MatchedKey { name: name.clone() });
            } else {
                log::trace!("no match for key {name:?} with op \"{}\"", expression.op);
                return Ok(Vec::new());
            }
        }

        matched.sort_unstable();
        matched.dedup();
        Ok(matched)
    }

    /// Evaluate against a value map, returning the matched entries sorted
    /// by name.
    ///
    /// An empty set matches every entry. The wildcard applies its
    /// expression to the NAMES of the map (keys-as-values), contributing
    /// each surviving entry.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_get_values(
        &self,
        values: &ValueFeatures,
    ) -> Result<Vec<MatchedValue>, MatchError> {
        let mut matched = Vec::with_capacity(self.len().max(values.len()));

        if self.is_empty() {
            matched.extend(values.iter().map(|(name, value)| MatchedValue {
                name: name.into(),
                value: value.into(),
            }));
            return Ok(matched);
        }

        for (name, expression) in &self.0 {
            if name == MATCH_ALL_NAMES {
                for (key, value) in values.iter() {
                    if expression.match_scalar(true, key)? {
                        matched.push(MatchedValue {
                            name: key.into(),
                            value: value.into(),
                        });
                    }
                }
            } else if expression.match_values(name, values)? {
                matched.push(MatchedValue {
                    name: name.clone(),
                    value: values.get(name).unwrap_or_default().into(),
                });
            } else {
                log::trace!("no match for value {name:?} with op \"{}\"", expression.op);
                return Ok(Vec::new());
            }
        }

        matched.sort_unstable();
        matched.dedup();
        Ok(matched)
    }

    /// Evaluate against an instance list, returning the attribute maps of
    /// instances where every named predicate matched, in input order.
    ///
    /// An empty set matches NO instance — deliberately asymmetric with the
    /// keys/values empty-set rule.
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_get_instances(
        &self,
        instances: &[InstanceFeature],
    ) -> Result<Vec<MatchedInstance>, MatchError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut matched = Vec::new();
        for instance in instances {
            if !self.match_get_values(instance.attributes())?.is_empty() {
                matched.push(instance.attributes().clone());
            }
        }
        Ok(matched)
    }

    /// Boolean form of [`match_get_keys`](Self::match_get_keys).
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_keys(&self, keys: &KeyFeatures) -> Result<bool, MatchError> {
        Ok(!self.match_get_keys(keys)?.is_empty())
    }

    /// Boolean form of [`match_get_values`](Self::match_get_values).
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_values(&self, values: &ValueFeatures) -> Result<bool, MatchError> {
        Ok(!self.match_get_values(values)?.is_empty())
    }

    /// Boolean form of [`match_get_instances`](Self::match_get_instances).
    ///
    /// # Errors
    ///
    /// Propagates expression evaluation errors.
    pub fn match_instances(&self, instances: &[InstanceFeature]) -> Result<bool, MatchError> {
        Ok(!self.match_get_instances(instances)?.is_empty())
    }
}

impl<S: Into<String>> FromIterator<(S, MatchExpression)> for MatchExpressionSet {
    fn from_iter<I: IntoIterator<Item = (S, MatchExpression)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::MatchOp;

    fn keys(names: &[&str]) -> KeyFeatures {
        names.iter().copied().collect()
    }

    fn values(pairs: &[(&str, &str)]) -> ValueFeatures {
        pairs.iter().copied().collect()
    }

    #[test]
    fn empty_set_matches_all_keys() {
        let set = MatchExpressionSet::new();
        let matched = set.match_get_keys(&keys(&["ext4", "nvidia"])).unwrap();
        assert_eq!(
            matched.iter().map(|k| k.name.as_str()).collect::<Vec<_>>(),
            vec!["ext4", "nvidia"]
        );

        // ...but an empty target still yields no match.
        assert!(!set.match_keys(&keys(&[])).unwrap());
    }

    #[test]
    fn empty_set_matches_all_values() {
        let set = MatchExpressionSet::new();
        let matched = set
            .match_get_values(&values(&[("AVX2", "true"), ("SSE4", "true")]))
            .unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].name, "AVX2");
        assert_eq!(matched[0].value, "true");
    }

    #[test]
    fn empty_set_matches_no_instance() {
        let set = MatchExpressionSet::new();
        let instances: Vec<InstanceFeature> =
            vec![[("size", "16")].into_iter().collect(), [("size", "4")].into_iter().collect()];

        assert!(set.match_get_instances(&instances).unwrap().is_empty());
        assert!(!set.match_instances(&instances).unwrap());
    }

    #[test]
    fn named_key_predicates_are_a_conjunction() {
        let set: MatchExpressionSet = [
            ("ext4", MatchExpression::new(MatchOp::Exists)),
            ("nvidia", MatchExpression::new(MatchOp::Exists)),
        ]
        .into_iter()
        .collect();

        assert!(set.match_keys(&keys(&["ext4", "nvidia", "i915"])).unwrap());
        assert!(!set.match_keys(&keys(&["ext4"])).unwrap());
    }

    #[test]
    fn failing_predicate_short_circuits() {
        // BTreeMap iterates in name order: "aaa" fails before "zzz" would
        // error on its broken regex.
        let set: MatchExpressionSet = [
            ("aaa", MatchExpression::with_values(MatchOp::In, ["no"])),
            (
                "zzz",
                MatchExpression::with_values(MatchOp::InRegexp, ["[unclosed"]),
            ),
        ]
        .into_iter()
        .collect();

        let matched = set.match_get_values(&values(&[("aaa", "yes"), ("zzz", "x")]));
        assert!(matched.unwrap().is_empty());

        // With no earlier failure the broken regex must surface.
        let set: MatchExpressionSet = [(
            "zzz",
            MatchExpression::with_values(MatchOp::InRegexp, ["[unclosed"]),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            set.match_get_values(&values(&[("zzz", "x")])),
            Err(MatchError::InvalidRegexp { .. })
        ));
    }

    #[test]
    fn wildcard_scans_every_key() {
        let set: MatchExpressionSet = [(
            MATCH_ALL_NAMES,
            MatchExpression::with_values(MatchOp::InRegexp, ["^AVX"]),
        )]
        .into_iter()
        .collect();

        let matched = set
            .match_get_keys(&keys(&["AVX2", "AVX512F", "SSE42"]))
            .unwrap();
        assert_eq!(
            matched.iter().map(|k| k.name.as_str()).collect::<Vec<_>>(),
            vec!["AVX2", "AVX512F"]
        );
    }

    #[test]
    fn wildcard_matching_nothing_is_not_a_failure() {
        let set: MatchExpressionSet = [
            (
                MATCH_ALL_NAMES,
                MatchExpression::with_values(MatchOp::InRegexp, ["^XYZ"]),
            ),
            ("SSE42", MatchExpression::new(MatchOp::Exists)),
        ]
        .into_iter()
        .collect();

        // The named predicate carries the match even though the wildcard
        // selected nothing.
        let matched = set.match_get_keys(&keys(&["AVX2", "SSE42"])).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "SSE42");
    }

    #[test]
    fn wildcard_with_failing_named_predicate_is_no_match() {
        let set: MatchExpressionSet = [
            (
                MATCH_ALL_NAMES,
                MatchExpression::with_values(MatchOp::InRegexp, ["^AVX"]),
            ),
            ("SSE42", MatchExpression::new(MatchOp::Exists)),
        ]
        .into_iter()
        .collect();

        assert!(set.match_get_keys(&keys(&["AVX2"])).unwrap().is_empty());
    }

    #[test]
    fn wildcard_and_named_overlap_is_deduplicated() {
        let set: MatchExpressionSet = [
            (MATCH_ALL_NAMES, MatchExpression::new(MatchOp::Any)),
            ("AVX2", MatchExpression::new(MatchOp::Exists)),
        ]
        .into_iter()
        .collect();

        let matched = set.match_get_keys(&keys(&["AVX2", "SSE42"])).unwrap();
        assert_eq!(
            matched.iter().map(|k| k.name.as_str()).collect::<Vec<_>>(),
            vec!["AVX2", "SSE42"]
        );
    }

    #[test]
    fn wildcard_on_values_matches_names_not_values() {
        let set: MatchExpressionSet = [(
            MATCH_ALL_NAMES,
            MatchExpression::with_values(MatchOp::In, ["AVX2"]),
        )]
        .into_iter()
        .collect();

        let matched = set
            .match_get_values(&values(&[("AVX2", "false"), ("SSE4", "AVX2")]))
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "AVX2");
        assert_eq!(matched[0].value, "false");
    }

    #[test]
    fn missing_value_matched_by_does_not_exist_has_empty_value() {
        let set: MatchExpressionSet = [(
            "AVX512",
            MatchExpression::new(MatchOp::DoesNotExist),
        )]
        .into_iter()
        .collect();

        let matched = set.match_get_values(&values(&[("AVX2", "true")])).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "AVX512");
        assert_eq!(matched[0].value, "");
    }

    #[test]
    fn instances_filtered_by_attribute_predicates() {
        let set: MatchExpressionSet = [(
            "size",
            MatchExpression::with_values(MatchOp::Gt, ["8"]),
        )]
        .into_iter()
        .collect();

        let instances: Vec<InstanceFeature> =
            vec![[("size", "16")].into_iter().collect(), [("size", "4")].into_iter().collect()];

        let matched = set.match_get_instances(&instances).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].get("size"), Some("16"));
    }

    #[test]
    fn instance_errors_propagate() {
        let set: MatchExpressionSet = [(
            "size",
            MatchExpression::with_values(MatchOp::Gt, ["8"]),
        )]
        .into_iter()
        .collect();

        let instances: Vec<InstanceFeature> = vec![[("size", "large")].into_iter().collect()];
        assert!(matches!(
            set.match_get_instances(&instances),
            Err(MatchError::NotANumber { .. })
        ));
    }
}
