//! Rules — labelled compositions of per-feature expression sets.
//!
//! A [`Rule`] combines `matchAny` (OR of conjunctions) and `matchAll`
//! (AND of conjunctions) of [`FeatureMatcher`]s and produces zero or more
//! labels. Evaluation is a pure function of the rule and a [`Features`]
//! snapshot; rules are immutable after load (name templates are parsed in
//! the deserializer), so a loaded rule set can be evaluated concurrently.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MatchError;
use crate::expression_set::{MatchExpressionSet, MatchedInstance, MatchedKey, MatchedValue};
use crate::feature::{FeatureSet, Features};
use crate::template::NameTemplate;

/// Labels produced by rule evaluation: `name → value`.
pub type Labels = BTreeMap<String, String>;

/// One conjunction: every `<domain>.<feature>` entry must match for the
/// matcher to match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMatcher(BTreeMap<String, MatchExpressionSet>);

impl FeatureMatcher {
    /// Create an empty matcher (matches trivially: no entry can fail).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression set for a `<domain>.<feature>` key.
    pub fn insert(&mut self, key: impl Into<String>, expressions: MatchExpressionSet) {
        self.0.insert(key.into(), expressions);
    }

    /// Iterate `(key, expression set)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatchExpressionSet)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of feature entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no feature entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate the conjunction. Returns the matched data per feature, or
    /// `None` when any entry fails to match.
    ///
    /// # Errors
    ///
    /// - [`MatchError::MalformedFeatureKey`] when a key has no dot
    /// - [`MatchError::UnknownDomain`] / [`MatchError::UnknownFeature`]
    ///   when the addressed feature was never discovered
    /// - expression evaluation errors
    pub fn match_features(
        &self,
        features: &Features,
    ) -> Result<Option<MatchedFeatures>, MatchError> {
        let mut matched = MatchedFeatures::default();

        for (key, expressions) in &self.0 {
            let (domain, feature) =
                key.split_once('.')
                    .ok_or_else(|| MatchError::MalformedFeatureKey { key: key.clone() })?;
            let domain_features =
                features
                    .domain(domain)
                    .ok_or_else(|| MatchError::UnknownDomain {
                        domain: domain.to_owned(),
                    })?;

            // Feature names compare case-insensitively.
            let feature = feature.to_lowercase();
            let feature_set =
                domain_features
                    .get(&feature)
                    .ok_or_else(|| MatchError::UnknownFeature {
                        domain: domain.to_owned(),
                        feature: feature.clone(),
                    })?;

            let elements = match feature_set {
                FeatureSet::Keys(keys) => {
                    MatchedElements::Keys(expressions.match_get_keys(keys)?)
                }
                FeatureSet::Values(values) => {
                    MatchedElements::Values(expressions.match_get_values(values)?)
                }
                FeatureSet::Instances(instances) => {
                    MatchedElements::Instances(expressions.match_get_instances(instances)?)
                }
            };

            if elements.is_empty() {
                return Ok(None);
            }
            matched.insert(domain, feature, elements);
        }

        Ok(Some(matched))
    }
}

impl<S: Into<String>> FromIterator<(S, MatchExpressionSet)> for FeatureMatcher {
    fn from_iter<I: IntoIterator<Item = (S, MatchExpressionSet)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// What one feature contributed to a match, by shape.
///
/// Serializes as the bare element list; inside [`MatchedFeatures`] this
/// yields the `domain → feature → [elements]` tree that templates see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MatchedElements {
    /// Matched presence keys.
    Keys(Vec<MatchedKey>),
    /// Matched value entries.
    Values(Vec<MatchedValue>),
    /// Attribute maps of matched instances.
    Instances(Vec<MatchedInstance>),
}

impl MatchedElements {
    /// Returns `true` if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Keys(k) => k.is_empty(),
            Self::Values(v) => v.is_empty(),
            Self::Instances(i) => i.is_empty(),
        }
    }
}

/// Matched data of a whole conjunction: `domain → feature → elements`.
/// This is the context handed to name templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MatchedFeatures(BTreeMap<String, BTreeMap<String, MatchedElements>>);

impl MatchedFeatures {
    /// Look up the matched elements for one feature.
    #[must_use]
    pub fn get(&self, domain: &str, feature: &str) -> Option<&MatchedElements> {
        self.0.get(domain)?.get(feature)
    }

    /// Returns `true` if no feature matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, domain: &str, feature: String, elements: MatchedElements) {
        self.0
            .entry(domain.to_owned())
            .or_default()
            .insert(feature, elements);
    }
}

/// A labeling rule.
///
/// The rule name may be a template (contains `{{`); templates are parsed
/// at load time and fed the [`MatchedFeatures`] of each matching
/// alternative.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    template: NameTemplate,
    value: Option<String>,
    match_any: Vec<FeatureMatcher>,
    match_all: Vec<FeatureMatcher>,
}

impl Rule {
    /// Create a rule with the given (possibly templated) name.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::TemplateParse`] when the name contains
    /// malformed template markup.
    pub fn new(name: impl Into<String>) -> Result<Self, MatchError> {
        Ok(Self {
            template: NameTemplate::new(name)?,
            value: None,
            match_any: Vec::new(),
            match_all: Vec::new(),
        })
    }

    /// Set the label value used when a name line carries no `=` override.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Append OR alternatives.
    #[must_use]
    pub fn with_match_any<I: IntoIterator<Item = FeatureMatcher>>(mut self, matchers: I) -> Self {
        self.match_any.extend(matchers);
        self
    }

    /// Append AND terms.
    #[must_use]
    pub fn with_match_all<I: IntoIterator<Item = FeatureMatcher>>(mut self, matchers: I) -> Self {
        self.match_all.extend(matchers);
        self
    }

    /// The rule name as written.
    #[must_use]
    pub fn name(&self) -> &str {
        self.template.source()
    }

    /// The explicit label value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns `true` if the name is a template.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.template.is_template()
    }

    /// The OR alternatives.
    #[must_use]
    pub fn match_any(&self) -> &[FeatureMatcher] {
        &self.match_any
    }

    /// The AND terms.
    #[must_use]
    pub fn match_all(&self) -> &[FeatureMatcher] {
        &self.match_all
    }

    /// Evaluate the rule against a feature snapshot.
    ///
    /// Returns the produced labels; an empty map means the rule did not
    /// match. A template EXECUTION failure is logged and yields an empty
    /// map rather than an error (the rule fails open, the labels fail
    /// closed).
    ///
    /// # Errors
    ///
    /// Propagates evaluation errors other than template execution; the
    /// caller knows which rule failed.
    pub fn evaluate(&self, features: &Features) -> Result<Labels, MatchError> {
        log::debug!("evaluating rule {:?}", self.name());

        let labels = match self.evaluate_matchers(features) {
            Ok(labels) => labels,
            Err(MatchError::TemplateExec { detail }) => {
                log::warn!(
                    "rule {:?}: template expansion failed, dropping its labels: {detail}",
                    self.name()
                );
                Labels::new()
            }
            Err(e) => return Err(e),
        };

        log::debug!("rule {:?} produced {} label(s)", self.name(), labels.len());
        Ok(labels)
    }

    fn evaluate_matchers(&self, features: &Features) -> Result<Labels, MatchError> {
        let mut labels = Labels::new();

        if !self.match_any.is_empty() {
            // Logical OR over the alternatives.
            let mut matched = false;
            for alternative in &self.match_any {
                if let Some(m) = alternative.match_features(features)? {
                    matched = true;
                    self.expand_name(&m, &mut labels)?;
                    if !self.is_template() {
                        // Further alternatives would re-produce the same
                        // labels.
                        break;
                    }
                }
            }
            if !matched {
                return Ok(Labels::new());
            }
        }

        if !self.match_all.is_empty() {
            // Logical AND over the terms.
            for term in &self.match_all {
                match term.match_features(features)? {
                    Some(m) => self.expand_name(&m, &mut labels)?,
                    None => return Ok(Labels::new()),
                }
            }
        }

        if self.match_any.is_empty() && self.match_all.is_empty() {
            // No matchers at all: the rule matches trivially.
            self.expand_name(&MatchedFeatures::default(), &mut labels)?;
        }

        Ok(labels)
    }

    fn expand_name(
        &self,
        matched: &MatchedFeatures,
        labels: &mut Labels,
    ) -> Result<(), MatchError> {
        let data = serde_json::to_value(matched).map_err(|e| MatchError::TemplateExec {
            detail: e.to_string(),
        })?;
        let expanded = self.template.expand(&data)?;

        for line in expanded.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (name, value) = self.name_value(trimmed);
            labels.insert(name, value);
        }
        Ok(())
    }

    /// The value can be overridden per line with `key=value`; this is how
    /// templates emit per-label values.
    fn name_value(&self, line: &str) -> (String, String) {
        if let Some((name, value)) = line.split_once('=') {
            return (name.to_owned(), value.to_owned());
        }
        match &self.value {
            Some(value) => (line.to_owned(), value.clone()),
            None => (line.to_owned(), "true".to_owned()),
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct RuleData<'a> {
            name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            value: &'a Option<String>,
            #[serde(rename = "matchAny", skip_serializing_if = "Vec::is_empty")]
            match_any: &'a Vec<FeatureMatcher>,
            #[serde(rename = "matchAll", skip_serializing_if = "Vec::is_empty")]
            match_all: &'a Vec<FeatureMatcher>,
        }

        RuleData {
            name: self.name(),
            value: &self.value,
            match_any: &self.match_any,
            match_all: &self.match_all,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RuleData {
            name: String,
            #[serde(default)]
            value: Option<String>,
            #[serde(default, rename = "matchAny")]
            match_any: Vec<FeatureMatcher>,
            #[serde(default, rename = "matchAll")]
            match_all: Vec<FeatureMatcher>,
        }

        let data = RuleData::deserialize(deserializer)?;
        // Template parse failures are load failures: a rule set with a
        // broken name never loads.
        let template = NameTemplate::new(data.name).map_err(D::Error::custom)?;
        Ok(Self {
            template,
            value: data.value,
            match_any: data.match_any,
            match_all: data.match_all,
        })
    }
}

/// An ordered collection of rules; wire form is a plain rule array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    /// Create an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rules, in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    /// Append a rule.
    pub fn push(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate every rule with the log-and-continue policy of
    /// [`evaluate_rules`].
    #[must_use]
    pub fn evaluate(&self, features: &Features) -> Labels {
        evaluate_rules(&self.0, features)
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Evaluate rules in order, merging their labels key-wise (later rules
/// win). A failing rule is logged with its name and skipped; it
/// contributes no labels and does not poison its siblings.
#[must_use]
pub fn evaluate_rules(rules: &[Rule], features: &Features) -> Labels {
    let mut labels = Labels::new();
    for rule in rules {
        match rule.evaluate(features) {
            Ok(out) => labels.extend(out),
            Err(e) => log::error!("failed to evaluate rule {:?}: {e}", rule.name()),
        }
    }
    labels
}
