//! nodemark — a declarative rule engine that turns discovered node
//! features into string labels.
//!
//! Probes (out of tree) describe a compute node as typed [`Features`];
//! user-supplied [`Rule`]s match against them and produce a [`Labels`]
//! map. The engine holds no long-lived state: evaluation is a pure
//! function of a rule set and a feature snapshot.
//!
//! # Architecture
//!
//! - [`Features`] — typed feature store, addressed by
//!   `<domain>.<feature>`; each feature is a tagged [`FeatureSet`]
//!   (presence keys, value map, or instance list)
//! - [`MatchExpression`] — one operator + operand list, evaluated against
//!   a single input
//! - [`MatchExpressionSet`] — named-predicate conjunction over one
//!   feature, with wildcard (`*`) support
//! - [`Rule`] — `matchAny` (OR) / `matchAll` (AND) composition of
//!   [`FeatureMatcher`]s, producing labels through an optional name
//!   template
//! - [`NameTemplate`] — `{{ … }}` expansion of rule names with the match
//!   results as context
//!
//! Rules decode from compact JSON/YAML surface forms (bare scalars,
//! string slices, full objects) into one canonical in-memory form; see
//! the codec module docs.
//!
//! # Example
//!
//! ```
//! use nodemark::{Features, RuleSet};
//!
//! // What the probes discovered.
//! let mut features = Features::new();
//! features
//!     .domain_mut("kernel")
//!     .insert_keys("loadedmodule", ["nvidia", "ext4"]);
//!
//! // A rule in its compact surface form.
//! let rules: RuleSet = serde_json::from_str(
//!     r#"[ { "name": "gpu.driver", "matchAll": [ { "kernel.loadedmodule": ["nvidia"] } ] } ]"#,
//! )?;
//!
//! let labels = rules.evaluate(&features);
//! assert_eq!(labels.get("gpu.driver").map(String::as_str), Some("true"));
//! # Ok::<(), serde_json::Error>(())
//! ```
//!
//! # Concurrency
//!
//! A loaded [`Rule`] is immutable (name templates are parsed at load
//! time), so rule sets can be shared across threads and evaluated
//! concurrently; each call gets its own [`Labels`] accumulator. Output
//! depends only on rule structure: every container that can reach the
//! output is an ordered map, and matched element lists are sorted before
//! templates see them.

mod codec;
mod error;
mod expression;
mod expression_set;
mod feature;
mod rule;
mod template;

pub use error::MatchError;
pub use expression::{MatchExpression, MatchOp, MatchValue};
pub use expression_set::{
    MatchExpressionSet, MatchedInstance, MatchedKey, MatchedValue, MATCH_ALL_NAMES,
};
pub use feature::{
    DomainFeatures, FeatureSet, Features, InstanceFeature, KeyFeatures, ValueFeatures,
};
pub use rule::{
    evaluate_rules, FeatureMatcher, Labels, MatchedElements, MatchedFeatures, Rule, RuleSet,
};
pub use template::NameTemplate;

/// Prelude module for convenient imports.
///
/// ```
/// use nodemark::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        evaluate_rules, FeatureMatcher, FeatureSet, Features, InstanceFeature, Labels,
        MatchExpression, MatchExpressionSet, MatchOp, Rule, RuleSet,
    };
}
