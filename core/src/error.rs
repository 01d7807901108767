//! `MatchError` — everything the engine can reject.
//!
//! One crate-level enum; variants are named after the failure, not the
//! call site. Schema errors (arity, malformed keys) surface at rule-load
//! time, the rest during evaluation.

use crate::expression::MatchOp;

/// Errors produced while loading or evaluating rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The value list does not fit the operator's arity invariant.
    #[error("invalid value list for op \"{op}\": expected {expected}, got {count} element(s)")]
    InvalidValueCount {
        /// The operator being validated.
        op: MatchOp,
        /// Human-readable arity requirement ("no", "exactly one", …).
        expected: &'static str,
        /// Number of elements actually present.
        count: usize,
    },

    /// A value-comparison operator was routed through key matching.
    #[error("invalid op \"{op}\" when matching keys")]
    InvalidOpForKeys {
        /// The offending operator.
        op: MatchOp,
    },

    /// A regular expression in an `InRegexp` value list failed to compile.
    #[error("invalid regexp {pattern:?}: {reason}")]
    InvalidRegexp {
        /// The pattern as written in the rule.
        pattern: String,
        /// Compile error text from the regex engine.
        reason: String,
    },

    /// `Gt`/`Lt` received an input or operand that is not a base-10 integer.
    #[error("not a number {value:?}")]
    NotANumber {
        /// The string that failed to parse.
        value: String,
    },

    /// A feature key is not of the `<domain>.<feature>` form.
    #[error("invalid feature key {key:?}: must be <domain>.<feature>")]
    MalformedFeatureKey {
        /// The key as written in the rule.
        key: String,
    },

    /// A rule referenced a feature domain that was never discovered.
    #[error("unknown feature domain {domain:?}")]
    UnknownDomain {
        /// The missing domain.
        domain: String,
    },

    /// The domain exists but has no feature with this name.
    #[error("feature {feature:?} of domain {domain:?} not available")]
    UnknownFeature {
        /// The domain that was probed.
        domain: String,
        /// The (lowercased) feature name that was not found.
        feature: String,
    },

    /// A rule name contains `{{` but is not a valid template.
    #[error("invalid template in rule name: {detail}")]
    TemplateParse {
        /// What the parser choked on.
        detail: String,
    },

    /// A template failed at execution time (e.g. missing key).
    #[error("template execution failed: {detail}")]
    TemplateExec {
        /// What the executor choked on.
        detail: String,
    },
}
