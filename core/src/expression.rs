//! `MatchExpression` — a single typed predicate over one input value.
//!
//! An expression pairs an operator with a list of operand strings and is
//! evaluated against one input at a time. The same expression type is
//! overloaded across the three feature shapes: applied to key sets it can
//! only test presence, applied to value maps (and instance attributes) it
//! compares the looked-up value.
//!
//! Operator dispatch is a single exhaustive `match` so that adding an
//! operator fails to compile until every evaluation path handles it.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::feature::{KeyFeatures, ValueFeatures};

/// The operator applied when evaluating a [`MatchExpression`].
///
/// Wire representation is the literal operator name; the empty string
/// denotes [`Any`](MatchOp::Any).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum MatchOp {
    /// Matches unconditionally.
    #[serde(rename = "")]
    #[default]
    Any,
    /// Input equals one of the operands.
    In,
    /// Input equals none of the operands.
    NotIn,
    /// One of the operands, compiled as a regex, matches the input
    /// (unanchored substring match).
    InRegexp,
    /// The named attribute exists.
    Exists,
    /// The named attribute does not exist.
    DoesNotExist,
    /// Input, parsed as a base-10 integer, is strictly greater than the
    /// single operand.
    Gt,
    /// Input, parsed as a base-10 integer, is strictly less than the
    /// single operand.
    Lt,
    /// Input is the string `"true"`.
    IsTrue,
    /// Input is the string `"false"`.
    IsFalse,
}

impl MatchOp {
    /// The exact wire literal for this operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::InRegexp => "InRegexp",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
            Self::Gt => "Gt",
            Self::Lt => "Lt",
            Self::IsTrue => "IsTrue",
            Self::IsFalse => "IsFalse",
        }
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operand list of a [`MatchExpression`].
///
/// On the wire this accepts a lone scalar (`string | bool | number`) or an
/// array of strings; in memory it is always a string sequence. See the
/// codec module for the accepted surface forms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct MatchValue(pub Vec<String>);

impl MatchValue {
    /// Returns the number of operands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no operands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for MatchValue {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<String>> for MatchValue {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl<S: Into<String>> FromIterator<S> for MatchValue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A single predicate: operator plus operand list.
///
/// # Value arity
///
/// - `Exists` / `DoesNotExist` / `IsTrue` / `IsFalse` / `Any` — empty
/// - `Gt` / `Lt` — exactly one element, parseable as an integer
/// - everything else — at least one element
///
/// [`validate`](Self::validate) enforces this; the codec re-validates
/// every decoded expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchExpression {
    /// The operator to apply.
    pub op: MatchOp,

    /// The operands the input is evaluated against.
    #[serde(default, skip_serializing_if = "MatchValue::is_empty")]
    pub value: MatchValue,
}

impl MatchExpression {
    /// Create an expression with no operands.
    #[must_use]
    pub fn new(op: MatchOp) -> Self {
        Self {
            op,
            value: MatchValue::default(),
        }
    }

    /// Create an expression with the given operands.
    pub fn with_values<I, S>(op: MatchOp, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op,
            value: values.into_iter().collect(),
        }
    }

    /// Check the value-arity invariant for this operator.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidValueCount`] when the operand count
    /// does not fit the operator.
    pub fn validate(&self) -> Result<(), MatchError> {
        let count = self.value.len();
        match self.op {
            MatchOp::Any
            | MatchOp::Exists
            | MatchOp::DoesNotExist
            | MatchOp::IsTrue
            | MatchOp::IsFalse => {
                if count != 0 {
                    return Err(MatchError::InvalidValueCount {
                        op: self.op,
                        expected: "no",
                        count,
                    });
                }
            }
            MatchOp::Gt | MatchOp::Lt => {
                if count != 1 {
                    return Err(MatchError::InvalidValueCount {
                        op: self.op,
                        expected: "exactly one",
                        count,
                    });
                }
                parse_i64(&self.value[0])?;
            }
            MatchOp::In | MatchOp::NotIn | MatchOp::InRegexp => {
                if count == 0 {
                    return Err(MatchError::InvalidValueCount {
                        op: self.op,
                        expected: "at least one",
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Evaluate against a single input value.
    ///
    /// `valid` tells whether the input exists at all; presence operators
    /// consult it directly, value operators evaluate to `false` for an
    /// invalid input.
    ///
    /// # Errors
    ///
    /// - [`MatchError::InvalidRegexp`] when an `InRegexp` operand fails to
    ///   compile
    /// - [`MatchError::NotANumber`] when `Gt`/`Lt` sees a non-integer on
    ///   either side
    pub fn match_scalar(&self, valid: bool, value: &str) -> Result<bool, MatchError> {
        match self.op {
            MatchOp::Any => Ok(true),
            MatchOp::Exists => Ok(valid),
            MatchOp::DoesNotExist => Ok(!valid),
            MatchOp::In => Ok(valid && self.value.iter().any(|v| v == value)),
            MatchOp::NotIn => Ok(valid && !self.value.iter().any(|v| v == value)),
            MatchOp::InRegexp => {
                if !valid {
                    return Ok(false);
                }
                for pattern in self.value.iter() {
                    let re = regex::Regex::new(pattern).map_err(|e| MatchError::InvalidRegexp {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                    if re.is_match(value) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            MatchOp::Gt | MatchOp::Lt => {
                if !valid {
                    return Ok(false);
                }
                let lhs = parse_i64(value)?;
                let rhs = parse_i64(&self.value[0])?;
                Ok(match self.op {
                    MatchOp::Gt => lhs > rhs,
                    _ => lhs < rhs,
                })
            }
            MatchOp::IsTrue => Ok(valid && value == "true"),
            MatchOp::IsFalse => Ok(valid && value == "false"),
        }
    }

    /// Evaluate against a set of keys.
    ///
    /// Only presence operators make sense here.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::InvalidOpForKeys`] for value-comparison
    /// operators.
    pub fn match_keys(&self, name: &str, keys: &KeyFeatures) -> Result<bool, MatchError> {
        let present = keys.contains(name);
        match self.op {
            MatchOp::Any => Ok(true),
            MatchOp::Exists => Ok(present),
            MatchOp::DoesNotExist => Ok(!present),
            op => Err(MatchError::InvalidOpForKeys { op }),
        }
    }

    /// Evaluate against a value map: look up `name`, then delegate to
    /// [`match_scalar`](Self::match_scalar).
    ///
    /// # Errors
    ///
    /// Propagates [`match_scalar`](Self::match_scalar) errors.
    pub fn match_values(&self, name: &str, values: &ValueFeatures) -> Result<bool, MatchError> {
        match values.get(name) {
            Some(value) => self.match_scalar(true, value),
            None => self.match_scalar(false, ""),
        }
    }
}

fn parse_i64(value: &str) -> Result<i64, MatchError> {
    value.parse().map_err(|_| MatchError::NotANumber {
        value: value.to_owned(),
    })
}
