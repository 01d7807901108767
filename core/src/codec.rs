//! Wire codec for match expressions — several compact surface forms, one
//! canonical in-memory form.
//!
//! A [`MatchExpression`] may be written as a bare scalar, an array of
//! strings, or the canonical `{op, value}` object; a
//! [`MatchExpressionSet`] as a `["name", "name=value"]` slice or a
//! `name → expression | null` object. Deserialization funnels through a
//! self-describing [`serde_json::Value`] and tries the shapes in order, so
//! the same rules parse from any self-describing serde format (JSON,
//! YAML). Every decoded expression is re-validated; serialization always
//! emits the canonical form.

use serde::de::{Deserialize, Deserializer, Error as _};
use serde_json::Value;

use crate::expression::{MatchExpression, MatchOp, MatchValue};
use crate::expression_set::MatchExpressionSet;

/// Render a JSON number the way the operand lists store it: integers
/// verbatim, floats with the fewest digits that round-trip (never in
/// exponent notation).
fn format_number(number: &serde_json::Number) -> String {
    if let Some(i) = number.as_i64() {
        i.to_string()
    } else if let Some(u) = number.as_u64() {
        u.to_string()
    } else {
        match number.as_f64() {
            Some(f) => f.to_string(),
            None => number.to_string(),
        }
    }
}

fn string_list<E: serde::de::Error>(items: Vec<Value>) -> Result<Vec<String>, E> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(E::custom(format!("invalid value {other} in value list"))),
        })
        .collect()
}

impl<'de> Deserialize<'de> for MatchValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match raw {
            Value::String(s) => Ok(Self(vec![s])),
            Value::Bool(b) => Ok(Self(vec![b.to_string()])),
            Value::Number(n) => Ok(Self(vec![format_number(&n)])),
            Value::Array(items) => string_list(items).map(Self),
            other => Err(D::Error::custom(format!("invalid value list '{other}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for MatchExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let expression = match raw {
            Value::String(s) => Self::with_values(MatchOp::In, [s]),
            Value::Bool(b) => Self::with_values(MatchOp::In, [b.to_string()]),
            Value::Number(n) => Self::with_values(MatchOp::In, [format_number(&n)]),
            Value::Array(items) => Self {
                op: MatchOp::In,
                value: MatchValue(string_list(items)?),
            },
            Value::Object(_) => {
                // Canonical object form. An absent op means Any.
                #[derive(serde::Deserialize)]
                struct Canonical {
                    #[serde(default)]
                    op: MatchOp,
                    #[serde(default)]
                    value: MatchValue,
                }

                let canonical: Canonical =
                    serde_json::from_value(raw).map_err(D::Error::custom)?;
                Self {
                    op: canonical.op,
                    value: canonical.value,
                }
            }
            other => {
                return Err(D::Error::custom(format!(
                    "invalid match expression '{other}'"
                )))
            }
        };

        expression.validate().map_err(D::Error::custom)?;
        Ok(expression)
    }
}

impl<'de> Deserialize<'de> for MatchExpressionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match raw {
            // Simplified slice form: "name" means Exists, "name=value"
            // means In[value].
            Value::Array(items) => {
                let mut set = Self::new();
                for item in items {
                    let entry = match item {
                        Value::String(entry) => entry,
                        other => {
                            return Err(D::Error::custom(format!(
                                "invalid expression set entry {other}"
                            )))
                        }
                    };
                    match entry.split_once('=') {
                        Some((name, value)) => set.insert(
                            name,
                            MatchExpression::with_values(MatchOp::In, [value]),
                        ),
                        None => set.insert(entry, MatchExpression::new(MatchOp::Exists)),
                    }
                }
                Ok(set)
            }
            // Full map form; null stands for Exists.
            Value::Object(entries) => {
                let mut set = Self::new();
                for (name, value) in entries {
                    let expression = if value.is_null() {
                        MatchExpression::new(MatchOp::Exists)
                    } else {
                        serde_json::from_value(value).map_err(D::Error::custom)?
                    };
                    set.insert(name, expression);
                }
                Ok(set)
            }
            other => Err(D::Error::custom(format!(
                "invalid expression set '{other}'"
            ))),
        }
    }
}
