//! Name templates — `{{ … }}` expansion of rule names with match results
//! as context.
//!
//! A rule name counts as a template when it contains the literal `{{`.
//! Templates are parsed when the rule is loaded and executed with the
//! rule's matched features rendered as a JSON value tree.
//!
//! The supported language is the subset the rule names actually need:
//!
//! - literal text
//! - `{{.path.to.field}}` — field chain lookup; a missing key is an
//!   execution error (there is no "zero value" fallback)
//! - `{{.}}` — the current value
//! - `{{range .path}} … {{end}}` — iterate a list element-wise or a map
//!   value-wise in key order, binding each element as the current value
//!
//! Anything else between `{{` and `}}` is a parse error, surfaced at rule
//! load time.

use serde_json::Value;

use crate::error::MatchError;

/// A rule name with its pre-parsed template, if the name is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    nodes: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    /// A field chain; empty means the current value (`{{.}}`).
    Field(Vec<String>),
    Range {
        path: Vec<String>,
        body: Vec<Node>,
    },
}

impl NameTemplate {
    /// Parse a rule name. Names without `{{` pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::TemplateParse`] for malformed template
    /// markup.
    pub fn new(name: impl Into<String>) -> Result<Self, MatchError> {
        let source = name.into();
        let nodes = if source.contains("{{") {
            Some(parse(&source)?)
        } else {
            None
        };
        Ok(Self { source, nodes })
    }

    /// The name as written in the rule.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the name contains template markup.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.nodes.is_some()
    }

    /// Expand the template with the given context; non-template names
    /// return the source unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::TemplateExec`] on missing keys, non-scalar
    /// field output, or an un-iterable range target.
    pub fn expand(&self, data: &Value) -> Result<String, MatchError> {
        match &self.nodes {
            None => Ok(self.source.clone()),
            Some(nodes) => {
                let mut out = String::new();
                render(nodes, data, &mut out)?;
                Ok(out)
            }
        }
    }
}

fn parse_error(detail: impl Into<String>) -> MatchError {
    MatchError::TemplateParse {
        detail: detail.into(),
    }
}

fn exec_error(detail: impl Into<String>) -> MatchError {
    MatchError::TemplateExec {
        detail: detail.into(),
    }
}

fn parse(source: &str) -> Result<Vec<Node>, MatchError> {
    // Stack of open blocks: the bottom frame is the template body, every
    // further frame is an open range waiting for its {{end}}.
    let mut stack: Vec<(Option<Vec<String>>, Vec<Node>)> = vec![(None, Vec::new())];
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            stack
                .last_mut()
                .expect("stack is never empty")
                .1
                .push(Node::Text(rest[..start].to_owned()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| parse_error("unclosed action: missing \"}}\""))?;
        let action = after[..end].trim();
        rest = &after[end + 2..];

        let mut words = action.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("end"), None, _) => {
                let (header, body) = stack.pop().expect("stack is never empty");
                let Some(path) = header else {
                    return Err(parse_error("unexpected {{end}}"));
                };
                stack
                    .last_mut()
                    .expect("bottom frame remains")
                    .1
                    .push(Node::Range { path, body });
            }
            (Some("range"), Some(arg), None) => {
                let path = parse_field_path(arg)?;
                stack.push((Some(path), Vec::new()));
            }
            (Some("range"), None, _) => {
                return Err(parse_error("range requires an argument"));
            }
            (Some(field), None, _) if field.starts_with('.') => {
                let path = parse_field_path(field)?;
                stack
                    .last_mut()
                    .expect("stack is never empty")
                    .1
                    .push(Node::Field(path));
            }
            _ => {
                return Err(parse_error(format!("unsupported action {action:?}")));
            }
        }
    }

    if !rest.is_empty() {
        stack
            .last_mut()
            .expect("stack is never empty")
            .1
            .push(Node::Text(rest.to_owned()));
    }

    if stack.len() != 1 {
        return Err(parse_error("unclosed {{range}}: missing {{end}}"));
    }
    Ok(stack.pop().expect("bottom frame remains").1)
}

fn parse_field_path(field: &str) -> Result<Vec<String>, MatchError> {
    if field == "." {
        return Ok(Vec::new());
    }
    let Some(chain) = field.strip_prefix('.') else {
        return Err(parse_error(format!("invalid field reference {field:?}")));
    };
    chain
        .split('.')
        .map(|segment| {
            if segment.is_empty() {
                Err(parse_error(format!("invalid field reference {field:?}")))
            } else {
                Ok(segment.to_owned())
            }
        })
        .collect()
}

fn render(nodes: &[Node], dot: &Value, out: &mut String) -> Result<(), MatchError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Field(path) => {
                let value = resolve(dot, path)?;
                write_scalar(value, out)?;
            }
            Node::Range { path, body } => match resolve(dot, path)? {
                Value::Array(items) => {
                    for item in items {
                        render(body, item, out)?;
                    }
                }
                Value::Object(map) => {
                    for value in map.values() {
                        render(body, value, out)?;
                    }
                }
                other => {
                    return Err(exec_error(format!(
                        "range can't iterate over {}",
                        type_name(other)
                    )))
                }
            },
        }
    }
    Ok(())
}

fn resolve<'a>(dot: &'a Value, path: &[String]) -> Result<&'a Value, MatchError> {
    let mut current = dot;
    for segment in path {
        match current {
            Value::Object(map) => {
                current = map.get(segment).ok_or_else(|| {
                    exec_error(format!("map has no entry for key {segment:?}"))
                })?;
            }
            other => {
                return Err(exec_error(format!(
                    "can't evaluate field {segment:?} in {}",
                    type_name(other)
                )))
            }
        }
    }
    Ok(current)
}

fn write_scalar(value: &Value, out: &mut String) -> Result<(), MatchError> {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        other => {
            return Err(exec_error(format!(
                "can't render {} as text",
                type_name(other)
            )))
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expand(template: &str, data: Value) -> Result<String, MatchError> {
        NameTemplate::new(template)?.expand(&data)
    }

    #[test]
    fn plain_names_pass_through() {
        let t = NameTemplate::new("gpu.present").unwrap();
        assert!(!t.is_template());
        assert_eq!(t.expand(&json!({})).unwrap(), "gpu.present");
    }

    #[test]
    fn single_brace_is_not_a_template() {
        let t = NameTemplate::new("odd{name}").unwrap();
        assert!(!t.is_template());
    }

    #[test]
    fn field_chain_lookup() {
        let out = expand(
            "vendor-{{.pci.vendor}}",
            json!({"pci": {"vendor": "10de"}}),
        )
        .unwrap();
        assert_eq!(out, "vendor-10de");
    }

    #[test]
    fn whitespace_inside_action_is_ignored() {
        let out = expand("{{  .a  }}", json!({"a": "x"})).unwrap();
        assert_eq!(out, "x");
    }

    #[test]
    fn range_over_list() {
        let out = expand(
            "{{range .cpu.cpuid}}cpu-{{.Name}}\n{{end}}",
            json!({"cpu": {"cpuid": [{"Name": "AVX2"}, {"Name": "SSE4"}]}}),
        )
        .unwrap();
        assert_eq!(out, "cpu-AVX2\ncpu-SSE4\n");
    }

    #[test]
    fn range_over_map_iterates_values_in_key_order() {
        let out = expand(
            "{{range .m}}{{.}},{{end}}",
            json!({"m": {"b": "2", "a": "1", "c": "3"}}),
        )
        .unwrap();
        assert_eq!(out, "1,2,3,");
    }

    #[test]
    fn nested_ranges() {
        let out = expand(
            "{{range .outer}}[{{range .inner}}{{.}}{{end}}]{{end}}",
            json!({"outer": [{"inner": ["a", "b"]}, {"inner": ["c"]}]}),
        )
        .unwrap();
        assert_eq!(out, "[ab][c]");
    }

    #[test]
    fn numbers_and_bools_render() {
        let out = expand("{{.n}}-{{.b}}", json!({"n": 42, "b": true})).unwrap();
        assert_eq!(out, "42-true");
    }

    #[test]
    fn missing_key_is_an_execution_error() {
        let err = expand("{{.a.missing}}", json!({"a": {}})).unwrap_err();
        assert!(matches!(err, MatchError::TemplateExec { .. }));
    }

    #[test]
    fn field_on_non_map_is_an_execution_error() {
        let err = expand("{{.a.b}}", json!({"a": "scalar"})).unwrap_err();
        assert!(matches!(err, MatchError::TemplateExec { .. }));
    }

    #[test]
    fn range_over_scalar_is_an_execution_error() {
        let err = expand("{{range .a}}x{{end}}", json!({"a": "scalar"})).unwrap_err();
        assert!(matches!(err, MatchError::TemplateExec { .. }));
    }

    #[test]
    fn rendering_a_map_is_an_execution_error() {
        let err = expand("{{.a}}", json!({"a": {"b": 1}})).unwrap_err();
        assert!(matches!(err, MatchError::TemplateExec { .. }));
    }

    #[test]
    fn parse_errors() {
        for bad in [
            "{{.a",                    // unclosed action
            "{{end}}",                 // stray end
            "{{range .a}}no end",      // unclosed range
            "{{if .a}}x{{end}}",       // unsupported action
            "{{range}}{{end}}",        // range without argument
            "{{a.b}}",                 // field without leading dot
            "{{.a..b}}",               // empty path segment
            "{{.a .b}}",               // two arguments
        ] {
            assert!(
                matches!(NameTemplate::new(bad), Err(MatchError::TemplateParse { .. })),
                "{bad:?} should fail to parse"
            );
        }
    }

    #[test]
    fn empty_range_produces_nothing() {
        let out = expand("a{{range .l}}x{{end}}b", json!({"l": []})).unwrap();
        assert_eq!(out, "ab");
    }
}
