//! Template expansion for Statecraft.
//!
//! This module provides:
//! - [`TemplateEngine`]: Jinja2-style rendering via minijinja, scoped to the
//!   three capabilities the execution engine needs — render a template string
//!   against a [`Scope`], evaluate a single expression to a typed value, and
//!   evaluate a conditional.
//! - [`DynamicValue`]: the tagged representation of "string-or-typed" task
//!   fields such as `loop`, which may hold a template string before expansion
//!   and a typed value after it.
//! - [`Templatable`] / [`FieldMut`]: the typed field-walk contract every task
//!   content type implements so [`expand`] can rewrite its templatable fields
//!   in place without runtime introspection.
//!
//! Rendering is pure with respect to the scope: a scope is never mutated by
//! expansion, and rendering the same template against the same scope is
//! deterministic.

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::scope::{Scope, Value};

/// Check whether a string contains template syntax worth rendering.
pub fn has_expression(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// If `s` is exactly one `{{ ... }}` expression (ignoring surrounding
/// whitespace), return the inner expression text.
fn as_single_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") || inner.contains("{%") {
        return None;
    }
    Some(inner.trim())
}

/// Jinja2-compatible template engine.
///
/// Wraps a configured minijinja [`Environment`]. Undefined variables are
/// strict errors: any expression that references an unknown variable fails
/// rendering rather than silently producing an empty string.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new engine with Ansible-compatible settings and filters.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        // Ansible-compatible truthiness coercion
        env.add_filter("bool", |value: minijinja::Value| -> bool {
            match value.as_str() {
                Some("true") | Some("yes") | Some("on") | Some("1") => true,
                Some(_) => false,
                None => {
                    if let Ok(b) = bool::try_from(value.clone()) {
                        b
                    } else if let Ok(n) = i64::try_from(value) {
                        n != 0
                    } else {
                        false
                    }
                }
            }
        });

        env.add_filter(
            "mandatory",
            |value: minijinja::Value| -> std::result::Result<minijinja::Value, minijinja::Error> {
                if value.is_undefined() {
                    Err(minijinja::Error::new(
                        minijinja::ErrorKind::UndefinedError,
                        "mandatory variable not defined",
                    ))
                } else {
                    Ok(value)
                }
            },
        );

        Self { env }
    }

    /// Render a template string against a scope, producing a string.
    pub fn render_str(&self, template: &str, scope: &Scope) -> Result<String> {
        let rendered = self.env.render_str(template, scope_context(scope))?;
        Ok(rendered)
    }

    /// Evaluate an expression against a scope, producing a typed value.
    ///
    /// Unlike [`render_str`](Self::render_str) this does not stringify: an
    /// expression that evaluates to a list yields a sequence value.
    pub fn eval_expression(&self, expr: &str, scope: &Scope) -> Result<Value> {
        let compiled = self.env.compile_expression(expr)?;
        let result = compiled.eval(scope_context(scope))?;
        Ok(serde_yaml::to_value(result)?)
    }

    /// Render a template string, preserving the type of a lone expression.
    ///
    /// `"{{ items }}"` with `items` bound to a list yields the list itself;
    /// `"port {{ p }}"` always yields a string.
    pub fn render_value(&self, template: &str, scope: &Scope) -> Result<Value> {
        if let Some(expr) = as_single_expression(template) {
            self.eval_expression(expr, scope)
        } else {
            Ok(Value::String(self.render_str(template, scope)?))
        }
    }

    /// Recursively render every embedded template in a YAML value.
    ///
    /// Strings that hold a single expression keep the expression's type;
    /// sequences and mappings are walked elementwise.
    pub fn render_yaml(&self, value: &Value, scope: &Scope) -> Result<Value> {
        match value {
            Value::String(s) if has_expression(s) => self.render_value(s, scope),
            Value::Sequence(seq) => {
                let rendered: Result<Vec<_>> =
                    seq.iter().map(|v| self.render_yaml(v, scope)).collect();
                Ok(Value::Sequence(rendered?))
            }
            Value::Mapping(map) => {
                let mut rendered = serde_yaml::Mapping::new();
                for (k, v) in map {
                    rendered.insert(self.render_yaml(k, scope)?, self.render_yaml(v, scope)?);
                }
                Ok(Value::Mapping(rendered))
            }
            other => Ok(other.clone()),
        }
    }

    /// Evaluate a `when` condition against a scope.
    ///
    /// An empty or absent condition is always true. Otherwise the expression
    /// is rendered as `{{ expr }}` and the resulting string interpreted:
    /// `"true"`/`"True"` is true, `"false"`/`"False"` is false, any other
    /// value is parsed as an integer (non-zero true, zero false), and
    /// anything else is false. This deliberately simplified truthiness model
    /// does not cover the full Jinja2 conditional surface.
    pub fn evaluate_condition(&self, condition: &str, scope: &Scope) -> Result<bool> {
        let condition = condition.trim();
        if condition.is_empty() {
            return Ok(true);
        }
        let template = if condition.contains("{{") {
            condition.to_string()
        } else {
            format!("{{{{ {} }}}}", condition)
        };
        let rendered = self.render_str(&template, scope)?;
        Ok(interpret_truthiness(rendered.trim()))
    }
}

/// Interpret a rendered condition string as a boolean.
fn interpret_truthiness(s: &str) -> bool {
    match s {
        "true" | "True" => true,
        "false" | "False" => false,
        other => other.parse::<i64>().map(|n| n != 0).unwrap_or(false),
    }
}

/// Convert a scope into a minijinja context value.
fn scope_context(scope: &Scope) -> minijinja::Value {
    minijinja::Value::from_iter(
        scope
            .iter()
            .map(|(k, v)| (k.clone(), yaml_to_template_value(v))),
    )
}

/// Convert a YAML value to a minijinja value.
fn yaml_to_template_value(yaml: &Value) -> minijinja::Value {
    match yaml {
        Value::Null => minijinja::Value::from(()),
        Value::Bool(b) => minijinja::Value::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                minijinja::Value::from(i)
            } else if let Some(f) = n.as_f64() {
                minijinja::Value::from(f)
            } else {
                minijinja::Value::from(0)
            }
        }
        Value::String(s) => minijinja::Value::from(s.as_str()),
        Value::Sequence(seq) => minijinja::Value::from(
            seq.iter()
                .map(yaml_to_template_value)
                .collect::<Vec<minijinja::Value>>(),
        ),
        Value::Mapping(map) => minijinja::Value::from_iter(map.iter().filter_map(|(k, v)| {
            k.as_str()
                .map(|key| (key.to_string(), yaml_to_template_value(v)))
        })),
        Value::Tagged(tagged) => yaml_to_template_value(&tagged.value),
    }
}

// ============================================================================
// Dynamic values
// ============================================================================

/// A task field that may hold either a template string or an already-typed
/// value.
///
/// Fields like `loop` accept a literal list, a template string that expands
/// to a list, or nothing at all. Expansion converts the `Template` state into
/// `Scalar` or `List`; the engine only ever consumes the rendered states.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DynamicValue {
    /// No value was provided.
    #[default]
    Unset,
    /// An unrendered template string.
    Template(String),
    /// A rendered (or literal) scalar value.
    Scalar(Value),
    /// A rendered (or literal) sequence of values.
    List(Vec<Value>),
}

impl DynamicValue {
    /// Build a dynamic value from a decoded YAML value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => DynamicValue::Unset,
            Value::String(s) => DynamicValue::Template(s),
            Value::Sequence(seq) => DynamicValue::List(seq),
            other => DynamicValue::Scalar(other),
        }
    }

    /// True unless the value is [`DynamicValue::Unset`].
    pub fn is_set(&self) -> bool {
        !matches!(self, DynamicValue::Unset)
    }

    /// Render this value in place against a scope.
    ///
    /// A template string holding a lone expression takes that expression's
    /// type; list elements are rendered independently.
    pub fn render(&mut self, engine: &TemplateEngine, scope: &Scope) -> Result<()> {
        match std::mem::take(self) {
            DynamicValue::Unset => {}
            DynamicValue::Template(s) => {
                if has_expression(&s) {
                    *self = match engine.render_value(&s, scope)? {
                        Value::Sequence(seq) => DynamicValue::List(seq),
                        other => DynamicValue::Scalar(other),
                    };
                } else {
                    *self = DynamicValue::Scalar(Value::String(s));
                }
            }
            DynamicValue::Scalar(v) => {
                *self = match engine.render_yaml(&v, scope)? {
                    Value::Sequence(seq) => DynamicValue::List(seq),
                    other => DynamicValue::Scalar(other),
                };
            }
            DynamicValue::List(items) => {
                let rendered: Result<Vec<_>> =
                    items.iter().map(|v| engine.render_yaml(v, scope)).collect();
                *self = DynamicValue::List(rendered?);
            }
        }
        Ok(())
    }

    /// Consume the rendered value as an ordered item sequence, if list-shaped.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            DynamicValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short description of the value's shape, for error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            DynamicValue::Unset => "nothing",
            DynamicValue::Template(_) => "an unrendered template",
            DynamicValue::Scalar(_) => "a scalar",
            DynamicValue::List(_) => "a list",
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(DynamicValue::from_value(value))
    }
}

// ============================================================================
// Typed field walk
// ============================================================================

/// A mutable view of one templatable field of a task content value.
pub enum FieldMut<'a> {
    /// A plain string field, rendered as text.
    Scalar(&'a mut String),
    /// An optional string field, rendered when present.
    OptScalar(&'a mut Option<String>),
    /// A list of strings, each element rendered independently.
    ScalarList(&'a mut Vec<String>),
    /// A dynamic string-or-typed field, rendered via [`DynamicValue::render`].
    Dynamic(&'a mut DynamicValue),
    /// A nested content value, walked recursively.
    Nested(&'a mut dyn Templatable),
}

/// The typed enumeration of templatable fields a content type exposes.
///
/// Implementors list every field whose value may contain template
/// expressions. Fields not listed are never rendered; this is how fields
/// that carry raw expressions (for example `debug.var`) opt out of string
/// interpolation.
pub trait Templatable {
    /// Mutable views of all templatable fields, in declaration order.
    fn template_fields(&mut self) -> Vec<FieldMut<'_>>;
}

/// Expand every templatable field of `target` in place against `scope`.
///
/// Empty strings are skipped. The first failing field aborts expansion;
/// fields processed before the error may already be rendered.
pub fn expand<T: Templatable + ?Sized>(
    target: &mut T,
    engine: &TemplateEngine,
    scope: &Scope,
) -> Result<()> {
    for field in target.template_fields() {
        match field {
            FieldMut::Scalar(s) => {
                if !s.is_empty() && has_expression(s) {
                    *s = engine.render_str(s, scope)?;
                }
            }
            FieldMut::OptScalar(opt) => {
                if let Some(s) = opt {
                    if !s.is_empty() && has_expression(s) {
                        *s = engine.render_str(s, scope)?;
                    }
                }
            }
            FieldMut::ScalarList(list) => {
                for s in list.iter_mut() {
                    if !s.is_empty() && has_expression(s) {
                        *s = engine.render_str(s, scope)?;
                    }
                }
            }
            FieldMut::Dynamic(dynamic) => dynamic.render(engine, scope)?,
            FieldMut::Nested(nested) => expand(nested, engine, scope)?,
        }
    }
    Ok(())
}
