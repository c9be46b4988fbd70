//! Parameter Rendering
//!
//! Every operation parameter arrives as a [`Property`]: either a literal value or a
//! template string that must be resolved before a request can be built.
//!
//! # Template Syntax
//! Templates embed `{{ expression }}` blocks. Supported expressions:
//! - `inputs.NAME`, `vars.NAME`, or a bare `NAME` - caller-supplied variables
//! - `env.NAME` - process environment
//! - `secret('NAME')` - process environment (secret injection by the host)
//!
//! # Coercion
//! Rendered text is coerced into the declared type through [`Renderable`].
//! A failed coercion or an unknown variable is a `ValidationError` naming the field.
//! A template that renders to blank text counts as absent, so declared defaults apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MilvusError, Result};

/// A raw operation parameter: literal value or deferred template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property<T> {
    /// Literal value (string leaves are still template-expanded)
    Value(T),
    /// Template text, rendered then coerced to `T`
    Template(String),
}

impl<T> Property<T> {
    /// Create a literal property
    pub fn value(value: impl Into<T>) -> Self {
        Self::Value(value.into())
    }

    /// Create a template property
    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }
}

impl<T: Default> Default for Property<T> {
    fn default() -> Self {
        Self::Value(T::default())
    }
}

impl From<&str> for Property<String> {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for Property<String> {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl<T: Renderable> Property<T> {
    /// Render into a concrete value; `None` when the result is blank
    pub fn render(&self, ctx: &RenderContext, field: &str) -> Result<Option<T>> {
        match self {
            Self::Value(value) => {
                let rendered = value.render_value(ctx).map_err(|message| MilvusError::validation(field, message))?;
                Ok((!rendered.is_blank()).then_some(rendered))
            }
            Self::Template(template) => {
                let rendered =
                    ctx.render_str(template).map_err(|message| MilvusError::validation(field, message))?;
                if rendered.trim().is_empty() {
                    return Ok(None);
                }
                T::parse_rendered(&rendered)
                    .map(Some)
                    .map_err(|message| MilvusError::validation(field, message))
            }
        }
    }
}

/// Render an optional property; absent stays absent
pub fn render_opt<T: Renderable>(
    property: Option<&Property<T>>,
    ctx: &RenderContext,
    field: &str,
) -> Result<Option<T>> {
    match property {
        Some(property) => property.render(ctx, field),
        None => Ok(None),
    }
}

/// Render an optional property, substituting `default` when absent
pub fn render_or<T: Renderable>(
    property: Option<&Property<T>>,
    ctx: &RenderContext,
    field: &str,
    default: T,
) -> Result<T> {
    Ok(render_opt(property, ctx, field)?.unwrap_or(default))
}

/// Render an optional property, substituting `T::default()` when absent
///
/// Used for property maps and key lists so request builders always get an instance.
pub fn render_or_empty<T: Renderable + Default>(
    property: Option<&Property<T>>,
    ctx: &RenderContext,
    field: &str,
) -> Result<T> {
    render_or(property, ctx, field, T::default())
}

/// Render a required string; blank or absent is a validation error
pub fn render_required(property: &Property<String>, ctx: &RenderContext, field: &str) -> Result<String> {
    match property.render(ctx, field)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MilvusError::validation(field, "must not be blank")),
    }
}

/// Variables and lookups available to templates
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    vars: BTreeMap<String, String>,
    env_lookup: bool,
}

impl RenderContext {
    /// Create an empty context (no variables, no environment access)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that can also resolve `env.*` and `secret(...)` from the process environment
    #[must_use]
    pub fn with_env() -> Self {
        Self { vars: BTreeMap::new(), env_lookup: true }
    }

    /// Add a caller variable
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Add several caller variables
    #[must_use]
    pub fn vars(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.vars.extend(vars);
        self
    }

    /// Expand every `{{ ... }}` block in `template`
    pub fn render_str(&self, template: &str) -> std::result::Result<String, String> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or_else(|| format!("unclosed template expression in '{template}'"))?;
            output.push_str(&self.resolve(after_open[..end].trim())?);
            rest = &after_open[end + 2..];
        }
        output.push_str(rest);

        Ok(output)
    }

    fn resolve(&self, expression: &str) -> std::result::Result<String, String> {
        if expression.is_empty() {
            return Err("empty template expression".to_string());
        }

        if let Some(name) = expression.strip_prefix("env.") {
            return self.lookup_env(name);
        }

        if let Some(inner) = expression.strip_prefix("secret(").and_then(|e| e.strip_suffix(')')) {
            let name = inner.trim().trim_matches(|c| c == '\'' || c == '"');
            return self.lookup_env(name);
        }

        let name = expression
            .strip_prefix("inputs.")
            .or_else(|| expression.strip_prefix("vars."))
            .unwrap_or(expression);

        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| format!("unknown template variable '{name}'"))
    }

    fn lookup_env(&self, name: &str) -> std::result::Result<String, String> {
        if !self.env_lookup {
            return Err(format!("environment lookup is disabled, cannot resolve '{name}'"));
        }
        std::env::var(name).map_err(|_| format!("environment variable '{name}' is not set"))
    }
}

/// A type a [`Property`] can render into
pub trait Renderable: Sized {
    /// Expand templates nested inside an already-typed literal
    fn render_value(&self, ctx: &RenderContext) -> std::result::Result<Self, String>;

    /// Coerce rendered template text into this type
    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String>;

    /// Whether a rendered literal counts as absent
    fn is_blank(&self) -> bool {
        false
    }
}

impl Renderable for String {
    fn render_value(&self, ctx: &RenderContext) -> std::result::Result<Self, String> {
        ctx.render_str(self)
    }

    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
        Ok(rendered.to_string())
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Renderable for bool {
    fn render_value(&self, _ctx: &RenderContext) -> std::result::Result<Self, String> {
        Ok(*self)
    }

    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
        match rendered.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("expected a boolean, got '{other}'")),
        }
    }
}

macro_rules! renderable_integer {
    ($($ty:ty),*) => {
        $(
            impl Renderable for $ty {
                fn render_value(&self, _ctx: &RenderContext) -> std::result::Result<Self, String> {
                    Ok(*self)
                }

                fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
                    rendered
                        .trim()
                        .parse()
                        .map_err(|_| format!("expected an integer, got '{}'", rendered.trim()))
                }
            }
        )*
    };
}

renderable_integer!(u32, u64, i64);

impl Renderable for Vec<String> {
    fn render_value(&self, ctx: &RenderContext) -> std::result::Result<Self, String> {
        self.iter().map(|item| ctx.render_str(item)).collect()
    }

    /// Accepts a JSON array (`["a", "b"]`) or a comma-separated list (`a, b`)
    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
        let trimmed = rendered.trim();
        if trimmed.starts_with('[') {
            let items: Vec<serde_json::Value> = serde_json::from_str(trimmed)
                .map_err(|e| format!("expected a JSON array of strings: {e}"))?;
            return Ok(items.into_iter().map(stringify).collect());
        }

        Ok(trimmed
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

impl Renderable for BTreeMap<String, String> {
    fn render_value(&self, ctx: &RenderContext) -> std::result::Result<Self, String> {
        self.iter()
            .map(|(key, value)| Ok((ctx.render_str(key)?, ctx.render_str(value)?)))
            .collect()
    }

    /// Accepts a JSON object; non-string values are kept in their JSON text form
    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_str(rendered.trim())
            .map_err(|e| format!("expected a JSON object of string values: {e}"))?;
        Ok(map.into_iter().map(|(key, value)| (key, stringify(value))).collect())
    }
}

impl Renderable for serde_json::Value {
    fn render_value(&self, ctx: &RenderContext) -> std::result::Result<Self, String> {
        Ok(match self {
            Self::String(s) => Self::String(ctx.render_str(s)?),
            Self::Array(items) => {
                Self::Array(items.iter().map(|item| item.render_value(ctx)).collect::<std::result::Result<_, _>>()?)
            }
            Self::Object(map) => Self::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), value.render_value(ctx)?)))
                    .collect::<std::result::Result<_, String>>()?,
            ),
            other => other.clone(),
        })
    }

    fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(rendered.trim()).map_err(|e| format!("expected a JSON document: {e}"))
    }
}

/// Implement [`Renderable`] for closed enumerations parsed via `FromStr`
macro_rules! renderable_enum {
    ($($ty:ty),*) => {
        $(
            impl $crate::render::Renderable for $ty {
                fn render_value(
                    &self,
                    _ctx: &$crate::render::RenderContext,
                ) -> std::result::Result<Self, String> {
                    Ok(*self)
                }

                fn parse_rendered(rendered: &str) -> std::result::Result<Self, String> {
                    rendered.trim().parse()
                }
            }
        )*
    };
}

pub(crate) use renderable_enum;

/// Property maps carry strings; JSON scalars keep their literal text
fn stringify(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
