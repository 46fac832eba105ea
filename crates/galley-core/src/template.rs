//! Placeholder parsing and substitution.
//!
//! A placeholder is `{{ path }}` where `path` is one or more dotted segments
//! of `[A-Za-z0-9_-]`. The first segment selects the namespace:
//!
//! | expression             | namespace                     |
//! |------------------------|-------------------------------|
//! | `{{environ.NAME}}`     | process environment variables |
//! | `{{random_port}}`      | freshly allocated host port   |
//! | `{{resources.db.x}}`   | earlier resources             |
//! | `{{host.ip}}`          | host facts                    |
//! | `{{web}}`              | bare image-name reference     |
//!
//! There is no expression evaluation: paths are looked up, nothing else.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use crate::domain::error::ConfigError;

/// Upper bound on substitution passes over a single value.
pub const MAX_PASSES: usize = 8;

/// A placeholder namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Environ,
    RandomPort,
    Resources,
    Host,
}

impl Namespace {
    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Environ => "environ",
            Namespace::RandomPort => "random_port",
            Namespace::Resources => "resources",
            Namespace::Host => "host",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "environ" => Some(Namespace::Environ),
            "random_port" => Some(Namespace::RandomPort),
            "resources" => Some(Namespace::Resources),
            "host" => Some(Namespace::Host),
            _ => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed placeholder body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Known namespace plus the remaining path segments.
    Path {
        namespace: Namespace,
        path: Vec<String>,
    },
    /// First segment is not a namespace, e.g. an image name.
    Bare(Vec<String>),
}

impl Expr {
    pub fn namespace(&self) -> Option<Namespace> {
        match self {
            Expr::Path { namespace, .. } => Some(*namespace),
            Expr::Bare(_) => None,
        }
    }
}

/// One `{{ ... }}` occurrence inside a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// The full text including braces.
    pub raw: String,
    /// Byte range of `raw` within the scanned value.
    pub range: Range<usize>,
    pub expr: Expr,
}

impl Placeholder {
    /// Path below the namespace (empty for `random_port`).
    pub fn path(&self) -> &[String] {
        match &self.expr {
            Expr::Path { path, .. } => path,
            Expr::Bare(segments) => segments,
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("path pattern is valid")
    })
}

/// Parse the body of a placeholder (the text between the braces).
pub fn parse_expr(raw: &str, body: &str) -> Result<Expr, ConfigError> {
    let body = body.trim();
    if !path_regex().is_match(body) {
        return Err(ConfigError::MalformedPlaceholder {
            expr: raw.to_string(),
            reason: "expected a dotted path of [A-Za-z0-9_-] segments".to_string(),
        });
    }

    let mut segments: Vec<String> = body.split('.').map(str::to_string).collect();
    let Some(namespace) = Namespace::from_segment(&segments[0]) else {
        return Ok(Expr::Bare(segments));
    };
    let path = segments.split_off(1);

    match namespace {
        Namespace::RandomPort if !path.is_empty() => Err(ConfigError::MalformedPlaceholder {
            expr: raw.to_string(),
            reason: "random_port takes no path".to_string(),
        }),
        Namespace::Environ | Namespace::Resources | Namespace::Host if path.is_empty() => {
            Err(ConfigError::MalformedPlaceholder {
                expr: raw.to_string(),
                reason: format!("{} requires a path", namespace),
            })
        }
        _ => Ok(Expr::Path { namespace, path }),
    }
}

/// Find every placeholder in `value`, in order of appearance.
pub fn placeholders(value: &str) -> Result<Vec<Placeholder>, ConfigError> {
    placeholder_regex()
        .captures_iter(value)
        .map(|caps| {
            let whole = caps.get(0).expect("capture 0 is always present");
            let body = caps.get(1).map_or("", |m| m.as_str());
            Ok(Placeholder {
                raw: whole.as_str().to_string(),
                range: whole.range(),
                expr: parse_expr(whole.as_str(), body)?,
            })
        })
        .collect()
}

/// Whether `value` contains any placeholder at all.
pub fn has_placeholders(value: &str) -> bool {
    placeholder_regex().is_match(value)
}

/// Replace every placeholder of `namespace` in `value` using `resolve`.
///
/// `resolve` receives each placeholder and returns its replacement text.
/// Placeholders of other namespaces are left untouched. Substitution is
/// repeated while replacements introduce new placeholders of the same
/// namespace, up to [`MAX_PASSES`]. A value without matching placeholders
/// is returned unchanged.
pub fn substitute<E, F>(value: &str, namespace: Namespace, mut resolve: F) -> Result<String, E>
where
    E: From<ConfigError>,
    F: FnMut(&Placeholder) -> Result<String, E>,
{
    let mut current = value.to_string();

    for _ in 0..MAX_PASSES {
        let matching: Vec<Placeholder> = placeholders(&current)?
            .into_iter()
            .filter(|p| p.expr.namespace() == Some(namespace))
            .collect();
        if matching.is_empty() {
            return Ok(current);
        }

        let mut next = String::with_capacity(current.len());
        let mut cursor = 0;
        for placeholder in &matching {
            next.push_str(&current[cursor..placeholder.range.start]);
            next.push_str(&resolve(placeholder)?);
            cursor = placeholder.range.end;
        }
        next.push_str(&current[cursor..]);
        current = next;
    }

    if placeholders(&current)?
        .iter()
        .any(|p| p.expr.namespace() == Some(namespace))
    {
        return Err(ConfigError::TooManyPasses {
            value: value.to_string(),
            limit: MAX_PASSES,
        }
        .into());
    }
    Ok(current)
}

/// Source of `environ.*` values.
pub trait EnvironSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnviron;

impl EnvironSource for ProcessEnviron {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvironSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Resolve the `environ` namespace in `value`.
pub fn resolve_environ(value: &str, environ: &dyn EnvironSource) -> Result<String, ConfigError> {
    substitute(value, Namespace::Environ, |placeholder| {
        let name = placeholder.path().join(".");
        environ
            .var(&name)
            .ok_or(ConfigError::MissingEnvironmentVariable { name })
    })
}

/// Walk `path` through nested objects of `root`.
///
/// Returns `Unresolved` when a segment is missing or the target is null.
pub fn lookup_path<'a>(root: &'a Value, path: &[String], expr: &str) -> Result<&'a Value, ConfigError> {
    let mut node = root;
    for segment in path {
        node = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| ConfigError::Unresolved {
            expr: expr.to_string(),
            reason: format!("no attribute `{}`", segment),
        })?;
    }
    if node.is_null() {
        return Err(ConfigError::Unresolved {
            expr: expr.to_string(),
            reason: "value is not set".to_string(),
        });
    }
    Ok(node)
}

/// Stringify a looked-up value for substitution.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Logical image name referenced by a resource's `image` field.
///
/// Braces are stripped, so `{{web}}`, `{{ web }}` and `web` all name `web`.
pub fn image_reference_name(reference: &str) -> String {
    reference.replace("{{", "").replace("}}", "").trim().to_string()
}
