//! Declarative environment description, as written in `.galley.yml`.
//!
//! These types are never mutated after loading. Resolution produces the
//! separate realized types in [`crate::domain::resolved`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::path::Path;

use super::error::Result;

/// Root of the environment description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Images to provision, in declaration order.
    pub images: IndexMap<String, ImageSpec>,

    /// Resources (containers) to create, in declaration and dependency order.
    pub resources: IndexMap<String, ResourceSpec>,

    /// Free-form parameters passed through to the test suite.
    #[serde(default)]
    pub testparams: IndexMap<String, Scalar>,
}

impl Spec {
    /// Parse a spec from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a spec from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// SHA-256 digest of the canonical JSON form of the spec.
    ///
    /// Declaration order is part of the digest.
    pub fn digest(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Names of the declared resources, in declaration order.
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

/// How an image is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageAction {
    /// Fetch `source` from a registry.
    Pull,
    /// Build the context directory at `source`, tagged with `name`.
    Build,
}

impl ImageAction {
    pub fn name(&self) -> &'static str {
        match self {
            ImageAction::Pull => "pull",
            ImageAction::Build => "build",
        }
    }
}

/// A declared image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub action: ImageAction,

    /// Registry reference (pull) or build-context path (build).
    pub source: String,

    /// Logical name; resources reference the image by this name and builds
    /// are tagged with it.
    pub name: String,

    /// Keep the image after cleanup. Absent and `false` both mean "remove".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
}

impl ImageSpec {
    /// Whether the image survives cleanup.
    pub fn persists(&self) -> bool {
        self.persist == Some(true)
    }
}

/// A declared resource (container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Reference to an [`ImageSpec::name`], usually written `{{name}}`.
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cont_port: Option<Scalar>,

    /// Host side of the port binding; may be `{{random_port}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cont_volume: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_volume: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,

    /// Container environment; values may reference earlier resources
    /// and the host.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, Scalar>,
}

/// Container command, either a single string or an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Argument vector for the runtime. A command line is split on whitespace.
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandSpec::Argv(argv) => argv.clone(),
        }
    }

    /// Apply `f` to every string in the command.
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&str) -> std::result::Result<String, E>,
    ) -> std::result::Result<Self, E> {
        Ok(match self {
            CommandSpec::Line(line) => CommandSpec::Line(f(line)?),
            CommandSpec::Argv(argv) => CommandSpec::Argv(
                argv.iter()
                    .map(|arg| f(arg))
                    .collect::<std::result::Result<_, _>>()?,
            ),
        })
    }

    /// All strings in the command.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            CommandSpec::Line(line) => vec![line.as_str()],
            CommandSpec::Argv(argv) => argv.iter().map(String::as_str).collect(),
        }
    }
}

/// A YAML scalar kept in its textual form.
///
/// `80`, `"80"`, `true` and `"{{random_port}}"` are all accepted; the value
/// is stored as the string the template resolver operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scalar(pub String);

impl Scalar {
    pub fn new(value: impl Into<String>) -> Self {
        Scalar(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
            Float(f64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Scalar(b.to_string()),
            Raw::Int(i) => Scalar(i.to_string()),
            Raw::Float(f) => Scalar(f.to_string()),
            Raw::Str(s) => Scalar(s),
        })
    }
}
