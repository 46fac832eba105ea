//! Realized environment: what was actually provisioned and created.
//!
//! The [`Environment`] aggregate grows during setup (images first, then one
//! resource at a time) and is read-only once handed to the test runner.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::spec::ImageAction;

/// Facts about the machine running Galley.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Address containers can use to reach services published on the host.
    pub ip: String,
}

impl Host {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

/// A provisioned image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub action: ImageAction,
    pub source: String,
    pub name: String,
    pub persist: bool,

    /// Runtime identifier: the registry reference for pulls, the build
    /// result identifier for builds.
    pub image: String,
}

/// A created resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResource {
    /// Runtime image identifier the container was created from.
    pub image: String,

    pub cont_port: Option<u16>,
    pub host_port: Option<u16>,
    pub cont_volume: Option<String>,

    /// Absolute host path.
    pub host_volume: Option<PathBuf>,

    pub command: Option<Vec<String>>,
    pub environment: IndexMap<String, String>,

    /// Runtime container identifier; empty until the container is created.
    pub container: String,
}

impl ResolvedResource {
    /// Port binding `(container, host)`, present only when both sides are.
    pub fn port_binding(&self) -> Option<(u16, u16)> {
        self.cont_port.zip(self.host_port)
    }

    /// Volume bind `(host, container)`, present only when both sides are.
    pub fn volume_bind(&self) -> Option<(PathBuf, String)> {
        self.host_volume.clone().zip(self.cont_volume.clone())
    }
}

/// The Environment Aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub host: Host,
    pub images: IndexMap<String, ResolvedImage>,
    pub resources: IndexMap<String, ResolvedResource>,
    pub testparams: IndexMap<String, String>,
}

impl Environment {
    /// Empty aggregate for a run on `host`.
    pub fn new(host: Host, testparams: IndexMap<String, String>) -> Self {
        Self {
            host,
            images: IndexMap::new(),
            resources: IndexMap::new(),
            testparams,
        }
    }

    /// Resource by logical name.
    pub fn resource(&self, name: &str) -> Option<&ResolvedResource> {
        self.resources.get(name)
    }

    /// Container identifiers of every created resource, in creation order.
    pub fn containers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.resources
            .iter()
            .filter(|(_, r)| !r.container.is_empty())
            .map(|(name, r)| (name.as_str(), r.container.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> ResolvedResource {
        ResolvedResource {
            image: "repo/img".to_string(),
            cont_port: Some(80),
            host_port: None,
            cont_volume: None,
            host_volume: Some(PathBuf::from("/srv/data")),
            command: None,
            environment: IndexMap::new(),
            container: "abc".to_string(),
        }
    }

    #[test]
    fn test_half_bindings_are_noops() {
        let r = resource();
        assert_eq!(r.port_binding(), None);
        assert_eq!(r.volume_bind(), None);
    }

    #[test]
    fn test_full_bindings() {
        let mut r = resource();
        r.host_port = Some(49153);
        r.cont_volume = Some("/data".to_string());
        assert_eq!(r.port_binding(), Some((80, 49153)));
        assert_eq!(
            r.volume_bind(),
            Some((PathBuf::from("/srv/data"), "/data".to_string()))
        );
    }

    #[test]
    fn test_containers_skips_uncreated() {
        let mut env = Environment::new(Host::new("10.0.0.1"), IndexMap::new());
        env.resources.insert("db".to_string(), resource());
        let mut pending = resource();
        pending.container = String::new();
        env.resources.insert("app".to_string(), pending);

        let containers: Vec<_> = env.containers().collect();
        assert_eq!(containers, vec![("db", "abc")]);
    }

    #[test]
    fn test_environment_json_shape() {
        let mut env = Environment::new(Host::new("10.0.0.1"), IndexMap::new());
        env.resources.insert("db".to_string(), resource());
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["host"]["ip"], "10.0.0.1");
        assert_eq!(value["resources"]["db"]["container"], "abc");
        assert_eq!(value["resources"]["db"]["cont_port"], 80);
    }
}
