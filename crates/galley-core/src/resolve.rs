//! Spec-level resolution: each step takes the immutable [`Spec`] (or one of
//! its resources) and produces new values without touching its inputs.
//!
//! Order within a run:
//! 1. [`resolve_environ`] over the whole spec
//! 2. [`validate`] the result, before any runtime call
//! 3. [`resolve_resource`] per resource, against the aggregate built so far

use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::domain::error::{ConfigError, GalleyError, Result};
use crate::domain::resolved::{Environment, ResolvedImage, ResolvedResource};
use crate::domain::spec::{ImageSpec, ResourceSpec, Scalar, Spec};
use crate::ports::PortAllocator;
use crate::template::{self, EnvironSource, Expr, Namespace, Placeholder};

/// Substitute `{{environ.*}}` in every scalar of the spec.
pub fn resolve_environ(spec: &Spec, environ: &dyn EnvironSource) -> Result<Spec> {
    let text = |value: &str| template::resolve_environ(value, environ);
    let scalar = |value: &Scalar| text(value.as_str()).map(Scalar::from);

    let images: IndexMap<String, ImageSpec> = spec
        .images
        .iter()
        .map(|(key, image)| {
            Ok((
                key.clone(),
                ImageSpec {
                    action: image.action,
                    source: text(&image.source)?,
                    name: text(&image.name)?,
                    persist: image.persist,
                },
            ))
        })
        .collect::<std::result::Result<_, ConfigError>>()?;

    let resources: IndexMap<String, ResourceSpec> = spec
        .resources
        .iter()
        .map(|(key, resource)| {
            Ok((
                key.clone(),
                ResourceSpec {
                    image: text(&resource.image)?,
                    cont_port: resource.cont_port.as_ref().map(scalar).transpose()?,
                    host_port: resource.host_port.as_ref().map(scalar).transpose()?,
                    cont_volume: resource.cont_volume.as_deref().map(text).transpose()?,
                    host_volume: resource.host_volume.as_deref().map(text).transpose()?,
                    command: resource
                        .command
                        .as_ref()
                        .map(|c| c.try_map(text))
                        .transpose()?,
                    environment: resource
                        .environment
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), scalar(v)?)))
                        .collect::<std::result::Result<IndexMap<_, _>, ConfigError>>()?,
                },
            ))
        })
        .collect::<std::result::Result<_, ConfigError>>()?;

    let testparams: IndexMap<String, Scalar> = spec
        .testparams
        .iter()
        .map(|(k, v)| Ok((k.clone(), scalar(v)?)))
        .collect::<std::result::Result<_, ConfigError>>()?;

    Ok(Spec {
        images,
        resources,
        testparams,
    })
}

/// Check an environ-resolved spec for every configuration error that can be
/// detected without a runtime.
pub fn validate(spec: &Spec) -> Result<()> {
    for (key, image) in &spec.images {
        forbid_placeholders(&image.source, &format!("images.{}.source", key))?;
        forbid_placeholders(&image.name, &format!("images.{}.name", key))?;
    }
    for (key, value) in &spec.testparams {
        forbid_placeholders(value.as_str(), &format!("testparams.{}", key))?;
    }

    let declared = spec.resource_names();
    for (index, (name, resource)) in spec.resources.iter().enumerate() {
        spec_image_for(name, &resource.image, &spec.images)?;

        if let Some(port) = &resource.cont_port {
            forbid_placeholders(port.as_str(), &format!("resources.{}.cont_port", name))?;
            parse_port(name, "cont_port", port.as_str())?;
        }
        if let Some(port) = &resource.host_port {
            let sample: std::result::Result<String, ConfigError> =
                template::substitute(port.as_str(), Namespace::RandomPort, |_| {
                    Ok("1".to_string())
                });
            let sample = sample?;
            forbid_placeholders(&sample, &format!("resources.{}.host_port", name))?;
            parse_port(name, "host_port", &sample)?;
        }
        if let Some(volume) = &resource.cont_volume {
            forbid_placeholders(volume, &format!("resources.{}.cont_volume", name))?;
        }
        if let Some(volume) = &resource.host_volume {
            forbid_placeholders(volume, &format!("resources.{}.host_volume", name))?;
        }
        if let Some(command) = &resource.command {
            for part in command.parts() {
                forbid_placeholders(part, &format!("resources.{}.command", name))?;
            }
        }

        for (var, value) in &resource.environment {
            let field = format!("resources.{}.environment.{}", name, var);
            for placeholder in template::placeholders(value.as_str())? {
                match &placeholder.expr {
                    Expr::Path {
                        namespace: Namespace::Resources,
                        path,
                    } => {
                        let referenced = path[0].as_str();
                        if referenced != name.as_str() {
                            check_reference(name, referenced, &declared[..index], &declared)?;
                        }
                        let target = spec.resources.get(referenced).ok_or_else(|| {
                            ConfigError::UnknownResource {
                                resource: name.clone(),
                                referenced: referenced.to_string(),
                            }
                        })?;
                        check_resource_path(&placeholder, target, referenced == name.as_str())?;
                    }
                    Expr::Path {
                        namespace: Namespace::Host,
                        path,
                    } => check_host_path(&placeholder, path)?,
                    Expr::Path { .. } => {
                        return Err(ConfigError::PlaceholderNotAllowed {
                            expr: placeholder.raw.clone(),
                            field,
                        }
                        .into())
                    }
                    Expr::Bare(segments) => {
                        return Err(ConfigError::UnknownNamespace {
                            namespace: segments[0].clone(),
                            expr: placeholder.raw.clone(),
                        }
                        .into())
                    }
                }
            }
        }
    }
    Ok(())
}

fn unresolved(placeholder: &Placeholder, reason: impl Into<String>) -> ConfigError {
    ConfigError::Unresolved {
        expr: placeholder.raw.clone(),
        reason: reason.into(),
    }
}

/// Check a `resources.<name>.*` path against the fields the referenced
/// resource will have once created. `path[0]` is the resource name.
///
/// A resource may reference its own fields except `container`, which does
/// not exist yet, and `environment`, which is being resolved.
fn check_resource_path(
    placeholder: &Placeholder,
    target: &ResourceSpec,
    is_self: bool,
) -> std::result::Result<(), ConfigError> {
    let Some(attribute) = placeholder.path().get(1).map(String::as_str) else {
        return Ok(());
    };
    let rest = &placeholder.path()[2..];

    let present = match attribute {
        "image" | "container" => true,
        "cont_port" => target.cont_port.is_some(),
        "host_port" => target.host_port.is_some(),
        "cont_volume" => target.cont_volume.is_some(),
        "host_volume" => target.host_volume.is_some(),
        "command" => target.command.is_some(),
        "environment" => true,
        other => return Err(unresolved(placeholder, format!("no attribute `{}`", other))),
    };
    if !present {
        return Err(unresolved(placeholder, format!("`{}` is not set", attribute)));
    }
    if is_self && matches!(attribute, "container" | "environment") {
        return Err(unresolved(
            placeholder,
            format!("`{}` of the resource itself is not available yet", attribute),
        ));
    }

    match (attribute, rest) {
        (_, []) => Ok(()),
        ("environment", [key]) if target.environment.contains_key(key) => Ok(()),
        ("environment", [key]) => Err(unresolved(
            placeholder,
            format!("environment variable `{}` is not declared", key),
        )),
        ("command", [index]) => {
            let argc = target.command.as_ref().map_or(0, |c| c.to_argv().len());
            match index.parse::<usize>() {
                Ok(i) if i < argc => Ok(()),
                _ => Err(unresolved(placeholder, format!("no command argument `{}`", index))),
            }
        }
        _ => Err(unresolved(
            placeholder,
            format!("`{}` has no attribute `{}`", attribute, rest[0]),
        )),
    }
}

fn check_host_path(placeholder: &Placeholder, path: &[String]) -> std::result::Result<(), ConfigError> {
    match path {
        [] => Ok(()),
        [field] if field == "ip" => Ok(()),
        _ => Err(unresolved(
            placeholder,
            format!("host has no attribute `{}`", path.join(".")),
        )),
    }
}

fn forbid_placeholders(value: &str, field: &str) -> std::result::Result<(), ConfigError> {
    match template::placeholders(value)?.into_iter().next() {
        Some(placeholder) => Err(ConfigError::PlaceholderNotAllowed {
            expr: placeholder.raw,
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_reference(
    resource: &str,
    referenced: &str,
    earlier: &[&str],
    declared: &[&str],
) -> std::result::Result<(), ConfigError> {
    if earlier.contains(&referenced) {
        Ok(())
    } else if declared.contains(&referenced) {
        Err(ConfigError::ForwardReference {
            resource: resource.to_string(),
            referenced: referenced.to_string(),
        })
    } else {
        Err(ConfigError::UnknownResource {
            resource: resource.to_string(),
            referenced: referenced.to_string(),
        })
    }
}

fn unique_match<'a, T>(
    resource: &str,
    reference: &str,
    candidates: impl Iterator<Item = (&'a str, T)>,
) -> std::result::Result<T, ConfigError> {
    let wanted = template::image_reference_name(reference);
    let mut found: Vec<T> = candidates
        .filter(|(name, _)| *name == wanted)
        .map(|(_, item)| item)
        .collect();
    match found.len() {
        0 => Err(ConfigError::UnknownImage {
            resource: resource.to_string(),
            reference: reference.to_string(),
        }),
        1 => Ok(found.remove(0)),
        count => Err(ConfigError::AmbiguousImage {
            resource: resource.to_string(),
            reference: reference.to_string(),
            count,
        }),
    }
}

/// The declared image a resource's `image` field refers to.
pub fn spec_image_for<'a>(
    resource: &str,
    reference: &str,
    images: &'a IndexMap<String, ImageSpec>,
) -> std::result::Result<&'a ImageSpec, ConfigError> {
    unique_match(
        resource,
        reference,
        images.values().map(|image| (image.name.as_str(), image)),
    )
}

/// Runtime identifier of the provisioned image `reference` names.
pub fn resolve_image_reference(
    resource: &str,
    reference: &str,
    images: &IndexMap<String, ResolvedImage>,
) -> std::result::Result<String, ConfigError> {
    unique_match(
        resource,
        reference,
        images.values().map(|image| (image.name.as_str(), image)),
    )
    .map(|image| image.image.clone())
}

/// Parse a port field; accepts an optional `/tcp` suffix.
pub fn parse_port(resource: &str, field: &str, value: &str) -> std::result::Result<u16, ConfigError> {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix("/tcp").unwrap_or(trimmed);
    match number.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort {
            resource: resource.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Make `path` absolute against the current working directory.
pub fn absolute_path(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve a single environment value against the aggregate.
///
/// `declared` lists all resource names in declaration order; a reference to
/// a declared resource that is not yet in `env` is a forward reference.
/// `current` is the partially resolved record of `resource` itself, so its
/// own ports, volumes, image and command can be referenced; its `container`
/// cannot, as it has not been created yet.
pub fn resolve_environment_value(
    resource: &str,
    current: &ResolvedResource,
    value: &str,
    env: &Environment,
    declared: &[&str],
) -> std::result::Result<String, ConfigError> {
    let as_json = |e: serde_json::Error| ConfigError::Unresolved {
        expr: value.to_string(),
        reason: e.to_string(),
    };
    let mut resources = serde_json::to_value(&env.resources).map_err(as_json)?;
    if let Value::Object(map) = &mut resources {
        map.insert(
            resource.to_string(),
            serde_json::to_value(current).map_err(as_json)?,
        );
    }
    let host = serde_json::to_value(&env.host).map_err(as_json)?;

    let value = template::substitute(value, Namespace::Resources, |placeholder| {
        let path = placeholder.path();
        if path[0] == resource {
            if path.get(1).map(String::as_str) == Some("container") {
                return Err(unresolved(placeholder, "the resource's own container does not exist yet"));
            }
        } else if env.resource(&path[0]).is_none() {
            let earlier: Vec<&str> = env.resources.keys().map(String::as_str).collect();
            check_reference(resource, &path[0], &earlier, declared)?;
        }
        template::lookup_path(&resources, path, &placeholder.raw).map(template::render)
    })?;

    template::substitute(&value, Namespace::Host, |placeholder| {
        template::lookup_path(&host, placeholder.path(), &placeholder.raw).map(template::render)
    })
}

/// Produce the realized form of one resource, ready for container creation.
///
/// Resolves the image reference, allocates `{{random_port}}` host ports and
/// resolves environment values against the aggregate built so far plus the
/// resource's own already resolved fields. The returned resource has an
/// empty `container` until it is created.
pub fn resolve_resource(
    name: &str,
    spec: &ResourceSpec,
    env: &Environment,
    declared: &[&str],
    ports: &dyn PortAllocator,
) -> Result<ResolvedResource> {
    let image = resolve_image_reference(name, &spec.image, &env.images)?;

    let cont_port = spec
        .cont_port
        .as_ref()
        .map(|p| parse_port(name, "cont_port", p.as_str()))
        .transpose()?;

    let host_port = match &spec.host_port {
        Some(value) => {
            let value: String = template::substitute(
                value.as_str(),
                Namespace::RandomPort,
                |_| -> std::result::Result<String, GalleyError> {
                    Ok(ports.allocate()?.to_string())
                },
            )?;
            Some(parse_port(name, "host_port", &value)?)
        }
        None => None,
    };

    let host_volume = spec
        .host_volume
        .as_deref()
        .map(absolute_path)
        .transpose()?;

    let mut resolved = ResolvedResource {
        image,
        cont_port,
        host_port,
        cont_volume: spec.cont_volume.clone(),
        host_volume,
        command: spec.command.as_ref().map(|c| c.to_argv()),
        environment: IndexMap::new(),
        container: String::new(),
    };

    let environment = spec
        .environment
        .iter()
        .map(|(key, value)| {
            Ok((
                key.clone(),
                resolve_environment_value(name, &resolved, value.as_str(), env, declared)?,
            ))
        })
        .collect::<std::result::Result<IndexMap<_, _>, ConfigError>>()?;
    resolved.environment = environment;

    Ok(resolved)
}

/// Testparams as plain strings, for the aggregate.
pub fn testparams(spec: &Spec) -> IndexMap<String, String> {
    spec.testparams
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolved::Host;
    use crate::domain::spec::ImageAction;
    use crate::domain::PortError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct SequentialPorts(Mutex<u16>);

    impl PortAllocator for SequentialPorts {
        fn allocate(&self) -> std::result::Result<u16, PortError> {
            let mut next = self.0.lock().unwrap();
            *next += 1;
            Ok(*next)
        }
    }

    const SPEC: &str = r#"
images:
  db_image:
    action: pull
    source: "postgres:{{environ.PG_TAG}}"
    name: pg
resources:
  db:
    image: "{{pg}}"
    cont_port: 5432
    host_port: "{{random_port}}"
    environment:
      POSTGRES_USER: "{{environ.DB_USER}}"
  app:
    image: "{{pg}}"
    environment:
      DB_ADDR: "{{resources.db.container}}"
      DB_USER: "{{resources.db.environment.POSTGRES_USER}}"
      DB_PORT: "{{resources.db.host_port}}"
      CALLBACK: "http://{{host.ip}}:8080"
testparams:
  user: "{{environ.DB_USER}}"
"#;

    fn environ() -> HashMap<String, String> {
        [("PG_TAG", "16"), ("DB_USER", "galley")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn provisioned(spec: &Spec) -> Environment {
        let mut env = Environment::new(Host::new("10.0.0.2"), testparams(spec));
        env.images.insert(
            "db_image".to_string(),
            ResolvedImage {
                action: ImageAction::Pull,
                source: "postgres:16".to_string(),
                name: "pg".to_string(),
                persist: false,
                image: "postgres:16".to_string(),
            },
        );
        env
    }

    fn spec_from(yaml: &str) -> Spec {
        resolve_environ(&Spec::from_yaml_str(yaml).unwrap(), &environ()).unwrap()
    }

    #[test]
    fn test_environ_pass_covers_all_sections() {
        let spec = spec_from(SPEC);
        assert_eq!(spec.images["db_image"].source, "postgres:16");
        assert_eq!(spec.resources["db"].environment["POSTGRES_USER"].as_str(), "galley");
        assert_eq!(spec.testparams["user"].as_str(), "galley");
        // other namespaces untouched
        assert_eq!(
            spec.resources["app"].environment["DB_ADDR"].as_str(),
            "{{resources.db.container}}"
        );
    }

    #[test]
    fn test_environ_pass_does_not_mutate_input() {
        let original = Spec::from_yaml_str(SPEC).unwrap();
        let before = original.clone();
        let _ = resolve_environ(&original, &environ()).unwrap();
        assert_eq!(original, before);
    }

    #[test]
    fn test_validate_accepts_sample() {
        validate(&spec_from(SPEC)).unwrap();
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let spec = spec_from(
            r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    environment:
      DB: "{{resources.db.container}}"
  db:
    image: "{{bb}}"
"#,
        );
        let err = validate(&spec).unwrap_err();
        assert!(matches!(
            err,
            GalleyError::Config(ConfigError::ForwardReference { ref referenced, .. }) if referenced == "db"
        ));
    }

    const SELF_REFERENCE: &str = r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    cont_port: 80
    host_port: "{{random_port}}"
    command: serve --port 80
    environment:
      PUBLIC_PORT: "{{resources.app.host_port}}"
      IMAGE: "{{resources.app.image}}"
      FIRST_ARG: "{{resources.app.command.0}}"
"#;

    #[test]
    fn test_validate_accepts_own_resolved_fields() {
        validate(&spec_from(SELF_REFERENCE)).unwrap();
    }

    #[test]
    fn test_validate_rejects_own_container_and_environment() {
        for reference in ["{{resources.app.container}}", "{{resources.app.environment.OTHER}}"] {
            let spec = spec_from(&format!(
                "images:\n  i: {{action: pull, source: busybox, name: bb}}\nresources:\n  app:\n    image: \"{{{{bb}}}}\"\n    environment:\n      OTHER: x\n      ME: \"{}\"\n",
                reference
            ));
            assert!(
                matches!(
                    validate(&spec).unwrap_err(),
                    GalleyError::Config(ConfigError::Unresolved { .. })
                ),
                "{} should not resolve",
                reference
            );
        }
    }

    #[test]
    fn test_resolve_own_host_port() {
        let spec = spec_from(SELF_REFERENCE);
        let declared = spec.resource_names();
        let ports = SequentialPorts(Mutex::new(49100));
        let mut env = Environment::new(Host::new("10.0.0.2"), IndexMap::new());
        env.images.insert(
            "i".to_string(),
            ResolvedImage {
                action: ImageAction::Pull,
                source: "busybox".to_string(),
                name: "bb".to_string(),
                persist: false,
                image: "busybox".to_string(),
            },
        );

        let app =
            resolve_resource("app", &spec.resources["app"], &env, &declared, &ports).unwrap();
        assert_eq!(app.host_port, Some(49101));
        assert_eq!(app.environment["PUBLIC_PORT"], "49101");
        assert_eq!(app.environment["IMAGE"], "busybox");
        assert_eq!(app.environment["FIRST_ARG"], "serve");
    }

    #[test]
    fn test_validate_rejects_unknown_attribute_paths() {
        let cases = [
            "{{host.nope}}",
            "{{host.ip.more}}",
            "{{resources.db.nope}}",
            "{{resources.db.host_port}}",
            "{{resources.db.environment.MISSING}}",
            "{{resources.db.container.id}}",
            "{{resources.db.command.5}}",
        ];
        for reference in cases {
            let spec = spec_from(&format!(
                r#"
images:
  i: {{action: pull, source: busybox, name: bb}}
resources:
  db:
    image: "{{{{bb}}}}"
    command: sleep 60
    environment:
      USER: galley
  app:
    image: "{{{{bb}}}}"
    environment:
      X: "{}"
"#,
                reference
            ));
            assert!(
                matches!(
                    validate(&spec).unwrap_err(),
                    GalleyError::Config(ConfigError::Unresolved { .. })
                ),
                "{} should be rejected",
                reference
            );
        }
    }

    #[test]
    fn test_validate_accepts_known_attribute_paths() {
        let spec = spec_from(
            r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  db:
    image: "{{bb}}"
    command: [sleep, "60"]
    environment:
      USER: galley
  app:
    image: "{{bb}}"
    environment:
      A: "{{resources.db.container}}"
      B: "{{resources.db.environment.USER}}"
      C: "{{resources.db.command.1}}"
      D: "{{host.ip}}"
      E: "{{resources.db.image}}"
"#,
        );
        validate(&spec).unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_and_ambiguous_images() {
        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{nginx}}"
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::UnknownImage { .. })
        ));

        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
  b: {action: pull, source: alpine, name: bb}
resources:
  app:
    image: "{{bb}}"
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::AmbiguousImage { count: 2, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_misplaced_placeholders() {
        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    host_volume: "{{resources.db.container}}"
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::PlaceholderNotAllowed { .. })
        ));

        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    environment:
      PORT: "{{random_port}}"
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::PlaceholderNotAllowed { .. })
        ));

        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    environment:
      X: "{{secrets.token}}"
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::UnknownNamespace { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    cont_port: http
"#,
        );
        assert!(matches!(
            validate(&spec).unwrap_err(),
            GalleyError::Config(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_resolve_resources_in_order() {
        let spec = spec_from(SPEC);
        let declared = spec.resource_names();
        let ports = SequentialPorts(Mutex::new(49000));
        let mut env = provisioned(&spec);

        let mut db =
            resolve_resource("db", &spec.resources["db"], &env, &declared, &ports).unwrap();
        assert_eq!(db.image, "postgres:16");
        assert_eq!(db.port_binding(), Some((5432, 49001)));
        db.container = "c-db".to_string();
        env.resources.insert("db".to_string(), db);

        let app =
            resolve_resource("app", &spec.resources["app"], &env, &declared, &ports).unwrap();
        assert_eq!(app.environment["DB_ADDR"], "c-db");
        assert_eq!(app.environment["DB_USER"], "galley");
        assert_eq!(app.environment["DB_PORT"], "49001");
        assert_eq!(app.environment["CALLBACK"], "http://10.0.0.2:8080");
        assert_eq!(app.port_binding(), None);
    }

    #[test]
    fn test_resolve_unknown_attribute_fails() {
        let spec = spec_from(
            r#"
images:
  a: {action: pull, source: busybox, name: bb}
resources:
  db:
    image: "{{bb}}"
  app:
    image: "{{bb}}"
    environment:
      X: "{{resources.db.nope}}"
"#,
        );
        let mut env = Environment::new(Host::new("10.0.0.2"), IndexMap::new());
        env.images.insert(
            "a".to_string(),
            ResolvedImage {
                action: ImageAction::Pull,
                source: "busybox".to_string(),
                name: "bb".to_string(),
                persist: false,
                image: "busybox".to_string(),
            },
        );
        let declared = spec.resource_names();
        let ports = SequentialPorts(Mutex::new(0));
        let mut db = resolve_resource("db", &spec.resources["db"], &env, &declared, &ports).unwrap();
        db.container = "c1".to_string();
        env.resources.insert("db".to_string(), db);

        let err =
            resolve_resource("app", &spec.resources["app"], &env, &declared, &ports).unwrap_err();
        assert!(matches!(err, GalleyError::Config(ConfigError::Unresolved { .. })));
    }

    #[test]
    fn test_relative_host_volume_made_absolute() {
        let path = absolute_path("data").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("data"));
        assert_eq!(absolute_path("/srv").unwrap(), PathBuf::from("/srv"));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("r", "cont_port", "8080").unwrap(), 8080);
        assert_eq!(parse_port("r", "cont_port", "80/tcp").unwrap(), 80);
        assert!(parse_port("r", "cont_port", "0").is_err());
        assert!(parse_port("r", "cont_port", "70000").is_err());
    }
}
