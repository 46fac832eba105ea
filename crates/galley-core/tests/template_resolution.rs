//! End-to-end resolution of a spec without a container runtime.

use galley_core::resolve::{resolve_environ, resolve_resource, testparams, validate};
use galley_core::{
    ConfigError, Environment, EphemeralPortAllocator, GalleyError, Host, ImageAction,
    ProcessEnviron, ResolvedImage, Spec,
};
use serial_test::serial;
use std::collections::{HashMap, HashSet};

fn pulled(name: &str, image: &str) -> ResolvedImage {
    ResolvedImage {
        action: ImageAction::Pull,
        source: image.to_string(),
        name: name.to_string(),
        persist: false,
        image: image.to_string(),
    }
}

#[test]
#[serial]
fn environ_placeholder_uses_process_environment() {
    std::env::set_var("DB_HOST", "10.0.0.5");
    let spec = Spec::from_yaml_str(
        r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    environment:
      DB_HOST: "{{environ.DB_HOST}}"
"#,
    )
    .unwrap();
    let resolved = resolve_environ(&spec, &ProcessEnviron);
    std::env::remove_var("DB_HOST");

    let resolved = resolved.unwrap();
    assert_eq!(
        resolved.resources["app"].environment["DB_HOST"].as_str(),
        "10.0.0.5"
    );
}

#[test]
#[serial]
fn missing_process_variable_is_config_error() {
    std::env::remove_var("GALLEY_TEST_UNSET_VAR");
    let spec = Spec::from_yaml_str(
        r#"
images:
  i: {action: pull, source: "{{environ.GALLEY_TEST_UNSET_VAR}}", name: bb}
resources: {}
"#,
    )
    .unwrap();
    let err = resolve_environ(&spec, &ProcessEnviron).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn resolution_is_deterministic() {
    let env: HashMap<String, String> = [("TAG".to_string(), "1.2".to_string())].into();
    let spec = Spec::from_yaml_str(
        r#"
images:
  i: {action: pull, source: "app:{{environ.TAG}}", name: app}
resources:
  web:
    image: "{{app}}"
    command: ["serve", "--tag", "{{environ.TAG}}"]
"#,
    )
    .unwrap();

    let first = resolve_environ(&spec, &env).unwrap();
    let second = resolve_environ(&spec, &env).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.digest().unwrap(), second.digest().unwrap());

    // a resolved spec has nothing left to resolve
    let again = resolve_environ(&first, &HashMap::<String, String>::new()).unwrap();
    assert_eq!(again, first);
}

#[test]
fn random_ports_are_unique_across_resources() {
    let mut yaml = String::from("images:\n  i: {action: pull, source: busybox, name: bb}\nresources:\n");
    for i in 0..12 {
        yaml.push_str(&format!(
            "  r{}:\n    image: \"{{{{bb}}}}\"\n    cont_port: 80\n    host_port: \"{{{{random_port}}}}\"\n",
            i
        ));
    }
    let spec = resolve_environ(&Spec::from_yaml_str(&yaml).unwrap(), &HashMap::<String, String>::new()).unwrap();
    validate(&spec).unwrap();

    let mut env = Environment::new(Host::new("127.0.0.1"), testparams(&spec));
    env.images.insert("i".to_string(), pulled("bb", "busybox"));
    let declared = spec.resource_names();
    let ports = EphemeralPortAllocator::new();

    let mut seen = HashSet::new();
    for (name, resource) in &spec.resources {
        let mut resolved = resolve_resource(name, resource, &env, &declared, &ports).unwrap();
        let port = resolved.host_port.unwrap();
        assert!(seen.insert(port), "duplicate host port {}", port);
        resolved.container = format!("c-{}", name);
        env.resources.insert(name.clone(), resolved);
    }
    assert_eq!(seen.len(), 12);
}

#[test]
fn earlier_resources_never_need_later_ones() {
    let spec = Spec::from_yaml_str(
        r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  db:
    image: "{{bb}}"
  cache:
    image: "{{bb}}"
    environment:
      DB: "{{resources.db.container}}"
  app:
    image: "{{bb}}"
    environment:
      DB: "{{resources.db.container}}"
      CACHE: "{{resources.cache.container}}"
"#,
    )
    .unwrap();
    validate(&spec).unwrap();

    let mut env = Environment::new(Host::new("127.0.0.1"), testparams(&spec));
    env.images.insert("i".to_string(), pulled("bb", "busybox"));
    let declared = spec.resource_names();
    let ports = EphemeralPortAllocator::new();

    for (name, resource) in &spec.resources {
        let mut resolved = resolve_resource(name, resource, &env, &declared, &ports).unwrap();
        resolved.container = format!("id-{}", name);
        env.resources.insert(name.clone(), resolved);
    }

    assert_eq!(env.resources["cache"].environment["DB"], "id-db");
    assert_eq!(env.resources["app"].environment["CACHE"], "id-cache");
}

#[test]
fn template_injection_is_rejected() {
    let spec = Spec::from_yaml_str(
        r#"
images:
  i: {action: pull, source: busybox, name: bb}
resources:
  app:
    image: "{{bb}}"
    environment:
      X: "{{ resources['db'].container }}"
"#,
    )
    .unwrap();
    let err = resolve_environ(&spec, &HashMap::<String, String>::new()).unwrap_err();
    assert!(matches!(
        err,
        GalleyError::Config(ConfigError::MalformedPlaceholder { .. })
    ));
}
