use std::fs;

use beast_rules::rule::RuleConfig;
use beast_rules::copy::CopyConfig;
use beast_rules::scansun::ScansunConfig;

use super::*;
use crate::error::StoreError;

fn copy_route(name: &str) -> RouteDefinition {
    RouteDefinition::new(name, vec!["dex".into()], RuleConfig::Copy(CopyConfig::default()))
}

/// Shared contract every backend must satisfy.
fn exercise(store: &dyn RouteStore) {
    assert!(store.list().unwrap().is_empty());

    store.store(&copy_route("b-route")).unwrap();
    store.store(&copy_route("a-route")).unwrap();
    assert!(matches!(
        store.store(&copy_route("a-route")),
        Err(StoreError::AlreadyExists(name)) if name == "a-route"
    ));

    let names: Vec<String> = store.list().unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["a-route", "b-route"]);

    let mut changed = copy_route("a-route");
    changed.rule = RuleConfig::Scansun(ScansunConfig {
        sources: vec!["seang".into()],
    });
    changed.active = false;
    store.update(&changed).unwrap();
    assert_eq!(store.load("a-route").unwrap(), changed);
    assert!(matches!(
        store.update(&copy_route("missing")),
        Err(StoreError::NotFound(_))
    ));

    store.delete("b-route").unwrap();
    assert!(matches!(store.delete("b-route"), Err(StoreError::NotFound(_))));
    assert!(matches!(store.load("b-route"), Err(StoreError::NotFound(_))));
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn memory_store_contract() {
    exercise(&MemoryRouteStore::new());
}

#[test]
fn yaml_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&YamlRouteStore::new(dir.path()).unwrap());
}

#[test]
fn yaml_store_writes_one_file_per_route_and_no_tmp() {
    let dir = tempfile::tempdir().unwrap();
    let store = YamlRouteStore::new(dir.path().join("routes")).unwrap();
    store.store(&copy_route("seang-copy")).unwrap();

    let files: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["seang-copy.yml"]);

    let yaml = fs::read_to_string(store.dir().join("seang-copy.yml")).unwrap();
    assert!(yaml.contains("type: copy"));
}

#[test]
fn yaml_store_skips_broken_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = YamlRouteStore::new(dir.path()).unwrap();
    store.store(&copy_route("good")).unwrap();
    fs::write(dir.path().join("broken.yml"), "name: [unclosed").unwrap();
    fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    fs::write(dir.path().join(".hidden.yml"), "name: hidden\nrule:\n  type: copy\n").unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["good"]);
}

#[test]
fn yaml_store_reads_hand_written_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("composite.yaml"),
        r#"
name: composite
author: ops
recipients: [dex, archive]
rule:
  type: compositing
  area: swegmaps_2000
  sources: [seang, searl]
"#,
    )
    .unwrap();
    let store = YamlRouteStore::new(dir.path()).unwrap();
    let routes = store.list().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].recipients, vec!["dex", "archive"]);
}
