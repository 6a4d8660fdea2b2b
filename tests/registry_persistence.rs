use std::fs;

use sshdeck::error::{LoadError, StoreError, ValidationError};
use sshdeck::{ConfigFile, Host, Registry};
use tempfile::tempdir;

fn config(dir: &tempfile::TempDir) -> ConfigFile {
    ConfigFile::open(dir.path().join("config.toml"))
}

#[test]
fn created_host_survives_a_fresh_load() {
    let dir = tempdir().unwrap();
    let mut registry = Registry::load(config(&dir)).unwrap();
    registry
        .create(Host {
            user: Some("deploy".into()),
            port: Some(2222),
            key_path: Some("~/.ssh/prod".into()),
            tags: ["web".to_string()].into(),
            ..Host::new("prod-web", "52.14.33.10")
        })
        .unwrap();
    registry
        .create(Host {
            bastion: Some("prod-web".into()),
            ..Host::new("staging-db", "35.12.2.4")
        })
        .unwrap();

    let reloaded = Registry::load(config(&dir)).unwrap();
    assert_eq!(reloaded.hosts(), registry.hosts());
    assert!(!reloaded.can_undo());
}

#[test]
fn missing_file_is_created_empty() {
    let dir = tempdir().unwrap();
    let registry = Registry::load(config(&dir)).unwrap();
    assert!(registry.hosts().is_empty());
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn corrupt_file_is_never_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[[hosts]\nname = ").unwrap();

    let err = Registry::load(config(&dir)).unwrap_err();
    assert!(matches!(err, LoadError::Parse { .. }), "{err}");
    assert_eq!(fs::read_to_string(&path).unwrap(), "[[hosts]\nname = ");

    let mut registry = Registry::empty(config(&dir));
    assert_eq!(fs::read_to_string(&path).unwrap(), "[[hosts]\nname = ");

    registry.create(Host::new("web", "10.0.0.1")).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("config.toml.corrupt")).unwrap(),
        "[[hosts]\nname = "
    );
    let reloaded = Registry::load(config(&dir)).unwrap();
    assert_eq!(reloaded.hosts().len(), 1);
    assert_eq!(reloaded.hosts()[0].name, "web");
}

#[test]
fn backup_holds_the_previous_save() {
    let dir = tempdir().unwrap();
    let mut registry = Registry::load(config(&dir)).unwrap();
    registry.create(Host::new("web", "10.0.0.1")).unwrap();
    let after_first = fs::read_to_string(dir.path().join("config.toml")).unwrap();

    registry.create(Host::new("db", "10.0.0.2")).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("config.toml.bak")).unwrap(),
        after_first
    );
}

#[test]
fn duplicates_get_sequential_names_and_undo_in_order() {
    let dir = tempdir().unwrap();
    let mut registry = Registry::load(config(&dir)).unwrap();
    registry.create(Host::new("web", "10.0.0.1")).unwrap();

    assert_eq!(registry.duplicate("web").unwrap(), "web-copy");
    assert_eq!(registry.duplicate("web").unwrap(), "web-copy-2");
    let names: Vec<_> = registry.hosts().iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["web", "web-copy", "web-copy-2"]);

    registry.undo().unwrap();
    registry.undo().unwrap();
    registry.undo().unwrap();
    assert!(registry.hosts().is_empty());
    assert!(matches!(registry.undo(), Err(StoreError::EmptyUndoStack)));

    let reloaded = Registry::load(config(&dir)).unwrap();
    assert!(reloaded.hosts().is_empty());
}

#[test]
fn rejected_changes_leave_disk_alone() {
    let dir = tempdir().unwrap();
    let mut registry = Registry::load(config(&dir)).unwrap();
    registry.create(Host::new("web", "10.0.0.1")).unwrap();
    let before = fs::read_to_string(dir.path().join("config.toml")).unwrap();

    let err = registry.create(Host::new("web", "10.0.0.9")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::DuplicateName(_))
    ));
    assert_eq!(
        fs::read_to_string(dir.path().join("config.toml")).unwrap(),
        before
    );
}
