//! One YAML file per route under a directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::definition::RouteDefinition;
use crate::error::StoreError;

use super::RouteStore;

/// Directory-backed store: `<dir>/<name>.yml`.
///
/// Writes go to a `.tmp` file first and are renamed into place, so a crash
/// never leaves a half-written definition behind.
#[derive(Debug, Clone)]
pub struct YamlRouteStore {
    dir: PathBuf,
}

impl YamlRouteStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yml"))
    }

    fn write(&self, definition: &RouteDefinition) -> Result<PathBuf, StoreError> {
        let final_path = self.path_for(&definition.name);
        let tmp_path = self.dir.join(format!(".{}.tmp", definition.name));

        let yaml = serde_yaml::to_string(definition)?;
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(final_path)
    }

    fn read(path: &Path) -> Result<RouteDefinition, StoreError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }
}

impl RouteStore for YamlRouteStore {
    fn load(&self, name: &str) -> Result<RouteDefinition, StoreError> {
        match Self::read(&self.path_for(name)) {
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            other => other,
        }
    }

    fn store(&self, definition: &RouteDefinition) -> Result<(), StoreError> {
        if self.path_for(&definition.name).exists() {
            return Err(StoreError::AlreadyExists(definition.name.clone()));
        }
        let path = self.write(definition)?;
        info!(route = %definition.name, path = %path.display(), "stored route");
        Ok(())
    }

    fn update(&self, definition: &RouteDefinition) -> Result<(), StoreError> {
        if !self.path_for(&definition.name).exists() {
            return Err(StoreError::NotFound(definition.name.clone()));
        }
        let path = self.write(definition)?;
        info!(route = %definition.name, path = %path.display(), "updated route");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => {
                info!(route = %name, "deleted route");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Dotfiles and non-YAML files are skipped. A file that fails to parse is
    /// logged and skipped so one bad route cannot hide the others.
    fn list(&self) -> Result<Vec<RouteDefinition>, StoreError> {
        let mut routes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') || !path.is_file() {
                continue;
            }
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if !is_yaml {
                continue;
            }
            match Self::read(&path) {
                Ok(definition) => routes.push(definition),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load route file"),
            }
        }
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(routes)
    }
}
