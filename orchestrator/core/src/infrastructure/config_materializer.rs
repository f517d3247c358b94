// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Config Materializer
//!
//! Builds each worker's config by layering, in order:
//!
//! 1. the base template `<config_dir>/minion` (empty when no config dir is set)
//! 2. mandatory identity fields (`id`, `user`, `cachedir`, `master`, `log_file`, `grains`)
//! 3. legion fields (`legion_fakes`, `return`) when fakes are requested
//! 4. transport fields (`pki_dir` for zeromq, `transport: tcp` otherwise)
//! 5. `root_dir` override
//! 6. `disable_modules`: every available module that is not on the keep-list
//!
//! and writes the result as YAML to `<workspace>/minion`. The control-plane
//! config gets the same treatment from `<config_dir>/master`.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::domain::fleet_spec::{FleetSpec, Transport};
use crate::domain::identity::WorkerIdentity;
use crate::infrastructure::workspace::WorkspaceLayout;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to read base template {path:?}: {source}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Base template {path:?} is not valid YAML: {source}")]
    ParseTemplate {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Base template {path:?} must be a mapping")]
    TemplateNotMapping { path: PathBuf },

    #[error("Failed to list modules in {path:?}: {source}")]
    ListModules {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare workspace {path:?}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config for {label}: {source}")]
    Serialize {
        label: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Writes worker and control-plane configs for one fleet run.
#[derive(Debug, Clone)]
pub struct ConfigMaterializer {
    config_dir: Option<PathBuf>,
    master: String,
    user: String,
    transport: Transport,
    root_dir: Option<PathBuf>,
    legion_fakes: u32,
    disabled_modules: Option<Vec<String>>,
}

impl ConfigMaterializer {
    /// Build from a spec. Lists `modules_dir` once when a keep-list is given.
    pub fn from_spec(spec: &FleetSpec) -> Result<Self, MaterializeError> {
        let disabled_modules = match (&spec.modules_dir, spec.keep_modules.is_empty()) {
            (Some(dir), false) => Some(disabled_modules(dir, &spec.keep_modules)?),
            _ => None,
        };

        Ok(Self {
            config_dir: spec.config_dir.clone(),
            master: spec.master.clone(),
            user: spec.user.clone(),
            transport: spec.transport,
            root_dir: spec.root_dir.clone(),
            legion_fakes: spec.legion_fakes,
            disabled_modules,
        })
    }

    /// Load `<config_dir>/<name>`, or an empty mapping without a config dir.
    pub fn load_base(&self, name: &str) -> Result<Mapping, MaterializeError> {
        match &self.config_dir {
            Some(dir) => load_template(&dir.join(name)),
            None => Ok(Mapping::new()),
        }
    }

    /// The merged worker config for `identity`.
    pub fn minion_config(&self, identity: &WorkerIdentity) -> Result<Mapping, MaterializeError> {
        let mut data = self.load_base("minion")?;

        set(&mut data, "id", Value::String(identity.id.clone()));
        set(&mut data, "user", Value::String(self.user.clone()));
        set(&mut data, "cachedir", path_value(&identity.cache_dir()));
        set(&mut data, "master", Value::String(self.master.clone()));
        set(&mut data, "log_file", path_value(&identity.log_file()));

        let grains: Mapping = identity
            .grains
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect();
        set(&mut data, "grains", Value::Mapping(grains));

        if self.legion_fakes > 0 {
            set(&mut data, "legion_fakes", Value::Number(self.legion_fakes.into()));
            set(&mut data, "return", Value::String("legion".to_string()));
        }

        match self.transport {
            Transport::Zeromq => {
                let pki_dir = identity
                    .pki_dir
                    .clone()
                    .unwrap_or_else(|| identity.workspace.join("pki"));
                set(&mut data, "pki_dir", path_value(&pki_dir));
            }
            Transport::Tcp => {
                set(&mut data, "transport", Value::String("tcp".to_string()));
            }
        }

        if let Some(root_dir) = &self.root_dir {
            set(&mut data, "root_dir", path_value(root_dir));
        }

        if let Some(disabled) = &self.disabled_modules {
            let modules = disabled.iter().cloned().map(Value::String).collect();
            set(&mut data, "disable_modules", Value::Sequence(modules));
        }

        Ok(data)
    }

    /// Create the identity's workspace tree and write its config.
    pub fn write_minion(&self, identity: &WorkerIdentity) -> Result<PathBuf, MaterializeError> {
        let data = self.minion_config(identity)?;

        for dir in [identity.workspace.clone(), identity.cache_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| MaterializeError::Workspace { path: dir, source })?;
        }

        let path = identity.config_path();
        write_yaml(&identity.id, &path, &data)?;
        debug!(id = %identity.id, path = %path.display(), "Wrote worker config");
        Ok(path)
    }

    /// The merged control-plane config.
    pub fn master_config(&self, layout: &WorkspaceLayout) -> Result<Mapping, MaterializeError> {
        let mut data = self.load_base("master")?;
        set(&mut data, "log_file", path_value(&layout.master_log_file()));
        // Accept every key; the fleet's keys are generated locally.
        set(&mut data, "open_mode", Value::Bool(true));
        Ok(data)
    }

    pub fn write_master(&self, layout: &WorkspaceLayout) -> Result<PathBuf, MaterializeError> {
        let data = self.master_config(layout)?;
        let dir = layout.master_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|source| MaterializeError::Workspace { path: dir, source })?;

        let path = layout.master_config_path();
        write_yaml("master", &path, &data)?;
        debug!(path = %path.display(), "Wrote control-plane config");
        Ok(path)
    }
}

/// Every module stem in `modules_dir` that is not in `keep`, sorted.
///
/// A module's name is its file name up to the first `.`, so `test.py` and
/// `test.pyc` both name `test`.
pub fn disabled_modules(modules_dir: &Path, keep: &[String]) -> Result<Vec<String>, MaterializeError> {
    let entries = std::fs::read_dir(modules_dir).map_err(|source| MaterializeError::ListModules {
        path: modules_dir.to_path_buf(),
        source,
    })?;

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| MaterializeError::ListModules {
            path: modules_dir.to_path_buf(),
            source,
        })?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let stem = file_name.split('.').next().unwrap_or_default();
        if !stem.is_empty() && !keep.iter().any(|k| k == stem) {
            names.insert(stem.to_string());
        }
    }

    Ok(names.into_iter().collect())
}

fn load_template(path: &Path) -> Result<Mapping, MaterializeError> {
    let content = std::fs::read_to_string(path).map_err(|source| MaterializeError::ReadTemplate {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_yaml::from_str(&content).map_err(|source| MaterializeError::ParseTemplate {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(MaterializeError::TemplateNotMapping {
            path: path.to_path_buf(),
        }),
    }
}

fn write_yaml(label: &str, path: &Path, data: &Mapping) -> Result<(), MaterializeError> {
    let yaml = serde_yaml::to_string(data).map_err(|source| MaterializeError::Serialize {
        label: label.to_string(),
        source,
    })?;
    std::fs::write(path, yaml).map_err(|source| MaterializeError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn set(data: &mut Mapping, key: &str, value: Value) {
    data.insert(Value::String(key.to_string()), value);
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::IdentityAllocator;

    fn fleet(root: &Path, spec: &FleetSpec) -> Vec<WorkerIdentity> {
        IdentityAllocator::from_spec(spec).allocate(spec, root)
    }

    fn get<'a>(data: &'a Mapping, key: &str) -> Option<&'a Value> {
        data.get(Value::String(key.to_string()))
    }

    #[test]
    fn test_mandatory_fields() {
        let root = tempfile::tempdir().unwrap();
        let spec = FleetSpec {
            minions: 1,
            user: "legion".to_string(),
            master: "10.0.0.5".to_string(),
            ..Default::default()
        };
        let identity = &fleet(root.path(), &spec)[0];
        let data = ConfigMaterializer::from_spec(&spec)
            .unwrap()
            .minion_config(identity)
            .unwrap();

        assert_eq!(get(&data, "id").unwrap().as_str(), Some("ms-1"));
        assert_eq!(get(&data, "user").unwrap().as_str(), Some("legion"));
        assert_eq!(get(&data, "master").unwrap().as_str(), Some("10.0.0.5"));
        assert_eq!(
            get(&data, "cachedir").unwrap().as_str(),
            Some(identity.cache_dir().display().to_string().as_str())
        );
        assert_eq!(
            get(&data, "pki_dir").unwrap().as_str(),
            Some(identity.workspace.join("pki").display().to_string().as_str())
        );
        assert!(get(&data, "transport").is_none());
        assert!(get(&data, "legion_fakes").is_none());
        assert!(get(&data, "disable_modules").is_none());

        let grains = get(&data, "grains").unwrap().as_mapping().unwrap();
        assert_eq!(grains.get("legion"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_tcp_and_legion_fields() {
        let root = tempfile::tempdir().unwrap();
        let spec = FleetSpec {
            minions: 1,
            transport: Transport::Tcp,
            legion_fakes: 4,
            root_dir: Some(PathBuf::from("/srv/legion")),
            ..Default::default()
        };
        let identity = &fleet(root.path(), &spec)[0];
        let data = ConfigMaterializer::from_spec(&spec)
            .unwrap()
            .minion_config(identity)
            .unwrap();

        assert_eq!(get(&data, "transport").unwrap().as_str(), Some("tcp"));
        assert!(get(&data, "pki_dir").is_none());
        assert_eq!(get(&data, "legion_fakes").unwrap().as_u64(), Some(4));
        assert_eq!(get(&data, "return").unwrap().as_str(), Some("legion"));
        assert_eq!(get(&data, "root_dir").unwrap().as_str(), Some("/srv/legion"));
    }

    #[test]
    fn test_base_template_is_overlaid() {
        let root = tempfile::tempdir().unwrap();
        let config_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            config_dir.path().join("minion"),
            "id: should-be-replaced\nacceptance_wait_time: 30\nmaster: old\n",
        )
        .unwrap();

        let spec = FleetSpec {
            minions: 1,
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        let identity = &fleet(root.path(), &spec)[0];
        let data = ConfigMaterializer::from_spec(&spec)
            .unwrap()
            .minion_config(identity)
            .unwrap();

        assert_eq!(get(&data, "id").unwrap().as_str(), Some("ms-1"));
        assert_eq!(get(&data, "master").unwrap().as_str(), Some("salt"));
        assert_eq!(get(&data, "acceptance_wait_time").unwrap().as_u64(), Some(30));
    }

    #[test]
    fn test_empty_template_is_empty_mapping() {
        let config_dir = tempfile::tempdir().unwrap();
        std::fs::write(config_dir.path().join("minion"), "").unwrap();
        let spec = FleetSpec {
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        let base = ConfigMaterializer::from_spec(&spec)
            .unwrap()
            .load_base("minion")
            .unwrap();
        assert!(base.is_empty());
    }

    #[test]
    fn test_unreadable_or_invalid_template_is_fatal() {
        let config_dir = tempfile::tempdir().unwrap();
        let spec = FleetSpec {
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        let materializer = ConfigMaterializer::from_spec(&spec).unwrap();

        assert!(matches!(
            materializer.load_base("minion"),
            Err(MaterializeError::ReadTemplate { .. })
        ));

        std::fs::write(config_dir.path().join("minion"), "- just\n- a list\n").unwrap();
        assert!(matches!(
            materializer.load_base("minion"),
            Err(MaterializeError::TemplateNotMapping { .. })
        ));

        std::fs::write(config_dir.path().join("minion"), "key: [unclosed\n").unwrap();
        assert!(matches!(
            materializer.load_base("minion"),
            Err(MaterializeError::ParseTemplate { .. })
        ));
    }

    #[test]
    fn test_disabled_modules_is_denylist_by_omission() {
        let modules = tempfile::tempdir().unwrap();
        for name in ["test.py", "test.pyc", "cmdmod.py", "grains.py", "state.py", "__init__.py"] {
            std::fs::write(modules.path().join(name), "").unwrap();
        }

        let disabled = disabled_modules(
            modules.path(),
            &["test".to_string(), "state".to_string()],
        )
        .unwrap();
        assert_eq!(disabled, vec!["__init__", "cmdmod", "grains"]);
    }

    #[test]
    fn test_keep_list_lands_in_config() {
        let root = tempfile::tempdir().unwrap();
        let modules = tempfile::tempdir().unwrap();
        std::fs::write(modules.path().join("pkg.py"), "").unwrap();
        std::fs::write(modules.path().join("test.py"), "").unwrap();

        let spec = FleetSpec {
            minions: 1,
            keep_modules: vec!["test".to_string()],
            modules_dir: Some(modules.path().to_path_buf()),
            ..Default::default()
        };
        let identity = &fleet(root.path(), &spec)[0];
        let data = ConfigMaterializer::from_spec(&spec)
            .unwrap()
            .minion_config(identity)
            .unwrap();

        let disabled = get(&data, "disable_modules").unwrap().as_sequence().unwrap();
        assert_eq!(disabled, &vec![Value::String("pkg".to_string())]);
    }

    #[test]
    fn test_write_is_idempotent_and_creates_tree() {
        let root = tempfile::tempdir().unwrap();
        let mut spec = FleetSpec {
            minions: 2,
            ..Default::default()
        };
        spec.randomize.os = true;
        spec.randomize.uuid = true;

        let identity = &fleet(root.path(), &spec)[1];
        let materializer = ConfigMaterializer::from_spec(&spec).unwrap();

        let path = materializer.write_minion(identity).unwrap();
        assert!(identity.cache_dir().is_dir());
        let first = std::fs::read_to_string(&path).unwrap();

        materializer.write_minion(identity).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);

        let parsed: Mapping = serde_yaml::from_str(&first).unwrap();
        assert_eq!(get(&parsed, "id").unwrap().as_str(), Some("ms-2"));
    }

    #[test]
    fn test_master_config() {
        let root = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::at(root.path());
        let materializer = ConfigMaterializer::from_spec(&FleetSpec::default()).unwrap();

        let path = materializer.write_master(&layout).unwrap();
        assert_eq!(path, layout.master_config_path());

        let parsed: Mapping = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(get(&parsed, "open_mode"), Some(&Value::Bool(true)));
        assert_eq!(
            get(&parsed, "log_file").unwrap().as_str(),
            Some(layout.master_log_file().display().to_string().as_str())
        );
    }
}
