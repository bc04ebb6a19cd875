//! Role loading for Statecraft.
//!
//! A role is a reusable bundle of defaults, variables, and tasks laid out in
//! the conventional directory structure (`defaults/`, `vars/`, `tasks/`,
//! `templates/`, `files/`, ...). Each component resolves through a fixed
//! fallback chain: `main.yml`, then `main.yaml`, then a plain `main` file,
//! then a `main/` directory whose files are loaded recursively with deeper
//! files overriding shallower ones. A missing component is empty, not an
//! error.
//!
//! A directory is recognized as a role when any of the conventional
//! subdirectories is present; the content of the subdirectory is not
//! inspected (a documented divergence from Ansible, which requires
//! non-empty content).

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::registry::TaskRegistry;
use crate::scope::Scope;
use crate::task::Task;

/// Subdirectories whose presence marks a directory as a role.
pub const ROLE_SUBDIRS: &[&str] = &[
    "defaults",
    "vars",
    "tasks",
    "handlers",
    "templates",
    "files",
    "meta",
    "library",
    "module_utils",
    "lookup_plugins",
];

/// Whether a directory looks like a role.
pub fn is_role(path: &Path) -> bool {
    ROLE_SUBDIRS.iter().any(|sub| path.join(sub).is_dir())
}

/// The variable bundle a role contributes to a play's scope.
///
/// Defaults sit at the lowest precedence of the scope stack; role variables
/// override play variables.
#[derive(Debug, Clone, Default)]
pub struct RoleVars {
    /// Variables from `defaults/`, lowest precedence.
    pub defaults: Scope,
    /// Variables from `vars/`, high precedence.
    pub vars: Scope,
}

/// Load a role's defaults and vars bundles.
pub fn load_role_vars(role_dir: &Path) -> Result<RoleVars> {
    Ok(RoleVars {
        defaults: load_vars_component(&role_dir.join("defaults"))?,
        vars: load_vars_component(&role_dir.join("vars"))?,
    })
}

/// Load a role's task list from its `tasks/` component.
pub fn load_role_tasks(role_dir: &Path, registry: &TaskRegistry) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for file in resolve_component(&role_dir.join("tasks")) {
        tasks.extend(Task::load_file(&file, registry)?);
    }
    Ok(tasks)
}

/// Resolve a component directory to the ordered list of files to load.
///
/// The fallback chain: `main.yml` → `main.yaml` → plain `main` file →
/// `main/` directory (every file under it, shallower first so deeper files
/// override on merge) → nothing.
fn resolve_component(dir: &Path) -> Vec<PathBuf> {
    for candidate in ["main.yml", "main.yaml"] {
        let path = dir.join(candidate);
        if path.is_file() {
            return vec![path];
        }
    }

    let main = dir.join("main");
    if main.is_file() {
        return vec![main];
    }
    if main.is_dir() {
        let mut files: Vec<(usize, PathBuf)> = WalkDir::new(&main)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| (entry.depth(), entry.into_path()))
            .collect();
        files.sort();
        return files.into_iter().map(|(_, path)| path).collect();
    }

    Vec::new()
}

/// Load and merge one vars-shaped component (`defaults/` or `vars/`).
fn load_vars_component(dir: &Path) -> Result<Scope> {
    let mut merged = Scope::new();
    for file in resolve_component(dir) {
        let content = std::fs::read_to_string(&file).map_err(|e| Error::RoleLoad {
            path: file.clone(),
            message: e.to_string(),
        })?;
        let scope = Scope::from_yaml(&content).map_err(|e| Error::RoleLoad {
            path: file.clone(),
            message: e.to_string(),
        })?;
        merged.merge(&scope);
    }
    Ok(merged)
}
