//! Built-in module implementations for Statecraft.
//!
//! Modules are the leaves of the execution engine: each one owns a typed
//! parameter struct, validates it, and performs one idempotent side effect
//! through the [`TaskContent`](crate::task::TaskContent) contract. The
//! engine never sees their internals and they never call back into the
//! engine.

pub mod apt;
pub mod apt_repository;
pub mod command;
pub mod copy;
pub mod debug;
pub mod file;
pub mod get_url;
pub mod include;
pub mod shell;
pub mod template;

use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::error::{Error, Result};
use crate::registry::TaskRegistry;

/// Register every built-in module under its canonical name and its
/// fully-qualified alias.
pub fn register_builtin(registry: &mut TaskRegistry) {
    registry.register::<command::CommandTask>("command", &["ansible.builtin.command"]);
    registry.register::<shell::ShellTask>("shell", &["ansible.builtin.shell"]);
    registry.register::<file::FileTask>("file", &["ansible.builtin.file"]);
    registry.register::<copy::CopyTask>("copy", &["ansible.builtin.copy"]);
    registry.register::<template::TemplateTask>("template", &["ansible.builtin.template"]);
    registry.register::<apt::AptTask>("apt", &["ansible.builtin.apt"]);
    registry.register::<apt_repository::AptRepositoryTask>(
        "apt_repository",
        &["ansible.builtin.apt_repository"],
    );
    registry.register::<get_url::GetUrlTask>("get_url", &["ansible.builtin.get_url"]);
    registry.register::<debug::DebugTask>("debug", &["ansible.builtin.debug"]);
    registry.register::<include::ImportTasks>("import_tasks", &["ansible.builtin.import_tasks"]);
    registry
        .register::<include::IncludeTasks>("include_tasks", &["ansible.builtin.include_tasks"]);
}

// ============================================================================
// Shared parameter helpers
// ============================================================================

/// Deserialize an optional scalar (string or number) into a string.
///
/// YAML file modes arrive either quoted (`mode: "0644"`) or as a bare
/// number; both normalize to their string spelling.
pub(crate) fn de_opt_scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(serde::de::Error::custom("expected a scalar")),
    }
}

/// Deserialize a string or a list of strings into a list.
pub(crate) fn de_string_or_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::String(s) => Ok(vec![s]),
        serde_yaml::Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| match v {
                serde_yaml::Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!(
                    "expected a string, got {other:?}"
                ))),
            })
            .collect(),
        _ => Err(serde::de::Error::custom("expected a string or a list")),
    }
}

/// Parse an octal mode string (`"0644"`, `"644"`) into permission bits.
pub(crate) fn parse_mode(module: &'static str, mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8)
        .map_err(|_| Error::invalid_parameter(module, format!("invalid mode '{mode}'")))
}

/// SHA-256 hex digest of a byte slice.
pub(crate) fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a file's content.
pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(sha256_bytes(&bytes))
}

/// Write `bytes` to `dest` atomically: through a temporary file in the
/// destination directory followed by a rename.
pub(crate) fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Apply mode, owner, and group to a path, reporting whether anything
/// changed. Attributes that are `None` are left alone.
pub(crate) fn apply_file_attrs(
    module: &'static str,
    path: &Path,
    mode: Option<&str>,
    owner: Option<&str>,
    group: Option<&str>,
) -> Result<bool> {
    let mut changed = false;

    if let Some(mode) = mode {
        let bits = parse_mode(module, mode)?;
        let current = fs::metadata(path)?.permissions().mode() & 0o7777;
        if current != bits {
            fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
            changed = true;
        }
    }

    let uid = match owner {
        Some(name) => Some(resolve_uid(module, name)?),
        None => None,
    };
    let gid = match group {
        Some(name) => Some(resolve_gid(module, name)?),
        None => None,
    };

    if uid.is_some() || gid.is_some() {
        let meta = fs::metadata(path)?;
        let needs_chown = uid.map(|u| u.as_raw() != meta.uid()).unwrap_or(false)
            || gid.map(|g| g.as_raw() != meta.gid()).unwrap_or(false);
        if needs_chown {
            nix::unistd::chown(path, uid, gid)
                .map_err(|e| Error::Io(std::io::Error::from(e)))?;
            changed = true;
        }
    }

    Ok(changed)
}

fn resolve_uid(module: &'static str, owner: &str) -> Result<nix::unistd::Uid> {
    if let Ok(raw) = owner.parse::<u32>() {
        return Ok(nix::unistd::Uid::from_raw(raw));
    }
    let user = nix::unistd::User::from_name(owner)
        .map_err(|e| Error::Io(std::io::Error::from(e)))?
        .ok_or_else(|| Error::invalid_parameter(module, format!("unknown owner '{owner}'")))?;
    Ok(user.uid)
}

fn resolve_gid(module: &'static str, group: &str) -> Result<nix::unistd::Gid> {
    if let Ok(raw) = group.parse::<u32>() {
        return Ok(nix::unistd::Gid::from_raw(raw));
    }
    let entry = nix::unistd::Group::from_name(group)
        .map_err(|e| Error::Io(std::io::Error::from(e)))?
        .ok_or_else(|| Error::invalid_parameter(module, format!("unknown group '{group}'")))?;
    Ok(entry.gid)
}
