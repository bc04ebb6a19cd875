//! Task model for Statecraft.
//!
//! A [`Task`] is one declarative unit of work: an optional name, an optional
//! `when` condition, an optional `loop` specification, an optional `register`
//! binding, and exactly one module's parameters (the content). Content is
//! polymorphic over the [`TaskContent`] capability set; the concrete type is
//! selected at decode time through the [`TaskRegistry`].
//!
//! [`TaskRegistry`]: crate::registry::TaskRegistry

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::TaskRegistry;
use crate::result::TaskResult;
use crate::scope::{Scope, Value};
use crate::template::{DynamicValue, Templatable};

/// Task envelope keys that are not module names.
const RESERVED_KEYS: &[&str] = &["name", "when", "loop", "register"];

/// Ambient execution state handed to every module apply call.
///
/// Carries the path-resolution roots and the check-mode flag. The variable
/// scope is deliberately *not* part of the context; it is passed as an
/// explicit parameter through the whole call chain.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Directory the playbook was loaded from; relative source paths resolve
    /// against it outside of roles.
    pub base_dir: Option<PathBuf>,
    /// Directory of the role the current task came from, when any. Affects
    /// relative source resolution for `copy`/`template` (`files/`,
    /// `templates/`) and nested task files (`tasks/`).
    pub role_dir: Option<PathBuf>,
    /// Default working directory for command-like modules.
    pub work_dir: Option<PathBuf>,
    /// When set, modules report what they would do without side effects.
    pub check_mode: bool,
}

impl ExecutionContext {
    /// Create a context with no path roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current task originates from a role.
    pub fn from_role(&self) -> bool {
        self.role_dir.is_some()
    }

    /// Resolve a `copy` source path (role `files/` or playbook directory).
    pub fn resolve_files(&self, src: &str) -> PathBuf {
        self.resolve(src, "files")
    }

    /// Resolve a `template` source path (role `templates/` or playbook
    /// directory).
    pub fn resolve_templates(&self, src: &str) -> PathBuf {
        self.resolve(src, "templates")
    }

    /// Resolve a nested task-file path (role `tasks/` or playbook directory).
    pub fn resolve_tasks(&self, file: &str) -> PathBuf {
        self.resolve(file, "tasks")
    }

    fn resolve(&self, src: &str, role_subdir: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        if let Some(role) = &self.role_dir {
            return role.join(role_subdir).join(src);
        }
        match &self.base_dir {
            Some(base) => base.join(src),
            None => path.to_path_buf(),
        }
    }
}

/// The capability set every module's parameter payload implements.
///
/// Modules are leaves: they validate their own parameters, perform one
/// idempotent side effect, and report a result. They never call back into
/// the engine.
pub trait TaskContent: Templatable + fmt::Debug + Send {
    /// Check parameters for structural validity before any side effect.
    fn validate(&self) -> Result<()>;

    /// Perform the operation against the given scope and context.
    ///
    /// Operation-level failures (non-zero exit codes, HTTP errors) are
    /// reported on the returned result with `failed` set; `Err` is reserved
    /// for failures that preclude producing a result at all.
    fn apply(&self, scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>>;

    /// Produce an owned deep copy of this content.
    ///
    /// Loop iterations run against clones so that renders and mutations in
    /// one iteration never leak into another or into the original task.
    fn clone_content(&self) -> Box<dyn TaskContent>;

    /// Downcasting support for engine-level content inspection.
    fn as_any(&self) -> &dyn Any;
}

/// One declarative step of a play.
#[derive(Debug)]
pub struct Task {
    /// Optional display name.
    pub name: Option<String>,
    /// Optional condition expression; absent means "always run".
    pub when: Option<String>,
    /// Optional loop specification, rendered before iteration.
    pub loop_spec: DynamicValue,
    /// Optional variable name the result is registered under.
    pub register: Option<String>,
    /// Canonical module name this task was decoded as.
    pub module: String,
    /// The module's parameter payload.
    pub content: Box<dyn TaskContent>,
}

impl Task {
    /// Construct a task around existing content (used by tests and
    /// programmatic callers; playbooks go through [`Task::from_value`]).
    pub fn new(module: impl Into<String>, content: Box<dyn TaskContent>) -> Self {
        Self {
            name: None,
            when: None,
            loop_spec: DynamicValue::Unset,
            register: None,
            module: module.into(),
            content,
        }
    }

    /// Set the task name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `when` condition.
    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    /// Set the loop specification.
    pub fn with_loop(mut self, loop_spec: DynamicValue) -> Self {
        self.loop_spec = loop_spec;
        self
    }

    /// Set the register binding.
    pub fn with_register(mut self, register: impl Into<String>) -> Self {
        self.register = Some(register.into());
        self
    }

    /// Display label: the task name when present, otherwise the module name.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.module)
    }

    /// Decode one task from a YAML mapping.
    ///
    /// The mapping may contain the reserved envelope keys plus exactly one
    /// recognized module-name key holding that module's parameters. An
    /// unrecognized module name is an error, as is a mapping with zero or
    /// more than one module key.
    pub fn from_value(value: &Value, registry: &TaskRegistry) -> Result<Self> {
        let map = value
            .as_mapping()
            .ok_or_else(|| Error::TaskDecode("task must be a mapping".to_string()))?;

        let mut name = None;
        let mut when = None;
        let mut loop_spec = DynamicValue::Unset;
        let mut register = None;
        let mut module_entry: Option<(&str, &Value)> = None;

        for (key, val) in map {
            let key = key
                .as_str()
                .ok_or_else(|| Error::TaskDecode("task keys must be strings".to_string()))?;
            match key {
                "name" => name = decode_scalar_string(val, "name")?,
                "when" => when = decode_scalar_string(val, "when")?,
                "loop" => loop_spec = DynamicValue::from_value(val.clone()),
                "register" => register = decode_scalar_string(val, "register")?,
                _ => {
                    if let Some((previous, _)) = module_entry {
                        return Err(Error::TaskDecode(format!(
                            "task declares more than one module: '{previous}' and '{key}'"
                        )));
                    }
                    module_entry = Some((key, val));
                }
            }
        }

        let (module_name, args) = module_entry.ok_or_else(|| {
            Error::TaskDecode(format!(
                "task '{}' does not declare a module",
                name.as_deref().unwrap_or("<unnamed>")
            ))
        })?;

        let registration = registry
            .lookup(module_name)
            .ok_or_else(|| Error::UnknownModule(module_name.to_string()))?;
        let content = registration.parse(args.clone())?;

        Ok(Self {
            name,
            when,
            loop_spec,
            register,
            module: registration.name().to_string(),
            content,
        })
    }

    /// Decode an ordered task list from a YAML document.
    ///
    /// An empty document yields an empty list.
    pub fn parse_list(content: &str, registry: &TaskRegistry) -> Result<Vec<Self>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: Value = serde_yaml::from_str(content)?;
        match doc {
            Value::Null => Ok(Vec::new()),
            Value::Sequence(items) => items
                .iter()
                .map(|item| Self::from_value(item, registry))
                .collect(),
            _ => Err(Error::TaskDecode(
                "task file must contain a list of tasks".to_string(),
            )),
        }
    }

    /// Load and decode a task list from a file.
    pub fn load_file(path: &Path, registry: &TaskRegistry) -> Result<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_list(&content, registry)
    }
}

impl Clone for Task {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            when: self.when.clone(),
            loop_spec: self.loop_spec.clone(),
            register: self.register.clone(),
            module: self.module.clone(),
            content: self.content.clone_content(),
        }
    }
}

/// Decode a scalar envelope value into a string.
///
/// Booleans and numbers are accepted for `when` ergonomics (`when: true`).
fn decode_scalar_string(value: &Value, key: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(Error::TaskDecode(format!("'{key}' must be a scalar"))),
    }
}

/// Reserved envelope keys, exposed for the playbook decoder.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
