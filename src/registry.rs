//! Task-type registry for Statecraft.
//!
//! The registry maps module-name discriminants (and their aliases, such as
//! fully-qualified `ansible.builtin.*` names) to the factory that decodes a
//! task's parameter payload into its concrete [`TaskContent`] type. It is an
//! explicit value constructed once at startup and passed into the playbook
//! decoder and the execution engine; there is no process-global state.
//!
//! Registration must be complete before any decoding or dispatch happens.
//! Registering two different content types under the same discriminant is a
//! programming error (caught by a debug assertion), not a runtime condition.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::modules;
use crate::scope::Value;
use crate::task::TaskContent;

/// One registered task type.
pub struct Registration {
    name: String,
    aliases: Vec<String>,
    type_id: TypeId,
    parse: fn(Value) -> Result<Box<dyn TaskContent>>,
    empty: fn() -> Box<dyn TaskContent>,
}

impl Registration {
    /// The canonical module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternate discriminants that resolve to this registration.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Decode a parameter payload into the registered content type.
    pub fn parse(&self, args: Value) -> Result<Box<dyn TaskContent>> {
        (self.parse)(args)
    }

    /// Produce an empty content value of the registered type.
    pub fn empty(&self) -> Box<dyn TaskContent> {
        (self.empty)()
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish()
    }
}

fn parse_content<T>(args: Value) -> Result<Box<dyn TaskContent>>
where
    T: TaskContent + Default + DeserializeOwned + 'static,
{
    // A bare module key (`- debug:`) decodes as null and means "defaults".
    if args.is_null() {
        return Ok(Box::new(T::default()));
    }
    let content: T =
        serde_yaml::from_value(args).map_err(|e| Error::TaskDecode(e.to_string()))?;
    Ok(Box::new(content))
}

fn empty_content<T>() -> Box<dyn TaskContent>
where
    T: TaskContent + Default + 'static,
{
    Box::new(T::default())
}

/// Explicit registry of task types.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    by_name: HashMap<String, Arc<Registration>>,
    by_type: HashMap<TypeId, Arc<Registration>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in modules registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        modules::register_builtin(&mut registry);
        registry
    }

    /// Register a content type under a canonical name plus aliases.
    pub fn register<T>(&mut self, name: &str, aliases: &[&str])
    where
        T: TaskContent + Default + DeserializeOwned + 'static,
    {
        let registration = Arc::new(Registration {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            type_id: TypeId::of::<T>(),
            parse: parse_content::<T>,
            empty: empty_content::<T>,
        });

        self.insert_name(name, registration.clone());
        for alias in aliases {
            self.insert_name(alias, registration.clone());
        }
        self.by_type.insert(TypeId::of::<T>(), registration);
    }

    fn insert_name(&mut self, name: &str, registration: Arc<Registration>) {
        if let Some(existing) = self.by_name.get(name) {
            debug_assert!(
                existing.type_id == registration.type_id,
                "conflicting registration for module '{name}'"
            );
            tracing::warn!(module = name, "module registered twice; keeping last");
        }
        self.by_name.insert(name.to_string(), registration);
    }

    /// Look up a registration by discriminant (canonical name or alias).
    pub fn lookup(&self, name: &str) -> Option<Arc<Registration>> {
        self.by_name.get(name).cloned()
    }

    /// Look up the registration for an existing content value's type.
    pub fn lookup_by_type(&self, content: &dyn TaskContent) -> Option<Arc<Registration>> {
        self.by_type.get(&content.as_any().type_id()).cloned()
    }

    /// Whether a discriminant is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All registered canonical names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_type
            .values()
            .map(|r| r.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registrations() {
        let registry = TaskRegistry::builtin();
        for name in [
            "command",
            "shell",
            "file",
            "copy",
            "template",
            "apt",
            "apt_repository",
            "get_url",
            "debug",
            "import_tasks",
            "include_tasks",
        ] {
            assert!(registry.contains(name), "missing builtin module {name}");
            assert!(
                registry.contains(&format!("ansible.builtin.{name}")),
                "missing builtin alias for {name}"
            );
        }
    }

    #[test]
    fn test_alias_resolves_to_same_registration() {
        let registry = TaskRegistry::builtin();
        let canonical = registry.lookup("copy").unwrap();
        let alias = registry.lookup("ansible.builtin.copy").unwrap();
        assert!(Arc::ptr_eq(&canonical, &alias));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = TaskRegistry::builtin();
        assert!(registry.lookup("no_such_module").is_none());
    }

    #[test]
    fn test_lookup_by_type() {
        let registry = TaskRegistry::builtin();
        let content = registry.lookup("command").unwrap().empty();
        let found = registry.lookup_by_type(content.as_ref()).unwrap();
        assert_eq!(found.name(), "command");
    }

    #[test]
    fn test_empty_factory_produces_default() {
        let registry = TaskRegistry::builtin();
        let content = registry.lookup("file").unwrap().empty();
        assert!(content.validate().is_err(), "default file content lacks a path");
    }
}
