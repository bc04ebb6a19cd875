//! Playbook parsing and execution for Statecraft.
//!
//! A playbook is a YAML sequence of plays; each play maps a host pattern to
//! variables, roles, and tasks. The runner resolves the per-host scope
//! (role defaults, then inventory variables, then play variables, then role
//! variables, then extra variables), runs each role's tasks, and finally the
//! play's own tasks — one host at a time, strictly in order.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::registry::TaskRegistry;
use crate::result::TaskResult;
use crate::roles::{self, RoleVars};
use crate::scope::{Scope, Value};
use crate::task::{ExecutionContext, Task};

/// A playbook containing one or more plays.
#[derive(Debug)]
pub struct Playbook {
    /// Name derived from the source file, when loaded from disk.
    pub name: Option<String>,
    /// The plays, in declaration order.
    pub plays: Vec<Play>,
    /// Path the playbook was loaded from.
    pub source_path: Option<PathBuf>,
}

impl Playbook {
    /// Load a playbook from a YAML file.
    pub fn from_file(path: &Path, registry: &TaskRegistry) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::PlaybookParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut playbook = Self::from_yaml(&content, registry).map_err(|e| match e {
            Error::PlaybookParse { message, .. } => Error::PlaybookParse {
                path: path.to_path_buf(),
                message,
            },
            other => Error::PlaybookParse {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
        playbook.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string());
        playbook.source_path = Some(path.to_path_buf());
        Ok(playbook)
    }

    /// Parse a playbook from a YAML string.
    pub fn from_yaml(content: &str, registry: &TaskRegistry) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(content)?;
        let play_values = match doc {
            Value::Null => Vec::new(),
            Value::Sequence(seq) => seq,
            mapping @ Value::Mapping(_) => vec![mapping],
            _ => {
                return Err(Error::PlaybookParse {
                    path: PathBuf::from("<string>"),
                    message: "a playbook must be a list of plays".to_string(),
                })
            }
        };

        let plays = play_values
            .iter()
            .map(|value| Play::from_value(value, registry))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: None,
            plays,
            source_path: None,
        })
    }

    /// The directory relative paths resolve against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
    }

    /// Total number of tasks across all plays (excluding role tasks).
    pub fn task_count(&self) -> usize {
        self.plays.iter().map(|p| p.tasks.len()).sum()
    }
}

/// A play: a host pattern plus the work to do on the selected hosts.
#[derive(Debug)]
pub struct Play {
    /// Display name.
    pub name: String,
    /// Host pattern: `all`, a group name, or a host name.
    pub hosts: String,
    /// Play-level variables.
    pub vars: Scope,
    /// Role names to apply before the play's own tasks.
    pub roles: Vec<String>,
    /// The play's tasks, in declaration order.
    pub tasks: Vec<Task>,
}

impl Play {
    /// Decode one play from a YAML mapping.
    pub fn from_value(value: &Value, registry: &TaskRegistry) -> Result<Self> {
        let map = value.as_mapping().ok_or_else(|| Error::PlaybookParse {
            path: PathBuf::from("<string>"),
            message: "a play must be a mapping".to_string(),
        })?;

        let mut name = String::new();
        let mut hosts = None;
        let mut vars = Scope::new();
        let mut roles = Vec::new();
        let mut tasks = Vec::new();

        for (key, val) in map {
            let key = key.as_str().unwrap_or_default();
            match key {
                "name" => name = val.as_str().unwrap_or_default().to_string(),
                "hosts" => {
                    hosts = val.as_str().map(str::to_string);
                }
                "vars" => vars = serde_yaml::from_value(val.clone())?,
                "roles" => {
                    let entries = val.as_sequence().ok_or_else(|| Error::PlaybookParse {
                        path: PathBuf::from("<string>"),
                        message: "'roles' must be a list".to_string(),
                    })?;
                    for entry in entries {
                        match entry.as_str() {
                            Some(role) => roles.push(role.to_string()),
                            None => {
                                return Err(Error::PlaybookParse {
                                    path: PathBuf::from("<string>"),
                                    message: "role entries must be names".to_string(),
                                })
                            }
                        }
                    }
                }
                "tasks" => {
                    let entries = val.as_sequence().ok_or_else(|| Error::PlaybookParse {
                        path: PathBuf::from("<string>"),
                        message: "'tasks' must be a list".to_string(),
                    })?;
                    for entry in entries {
                        tasks.push(Task::from_value(entry, registry)?);
                    }
                }
                other => warn!(key = other, "ignoring unsupported play keyword"),
            }
        }

        Ok(Self {
            name,
            hosts: hosts.ok_or_else(|| Error::PlaybookParse {
                path: PathBuf::from("<string>"),
                message: "a play must specify hosts".to_string(),
            })?,
            vars,
            roles,
            tasks,
        })
    }
}

/// Per-host tally of task outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostRecap {
    /// Tasks that ran without changing anything.
    pub ok: usize,
    /// Tasks that changed the host.
    pub changed: usize,
    /// Tasks skipped by their condition.
    pub skipped: usize,
    /// Tasks that failed.
    pub failed: usize,
}

impl HostRecap {
    fn record(&mut self, result: &dyn TaskResult) {
        if result.is_skipped() {
            self.skipped += 1;
        } else if result.is_changed() {
            self.changed += 1;
        } else {
            self.ok += 1;
        }
    }
}

/// Options for a playbook run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict execution to this host.
    pub limit: Option<String>,
    /// Highest-precedence variables from the command line.
    pub extra_vars: Scope,
    /// Report without applying changes.
    pub check_mode: bool,
}

/// Runs playbooks host by host.
pub struct PlaybookRunner<'r> {
    registry: &'r TaskRegistry,
    inventory: Inventory,
    options: RunOptions,
}

impl<'r> PlaybookRunner<'r> {
    /// Create a runner over an inventory.
    pub fn new(registry: &'r TaskRegistry, inventory: Inventory) -> Self {
        Self {
            registry,
            inventory,
            options: RunOptions::default(),
        }
    }

    /// Replace the run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every play against its selected hosts.
    ///
    /// A failing task ends that host's run and moves on to the next host;
    /// the recap records the failure.
    pub fn run(&self, playbook: &Playbook) -> Result<IndexMap<String, HostRecap>> {
        let mut recap: IndexMap<String, HostRecap> = IndexMap::new();

        for play in &playbook.plays {
            let mut hosts = self.inventory.hosts_matching(&play.hosts);
            if let Some(limit) = &self.options.limit {
                hosts.retain(|h| h == limit);
            }
            info!(play = %play.name, hosts = hosts.len(), "starting play");

            for host in hosts {
                let entry = recap.entry(host.clone()).or_default();
                if let Err(e) = self.run_host(playbook, play, &host, entry) {
                    warn!(host = %host, error = %e, "host run failed");
                    entry.failed += 1;
                }
            }
        }

        Ok(recap)
    }

    /// Run one play on one host.
    fn run_host(
        &self,
        playbook: &Playbook,
        play: &Play,
        host: &str,
        recap: &mut HostRecap,
    ) -> Result<()> {
        let base_dir = playbook.base_dir();

        // Load every role up front so defaults can sit below inventory vars.
        let mut role_dirs = Vec::with_capacity(play.roles.len());
        let mut role_vars = Vec::with_capacity(play.roles.len());
        for role in &play.roles {
            let dir = base_dir
                .as_ref()
                .map(|b| b.join("roles").join(role))
                .unwrap_or_else(|| PathBuf::from("roles").join(role));
            if !roles::is_role(&dir) {
                return Err(Error::RoleNotFound(role.clone()));
            }
            role_vars.push(roles::load_role_vars(&dir)?);
            role_dirs.push(dir);
        }

        // Scope layering, lowest precedence first.
        let mut scope = Scope::new();
        for RoleVars { defaults, .. } in &role_vars {
            scope.merge(defaults);
        }
        scope.merge(&self.inventory.node_vars(host));
        scope.merge(&play.vars);
        for RoleVars { vars, .. } in &role_vars {
            scope.merge(vars);
        }
        scope.merge(&self.options.extra_vars);
        scope.set(
            "inventory_hostname",
            Value::String(host.to_string()),
        );

        // Role tasks first, each with its role directory as path root.
        for (dir, role) in role_dirs.iter().zip(&play.roles) {
            let ctx = ExecutionContext {
                base_dir: base_dir.clone(),
                role_dir: Some(dir.clone()),
                check_mode: self.options.check_mode,
                ..Default::default()
            };
            let engine = Engine::new(self.registry).with_context(ctx);
            let tasks = roles::load_role_tasks(dir, self.registry)?;
            info!(role = %role, host = %host, tasks = tasks.len(), "applying role");
            for task in &tasks {
                let result = engine.run_task(task, &mut scope)?;
                recap.record(result.as_ref());
            }
        }

        // Then the play's own tasks.
        let ctx = ExecutionContext {
            base_dir,
            check_mode: self.options.check_mode,
            ..Default::default()
        };
        let engine = Engine::new(self.registry).with_context(ctx);
        for task in &play.tasks {
            let result = engine.run_task(task, &mut scope)?;
            recap.record(result.as_ref());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TaskRegistry {
        TaskRegistry::builtin()
    }

    #[test]
    fn test_parse_playbook() {
        let registry = registry();
        let playbook = Playbook::from_yaml(
            r#"
- name: First play
  hosts: all
  vars:
    greeting: hi
  tasks:
    - name: Say it
      debug:
        msg: "{{ greeting }}"
"#,
            &registry,
        )
        .unwrap();
        assert_eq!(playbook.plays.len(), 1);
        assert_eq!(playbook.plays[0].name, "First play");
        assert_eq!(playbook.plays[0].tasks.len(), 1);
        assert!(playbook.plays[0].vars.contains("greeting"));
    }

    #[test]
    fn test_play_requires_hosts() {
        let registry = registry();
        let result = Playbook::from_yaml("- name: no hosts\n  tasks: []\n", &registry);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_module_fails_parse() {
        let registry = registry();
        let result = Playbook::from_yaml(
            "- hosts: all\n  tasks:\n    - frob: {x: 1}\n",
            &registry,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_run_simple_play() {
        let registry = registry();
        let playbook = Playbook::from_yaml(
            r#"
- hosts: all
  tasks:
    - debug:
        msg: "on {{ inventory_hostname }}"
"#,
            &registry,
        )
        .unwrap();

        let runner = PlaybookRunner::new(&registry, Inventory::localhost());
        let recap = runner.run(&playbook).unwrap();
        assert_eq!(recap.get("localhost"), Some(&HostRecap { ok: 1, ..Default::default() }));
    }

    #[test]
    fn test_extra_vars_have_highest_precedence() {
        let registry = registry();
        let playbook = Playbook::from_yaml(
            r#"
- hosts: all
  vars:
    color: play
  tasks:
    - debug:
        msg: "{{ color }}"
      register: seen
    - debug:
        msg: "{{ seen.msg }}"
"#,
            &registry,
        )
        .unwrap();

        let mut extra = Scope::new();
        extra.set("color", Value::String("extra".to_string()));
        let runner = PlaybookRunner::new(&registry, Inventory::localhost())
            .with_options(RunOptions {
                extra_vars: extra,
                ..Default::default()
            });
        let recap = runner.run(&playbook).unwrap();
        assert_eq!(recap.get("localhost").unwrap().ok, 2);
    }
}
