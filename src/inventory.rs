//! Host and group inventory for Statecraft.
//!
//! An inventory is a tree of named groups. Each group holds direct hosts
//! (with optional host-level variables), group-level variables, and nested
//! child groups. Membership is transitive: a host listed anywhere in a
//! group's subtree is a member of that group, and every host is a member of
//! the implicit `all` group.
//!
//! Variable resolution walks every branch that contains the host, merging
//! group variables top-down so that a more deeply nested group overrides its
//! ancestors, and finally overrides the merged group variables with the
//! host-level variables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::scope::Scope;

/// The implicit group every host belongs to.
pub const ALL_GROUP: &str = "all";

/// A named node in the inventory tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Direct member hosts, mapping host name to optional host variables.
    pub hosts: IndexMap<String, Option<Scope>>,
    /// Group-level variables.
    pub vars: Scope,
    /// Nested child groups.
    pub children: IndexMap<String, Group>,
}

impl Group {
    /// Whether this group's subtree contains the host.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains_key(host) || self.children.values().any(|g| g.contains(host))
    }

    /// Collect every host name in this group's subtree.
    fn collect_hosts(&self, into: &mut BTreeSet<String>) {
        for host in self.hosts.keys() {
            into.insert(host.clone());
        }
        for child in self.children.values() {
            child.collect_hosts(into);
        }
    }
}

/// The host/group topology and per-host variable source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    /// Top-level named groups.
    pub groups: IndexMap<String, Group>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// An implicit single-host inventory for local execution.
    pub fn localhost() -> Self {
        let mut group = Group::default();
        group.hosts.insert("localhost".to_string(), None);
        let mut groups = IndexMap::new();
        groups.insert("ungrouped".to_string(), group);
        Self { groups }
    }

    /// Parse an inventory from YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load an inventory from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::InventoryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| Error::InventoryLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Names of all groups the host belongs to, transitively, including the
    /// implicit `all` group.
    pub fn find(&self, host: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for (name, group) in &self.groups {
            Self::find_in(name, group, host, &mut found);
        }
        found.insert(ALL_GROUP.to_string());
        found
    }

    fn find_in(name: &str, group: &Group, host: &str, found: &mut BTreeSet<String>) {
        if group.contains(host) {
            found.insert(name.to_string());
        }
        for (child_name, child) in &group.children {
            Self::find_in(child_name, child, host, found);
        }
    }

    /// Merged variables for a host.
    ///
    /// Group variables are contributed only by groups whose subtree contains
    /// the host, parent before child so the nearer group wins on conflict;
    /// contributions from every matching branch are merged. Host-level
    /// variables override everything.
    pub fn node_vars(&self, host: &str) -> Scope {
        let mut group_vars = Scope::new();
        let mut host_vars = Scope::new();
        for group in self.groups.values() {
            Self::collect_vars(group, host, &mut group_vars, &mut host_vars);
        }
        group_vars.merge(&host_vars);
        group_vars
    }

    fn collect_vars(group: &Group, host: &str, group_vars: &mut Scope, host_vars: &mut Scope) {
        if !group.contains(host) {
            return;
        }
        group_vars.merge(&group.vars);
        for child in group.children.values() {
            Self::collect_vars(child, host, group_vars, host_vars);
        }
        if let Some(Some(vars)) = group.hosts.get(host) {
            host_vars.merge(vars);
        }
    }

    /// Every host name in the inventory.
    pub fn hosts(&self) -> BTreeSet<String> {
        let mut hosts = BTreeSet::new();
        for group in self.groups.values() {
            group.collect_hosts(&mut hosts);
        }
        hosts
    }

    /// Hosts selected by a play's host pattern: `all`, a group name, or a
    /// single host name.
    pub fn hosts_matching(&self, pattern: &str) -> Vec<String> {
        if pattern == ALL_GROUP {
            return self.hosts().into_iter().collect();
        }
        let mut selected = BTreeSet::new();
        Self::match_groups(&self.groups, pattern, &mut selected);
        if selected.is_empty() && self.hosts().contains(pattern) {
            selected.insert(pattern.to_string());
        }
        selected.into_iter().collect()
    }

    fn match_groups(
        groups: &IndexMap<String, Group>,
        pattern: &str,
        selected: &mut BTreeSet<String>,
    ) {
        for (name, group) in groups {
            if name == pattern {
                group.collect_hosts(selected);
            }
            Self::match_groups(&group.children, pattern, selected);
        }
    }
}
