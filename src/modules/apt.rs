//! Apt module - Debian/Ubuntu package management.
//!
//! Installs, removes, and upgrades packages through `apt-get`, querying
//! installed state with `dpkg-query` so unchanged systems report no change.

use serde::Deserialize;
use std::any::Any;
use std::process::Command;

use crate::error::{Error, Result};
use crate::result::{CommonResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::de_string_or_seq;

/// Desired state for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AptState {
    Present,
    Absent,
    Latest,
}

impl AptState {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" | "installed" => Ok(AptState::Present),
            "absent" | "removed" => Ok(AptState::Absent),
            "latest" => Ok(AptState::Latest),
            _ => Err(Error::invalid_parameter(
                "apt",
                format!("invalid state '{s}'; valid states: present, absent, latest"),
            )),
        }
    }
}

/// Parameters of the apt module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AptTask {
    /// Package name or list of names.
    #[serde(alias = "pkg", deserialize_with = "de_string_or_seq")]
    pub name: Vec<String>,
    /// Desired state; defaults to `present`.
    pub state: Option<String>,
    /// Run `apt-get update` before the operation.
    pub update_cache: bool,
}

impl AptTask {
    fn state(&self) -> Result<AptState> {
        match &self.state {
            Some(s) => AptState::from_str(s),
            None => Ok(AptState::Present),
        }
    }

    fn is_installed(package: &str) -> bool {
        Command::new("dpkg-query")
            .args(["-W", "-f", "${Status}", package])
            .output()
            .map(|out| {
                out.status.success()
                    && String::from_utf8_lossy(&out.stdout).contains("install ok installed")
            })
            .unwrap_or(false)
    }

    fn apt_get(args: &[&str]) -> Result<()> {
        let output = Command::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args(args)
            .output()
            .map_err(|e| Error::task_failed("apt", e.to_string()))?;
        if !output.status.success() {
            return Err(Error::task_failed(
                "apt",
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }
}

impl Templatable for AptTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::ScalarList(&mut self.name),
            FieldMut::OptScalar(&mut self.state),
        ]
    }
}

impl TaskContent for AptTask {
    fn validate(&self) -> Result<()> {
        self.state()?;
        if self.name.is_empty() && !self.update_cache {
            return Err(Error::MissingParameter {
                module: "apt",
                parameter: "name",
            });
        }
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        if which::which("apt-get").is_err() {
            return Ok(Box::new(CommonResult::failed(
                "apt-get not found; the apt module requires a Debian-based system",
            )));
        }

        let state = self.state()?;

        // Work out what actually needs doing before touching the system.
        let pending: Vec<&String> = match state {
            AptState::Present => self
                .name
                .iter()
                .filter(|pkg| !Self::is_installed(pkg))
                .collect(),
            AptState::Absent => self
                .name
                .iter()
                .filter(|pkg| Self::is_installed(pkg))
                .collect(),
            AptState::Latest => self.name.iter().collect(),
        };

        let changed = self.update_cache || !pending.is_empty();
        if ctx.check_mode {
            let common = if changed {
                CommonResult::changed(format!("would process {} package(s)", pending.len()))
            } else {
                CommonResult::ok("packages already in desired state")
            };
            return Ok(Box::new(common));
        }

        if self.update_cache {
            Self::apt_get(&["update", "-q"])?;
        }

        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(|s| s.as_str()).collect();
            let mut args: Vec<&str> = match state {
                AptState::Present | AptState::Latest => vec!["install", "-y", "-q"],
                AptState::Absent => vec!["remove", "-y", "-q"],
            };
            args.extend(names);
            Self::apt_get(&args)?;
        }

        let common = if changed {
            CommonResult::changed(format!("processed {} package(s)", pending.len()))
        } else {
            CommonResult::ok("packages already in desired state")
        };
        Ok(Box::new(common))
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
