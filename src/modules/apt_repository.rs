//! Apt repository module - manage APT source list entries.
//!
//! Ensures a `deb`/`deb-src` line is present in (or absent from) a file
//! under `sources.list.d`. The target file name derives from the repository
//! line unless `filename` is given.

use serde::Deserialize;
use std::any::Any;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::result::{CommonResult, FileResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::atomic_write;

const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Parameters of the apt_repository module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AptRepositoryTask {
    /// Repository line, e.g. `deb http://archive.ubuntu.com/ubuntu noble main`.
    pub repo: String,
    /// `present` (default) or `absent`.
    pub state: Option<String>,
    /// Base name of the sources file; derived from the repo when omitted.
    pub filename: Option<String>,
}

impl AptRepositoryTask {
    fn present(&self) -> Result<bool> {
        match self.state.as_deref() {
            None | Some("present") => Ok(true),
            Some("absent") => Ok(false),
            Some(other) => Err(Error::invalid_parameter(
                "apt_repository",
                format!("invalid state '{other}'; valid states: present, absent"),
            )),
        }
    }

    /// The sources file the repository line lives in.
    pub(crate) fn sources_file(&self) -> PathBuf {
        let name = match &self.filename {
            Some(name) => name.clone(),
            None => slugify(&self.repo),
        };
        PathBuf::from(SOURCES_DIR).join(format!("{name}.list"))
    }
}

/// Derive a file-name slug from a repository line, the way Ansible does:
/// strip the type/options, keep host and path characters.
pub(crate) fn slugify(repo: &str) -> String {
    let meaningful: Vec<&str> = repo
        .split_whitespace()
        .filter(|word| !word.starts_with("deb") && !word.starts_with('['))
        .collect();
    let joined = meaningful.join("_");
    let cleaned: String = joined
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').to_string()
}

impl Templatable for AptRepositoryTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::Scalar(&mut self.repo),
            FieldMut::OptScalar(&mut self.state),
            FieldMut::OptScalar(&mut self.filename),
        ]
    }
}

impl TaskContent for AptRepositoryTask {
    fn validate(&self) -> Result<()> {
        if self.repo.is_empty() {
            return Err(Error::MissingParameter {
                module: "apt_repository",
                parameter: "repo",
            });
        }
        self.present()?;
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let present = self.present()?;
        let path = self.sources_file();
        let line = self.repo.trim();

        let existing = fs::read_to_string(&path).unwrap_or_default();
        let has_line = existing.lines().any(|l| l.trim() == line);

        let changed = present != has_line;
        if ctx.check_mode || !changed {
            let msg = if changed {
                "would update repository"
            } else {
                "repository already in desired state"
            };
            let mut common = CommonResult::ok(msg);
            common.changed = ctx.check_mode && changed;
            let mut result = FileResult::new(common);
            result.path = Some(path.display().to_string());
            return Ok(Box::new(result));
        }

        if present {
            let mut content = existing;
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(line);
            content.push('\n');
            atomic_write(&path, content.as_bytes())?;
        } else {
            let remaining: Vec<&str> = existing
                .lines()
                .filter(|l| l.trim() != line)
                .collect();
            if remaining.iter().all(|l| l.trim().is_empty()) {
                fs::remove_file(&path)?;
            } else {
                let mut content = remaining.join("\n");
                content.push('\n');
                atomic_write(&path, content.as_bytes())?;
            }
        }

        let mut result = FileResult::new(CommonResult::changed("repository updated"));
        result.path = Some(path.display().to_string());
        Ok(Box::new(result))
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        let slug = slugify("deb http://archive.ubuntu.com/ubuntu noble main");
        assert!(!slug.is_empty());
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(!slug.starts_with('_'));
    }

    #[test]
    fn test_sources_file_uses_filename() {
        let task = AptRepositoryTask {
            repo: "deb http://example.com stable main".to_string(),
            filename: Some("example".to_string()),
            ..Default::default()
        };
        assert_eq!(
            task.sources_file(),
            PathBuf::from("/etc/apt/sources.list.d/example.list")
        );
    }

    #[test]
    fn test_validate() {
        assert!(AptRepositoryTask::default().validate().is_err());

        let task = AptRepositoryTask {
            repo: "deb http://example.com stable main".to_string(),
            state: Some("sideways".to_string()),
            ..Default::default()
        };
        assert!(task.validate().is_err());

        let task = AptRepositoryTask {
            repo: "deb http://example.com stable main".to_string(),
            ..Default::default()
        };
        assert!(task.validate().is_ok());
    }
}
