//! File module - file and directory state management.
//!
//! Manages file and directory state: creation, deletion, touch semantics,
//! symbolic links, and permission/ownership attributes.

use filetime::FileTime;
use serde::Deserialize;
use std::any::Any;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use crate::error::{Error, Result};
use crate::result::{CommonResult, FileResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::{apply_file_attrs, de_opt_scalar};

/// Desired state for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// The path must exist as a regular file (attributes only).
    File,
    /// The path must exist as a directory.
    Directory,
    /// Create the file if absent and update its timestamps.
    Touch,
    /// The path must not exist.
    Absent,
    /// The path must be a symbolic link to `src`.
    Link,
}

impl FileState {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(FileState::File),
            "directory" => Ok(FileState::Directory),
            "touch" => Ok(FileState::Touch),
            "absent" => Ok(FileState::Absent),
            "link" => Ok(FileState::Link),
            _ => Err(Error::invalid_parameter(
                "file",
                format!("invalid state '{s}'; valid states: file, directory, touch, absent, link"),
            )),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FileState::File => "file",
            FileState::Directory => "directory",
            FileState::Touch => "touch",
            FileState::Absent => "absent",
            FileState::Link => "link",
        }
    }
}

/// Parameters of the file module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileTask {
    /// Path to manage.
    #[serde(alias = "dest", alias = "name")]
    pub path: String,
    /// Desired state; defaults to `file`.
    pub state: Option<String>,
    /// Permission bits as an octal string.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub mode: Option<String>,
    /// Owner user name or uid.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub owner: Option<String>,
    /// Owner group name or gid.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub group: Option<String>,
    /// Link target, for `state: link`.
    pub src: Option<String>,
}

impl FileTask {
    fn state(&self) -> Result<FileState> {
        match &self.state {
            Some(s) => FileState::from_str(s),
            None => Ok(FileState::File),
        }
    }

    fn result(&self, common: CommonResult, state: FileState) -> FileResult {
        let mut result = FileResult::new(common).with_path(&self.path);
        result.state = Some(state.name().to_string());
        result.mode = self.mode.clone();
        result.owner = self.owner.clone();
        result.group = self.group.clone();
        result
    }
}

impl Templatable for FileTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::Scalar(&mut self.path),
            FieldMut::OptScalar(&mut self.state),
            FieldMut::OptScalar(&mut self.mode),
            FieldMut::OptScalar(&mut self.owner),
            FieldMut::OptScalar(&mut self.group),
            FieldMut::OptScalar(&mut self.src),
        ]
    }
}

impl TaskContent for FileTask {
    fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::MissingParameter {
                module: "file",
                parameter: "path",
            });
        }
        let state = self.state()?;
        if state == FileState::Link && self.src.is_none() {
            return Err(Error::MissingParameter {
                module: "file",
                parameter: "src",
            });
        }
        if let Some(mode) = &self.mode {
            super::parse_mode("file", mode)?;
        }
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let state = self.state()?;
        let path = Path::new(&self.path);

        if ctx.check_mode {
            return Ok(Box::new(self.result(
                CommonResult::changed(format!("would ensure state {}", state.name())),
                state,
            )));
        }

        let mut changed = false;

        match state {
            FileState::Absent => {
                if path.symlink_metadata().is_ok() {
                    if path.is_dir() {
                        fs::remove_dir_all(path)?;
                    } else {
                        fs::remove_file(path)?;
                    }
                    changed = true;
                }
                return Ok(Box::new(self.result(
                    if changed {
                        CommonResult::changed("removed")
                    } else {
                        CommonResult::ok("already absent")
                    },
                    state,
                )));
            }
            FileState::Touch => {
                if !path.exists() {
                    fs::OpenOptions::new()
                        .create(true)
                        .truncate(false)
                        .write(true)
                        .open(path)?;
                    changed = true;
                } else {
                    let now = FileTime::now();
                    filetime::set_file_times(path, now, now)?;
                    changed = true;
                }
            }
            FileState::File => {
                if !path.is_file() {
                    return Ok(Box::new(self.result(
                        CommonResult::failed(format!(
                            "file '{}' does not exist; use state=touch to create it",
                            self.path
                        )),
                        state,
                    )));
                }
            }
            FileState::Directory => {
                if !path.is_dir() {
                    fs::create_dir_all(path)?;
                    changed = true;
                }
            }
            FileState::Link => {
                let target = self.src.as_deref().unwrap_or_default();
                match fs::read_link(path) {
                    Ok(existing) if existing == Path::new(target) => {}
                    Ok(_) => {
                        fs::remove_file(path)?;
                        symlink(target, path)?;
                        changed = true;
                    }
                    Err(_) => {
                        symlink(target, path)?;
                        changed = true;
                    }
                }
            }
        }

        if state != FileState::Link {
            changed |= apply_file_attrs(
                "file",
                path,
                self.mode.as_deref(),
                self.owner.as_deref(),
                self.group.as_deref(),
            )?;
        }

        let common = if changed {
            CommonResult::changed(format!("state {} applied", state.name()))
        } else {
            CommonResult::ok("already in desired state")
        };
        Ok(Box::new(self.result(common, state)))
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
