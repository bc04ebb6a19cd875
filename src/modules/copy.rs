//! Copy module - copy files or inline content to a destination.
//!
//! Copies a source file (resolved relative to the role's `files/` directory
//! or the playbook directory) or literal `content` to a destination path.
//! The copy is skipped when the destination already has identical content;
//! writes go through a temporary file and a rename.

use serde::Deserialize;
use std::any::Any;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::result::{CommonResult, FileResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::{apply_file_attrs, atomic_write, de_opt_scalar, sha256_bytes, sha256_file};

/// Parameters of the copy module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyTask {
    /// Source file path; mutually exclusive with `content`.
    pub src: Option<String>,
    /// Literal content to write; mutually exclusive with `src`.
    pub content: Option<String>,
    /// Destination path.
    pub dest: String,
    /// Permission bits as an octal string.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub mode: Option<String>,
    /// Owner user name or uid.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub owner: Option<String>,
    /// Owner group name or gid.
    #[serde(deserialize_with = "de_opt_scalar")]
    pub group: Option<String>,
    /// Keep a `~`-suffixed backup of a replaced destination.
    pub backup: bool,
}

impl CopyTask {
    /// The bytes to place at the destination.
    fn source_bytes(&self, ctx: &ExecutionContext) -> Result<Vec<u8>> {
        if let Some(content) = &self.content {
            return Ok(content.as_bytes().to_vec());
        }
        let src = self.src.as_deref().unwrap_or_default();
        let path = ctx.resolve_files(src);
        fs::read(&path).map_err(|e| {
            Error::task_failed("copy", format!("cannot read source '{}': {e}", path.display()))
        })
    }

    fn result(&self, common: CommonResult, checksum: Option<String>) -> FileResult {
        let mut result = FileResult::new(common).with_dest(&self.dest);
        result.checksum = checksum;
        result.mode = self.mode.clone();
        result.owner = self.owner.clone();
        result.group = self.group.clone();
        result
    }
}

impl Templatable for CopyTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::OptScalar(&mut self.src),
            FieldMut::OptScalar(&mut self.content),
            FieldMut::Scalar(&mut self.dest),
            FieldMut::OptScalar(&mut self.mode),
            FieldMut::OptScalar(&mut self.owner),
            FieldMut::OptScalar(&mut self.group),
        ]
    }
}

impl TaskContent for CopyTask {
    fn validate(&self) -> Result<()> {
        if self.dest.is_empty() {
            return Err(Error::MissingParameter {
                module: "copy",
                parameter: "dest",
            });
        }
        match (&self.src, &self.content) {
            (None, None) => Err(Error::invalid_parameter(
                "copy",
                "either 'src' or 'content' must be provided",
            )),
            (Some(_), Some(_)) => Err(Error::invalid_parameter(
                "copy",
                "'src' and 'content' are mutually exclusive",
            )),
            _ => Ok(()),
        }
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let bytes = self.source_bytes(ctx)?;
        let checksum = sha256_bytes(&bytes);
        let dest = Path::new(&self.dest);

        let needs_write = match sha256_file(dest) {
            Ok(existing) => existing != checksum,
            Err(_) => true,
        };

        if ctx.check_mode {
            let common = if needs_write {
                CommonResult::changed("would copy")
            } else {
                CommonResult::ok("already up to date")
            };
            return Ok(Box::new(self.result(common, Some(checksum))));
        }

        let mut changed = false;
        if needs_write {
            if self.backup && dest.exists() {
                fs::copy(dest, format!("{}~", self.dest))?;
            }
            atomic_write(dest, &bytes)?;
            changed = true;
        }

        changed |= apply_file_attrs(
            "copy",
            dest,
            self.mode.as_deref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )?;

        let common = if changed {
            CommonResult::changed("copied")
        } else {
            CommonResult::ok("already up to date")
        };
        Ok(Box::new(self.result(common, Some(checksum))))
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
