//! Template module - render a template file to a destination.
//!
//! Reads a Jinja2-style template (resolved relative to the role's
//! `templates/` directory or the playbook directory), renders it against the
//! task's scope, and writes the result to the destination when it differs.

use serde::Deserialize;
use std::any::Any;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::result::{CommonResult, FileResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable, TemplateEngine};

use super::{apply_file_attrs, atomic_write, de_opt_scalar, sha256_bytes, sha256_file};

/// Parameters of the template module.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateTask {
    /// Template source path.
    pub src: String,
    /// Destination path for the rendered output.
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

impl TemplateTask {
    fn result(&self, common: CommonResult, checksum: Option<String>) -> FileResult {
        let mut result = FileResult::new(common).with_dest(&self.dest);
        result.checksum = checksum;
        result.mode = self.mode.clone();
        result.owner = self.owner.clone();
        result.group = self.group.clone();
        result
    }
}

impl Templatable for TemplateTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        // The template body itself is rendered at apply time, not here;
        // only the parameters are templatable.
        vec![
            FieldMut::Scalar(&mut self.src),
            FieldMut::Scalar(&mut self.dest),
            FieldMut::OptScalar(&mut self.mode),
            FieldMut::OptScalar(&mut self.owner),
            FieldMut::OptScalar(&mut self.group),
        ]
    }
}

impl TaskContent for TemplateTask {
    fn validate(&self) -> Result<()> {
        if self.src.is_empty() {
            return Err(Error::MissingParameter {
                module: "template",
                parameter: "src",
            });
        }
        if self.dest.is_empty() {
            return Err(Error::MissingParameter {
                module: "template",
                parameter: "dest",
            });
        }
        Ok(())
    }

    fn apply(&self, scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let src_path = ctx.resolve_templates(&self.src);
        let source = fs::read_to_string(&src_path).map_err(|e| {
            Error::task_failed(
                "template",
                format!("cannot read template '{}': {e}", src_path.display()),
            )
        })?;

        let engine = TemplateEngine::new();
        let rendered = engine.render_str(&source, scope)?;
        let checksum = sha256_bytes(rendered.as_bytes());

        let dest = Path::new(&self.dest);
        let needs_write = match sha256_file(dest) {
            Ok(existing) => existing != checksum,
            Err(_) => true,
        };

        if ctx.check_mode {
            let common = if needs_write {
                CommonResult::changed("would render template")
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
            atomic_write(dest, rendered.as_bytes())?;
            changed = true;
        }

        changed |= apply_file_attrs(
            "template",
            dest,
            self.mode.as_deref(),
            self.owner.as_deref(),
            self.group.as_deref(),
        )?;

        let common = if changed {
            CommonResult::changed("template rendered")
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
