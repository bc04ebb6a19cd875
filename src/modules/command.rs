//! Command module - execute commands without a shell.
//!
//! Runs the given command directly, without shell interpretation. For
//! pipes, redirects, and globbing use the shell module.

use serde::{Deserialize, Deserializer};
use std::any::Any;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::result::{CommonResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

/// Parameters of the command module.
///
/// Accepts the Ansible free-form string (`command: echo hi`) as well as the
/// mapping form with `cmd` or `argv`.
#[derive(Debug, Clone, Default)]
pub struct CommandTask {
    /// Command line, split with shell-style word rules (but not executed
    /// through a shell).
    pub cmd: String,
    /// Explicit argument vector; takes precedence over `cmd`.
    pub argv: Vec<String>,
    /// Working directory to run in.
    pub chdir: Option<String>,
    /// Skip execution when this path already exists.
    pub creates: Option<String>,
    /// Skip execution when this path does not exist.
    pub removes: Option<String>,
}

impl<'de> Deserialize<'de> for CommandTask {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match serde_yaml::Value::deserialize(deserializer)? {
            serde_yaml::Value::String(cmd) => {
                return Ok(Self {
                    cmd,
                    ..Self::default()
                })
            }
            other => other,
        };

        #[derive(Deserialize, Default)]
        #[serde(default, deny_unknown_fields)]
        struct Fields {
            cmd: String,
            argv: Vec<String>,
            chdir: Option<String>,
            creates: Option<String>,
            removes: Option<String>,
        }

        let fields: Fields = serde_yaml::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(Self {
            cmd: fields.cmd,
            argv: fields.argv,
            chdir: fields.chdir,
            creates: fields.creates,
            removes: fields.removes,
        })
    }
}

impl CommandTask {
    /// Build the argument vector to execute.
    fn build_argv(&self) -> Result<Vec<String>> {
        if !self.argv.is_empty() {
            return Ok(self.argv.clone());
        }
        let words = shell_words::split(&self.cmd)
            .map_err(|e| Error::invalid_parameter("command", e.to_string()))?;
        if words.is_empty() {
            return Err(Error::invalid_parameter("command", "cmd is empty"));
        }
        Ok(words)
    }

    /// Evaluate the `creates`/`removes` guards; `Some` short-circuits with
    /// an unchanged result.
    fn guard_result(&self) -> Option<CommonResult> {
        if let Some(creates) = &self.creates {
            if Path::new(creates).exists() {
                return Some(CommonResult::ok(format!("'{creates}' already exists")));
            }
        }
        if let Some(removes) = &self.removes {
            if !Path::new(removes).exists() {
                return Some(CommonResult::ok(format!("'{removes}' does not exist")));
            }
        }
        None
    }
}

/// Run an argument vector and capture its output as a result.
pub(crate) fn run_argv(
    argv: &[String],
    chdir: Option<&str>,
    ctx: &ExecutionContext,
) -> Result<Box<dyn TaskResult>> {
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    command.stdin(Stdio::null());

    if let Some(dir) = chdir {
        command.current_dir(dir);
    } else if let Some(dir) = &ctx.work_dir {
        command.current_dir(dir);
    }

    let display = shell_words::join(argv);
    let output = command
        .output()
        .map_err(|e| Error::task_failed(display.clone(), e.to_string()))?;

    let rc = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let result = if output.status.success() {
        CommonResult::changed(display)
    } else {
        CommonResult::failed(format!("non-zero return code {rc}"))
    };
    Ok(Box::new(result.with_command_output(
        Some(rc),
        Some(stdout),
        Some(stderr),
    )))
}

impl Templatable for CommandTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::Scalar(&mut self.cmd),
            FieldMut::ScalarList(&mut self.argv),
            FieldMut::OptScalar(&mut self.chdir),
            FieldMut::OptScalar(&mut self.creates),
            FieldMut::OptScalar(&mut self.removes),
        ]
    }
}

impl TaskContent for CommandTask {
    fn validate(&self) -> Result<()> {
        if self.cmd.is_empty() && self.argv.is_empty() {
            return Err(Error::MissingParameter {
                module: "command",
                parameter: "cmd",
            });
        }
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        if let Some(result) = self.guard_result() {
            return Ok(Box::new(result));
        }

        let argv = self.build_argv()?;
        if ctx.check_mode {
            return Ok(Box::new(CommonResult::changed(format!(
                "would run: {}",
                shell_words::join(&argv)
            ))));
        }
        run_argv(&argv, self.chdir.as_deref(), ctx)
    }

    fn clone_content(&self) -> Box<dyn TaskContent> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
