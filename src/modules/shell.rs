//! Shell module - execute commands through a shell.
//!
//! Like the command module, but the command line runs under `sh -c`, so
//! pipes, redirects, and environment expansion work.

use serde::{Deserialize, Deserializer};
use std::any::Any;
use std::path::Path;

use crate::error::{Error, Result};
use crate::result::{CommonResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

use super::command::run_argv;

/// Parameters of the shell module.
#[derive(Debug, Clone, Default)]
pub struct ShellTask {
    /// Shell command line, run under `sh -c`.
    pub cmd: String,
    /// Working directory to run in.
    pub chdir: Option<String>,
    /// Skip execution when this path already exists.
    pub creates: Option<String>,
    /// Skip execution when this path does not exist.
    pub removes: Option<String>,
    /// Shell executable to use instead of `/bin/sh`.
    pub executable: Option<String>,
}

impl<'de> Deserialize<'de> for ShellTask {
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
            chdir: Option<String>,
            creates: Option<String>,
            removes: Option<String>,
            executable: Option<String>,
        }

        let fields: Fields = serde_yaml::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(Self {
            cmd: fields.cmd,
            chdir: fields.chdir,
            creates: fields.creates,
            removes: fields.removes,
            executable: fields.executable,
        })
    }
}

impl Templatable for ShellTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        vec![
            FieldMut::Scalar(&mut self.cmd),
            FieldMut::OptScalar(&mut self.chdir),
            FieldMut::OptScalar(&mut self.creates),
            FieldMut::OptScalar(&mut self.removes),
            FieldMut::OptScalar(&mut self.executable),
        ]
    }
}

impl TaskContent for ShellTask {
    fn validate(&self) -> Result<()> {
        if self.cmd.is_empty() {
            return Err(Error::MissingParameter {
                module: "shell",
                parameter: "cmd",
            });
        }
        Ok(())
    }

    fn apply(&self, _scope: &Scope, ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        if let Some(creates) = &self.creates {
            if Path::new(creates).exists() {
                return Ok(Box::new(CommonResult::ok(format!(
                    "'{creates}' already exists"
                ))));
            }
        }
        if let Some(removes) = &self.removes {
            if !Path::new(removes).exists() {
                return Ok(Box::new(CommonResult::ok(format!(
                    "'{removes}' does not exist"
                ))));
            }
        }

        if ctx.check_mode {
            return Ok(Box::new(CommonResult::changed(format!(
                "would run: {}",
                self.cmd
            ))));
        }

        let sh = self
            .executable
            .clone()
            .unwrap_or_else(|| "/bin/sh".to_string());
        let argv = vec![sh, "-c".to_string(), self.cmd.clone()];
        run_argv(&argv, self.chdir.as_deref(), ctx)
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
    fn test_free_form_decoding() {
        let task: ShellTask = serde_yaml::from_str("echo hi | cat").unwrap();
        assert_eq!(task.cmd, "echo hi | cat");
    }

    #[test]
    fn test_pipe_runs_through_shell() {
        let task: ShellTask = serde_yaml::from_str("printf 'a\\nb\\n' | wc -l").unwrap();
        let result = task.apply(&Scope::new(), &ExecutionContext::new()).unwrap();
        assert!(result.is_changed());
        let value = result.as_value();
        let stdout = value
            .as_mapping()
            .unwrap()
            .get("stdout")
            .and_then(|v| v.as_str())
            .unwrap()
            .trim()
            .to_string();
        assert_eq!(stdout, "2");
    }

    #[test]
    fn test_validate_requires_cmd() {
        assert!(ShellTask::default().validate().is_err());
    }
}
