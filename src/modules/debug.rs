//! Debug module - print a message or a variable during execution.
//!
//! A control-node-only module: it never touches the target and never
//! reports a change. `msg` is rendered as a template; `var` is a raw
//! expression evaluated against the scope, so a variable holding a list
//! prints as a list.

use serde::Deserialize;
use std::any::Any;

use crate::error::Result;
use crate::result::{CommonResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable, TemplateEngine};

/// Parameters of the debug module.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugTask {
    /// Message to print, rendered against the scope.
    pub msg: Option<String>,
    /// Expression to evaluate and print. Not a template: `var: my_list`
    /// prints the value of `my_list`.
    pub var: Option<String>,
}

impl Default for DebugTask {
    fn default() -> Self {
        Self {
            msg: Some("Hello world!".to_string()),
            var: None,
        }
    }
}

impl Templatable for DebugTask {
    fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
        // `var` carries a raw expression and must not be interpolated.
        vec![FieldMut::OptScalar(&mut self.msg)]
    }
}

impl TaskContent for DebugTask {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, scope: &Scope, _ctx: &ExecutionContext) -> Result<Box<dyn TaskResult>> {
        let msg = if let Some(var) = &self.var {
            let engine = TemplateEngine::new();
            let value = engine.eval_expression(var, scope)?;
            let printed = serde_yaml::to_string(&value)
                .unwrap_or_default()
                .trim_end()
                .to_string();
            format!("{var}: {printed}")
        } else {
            self.msg.clone().unwrap_or_default()
        };

        tracing::info!(target: "statecraft::debug", "{msg}");
        Ok(Box::new(CommonResult::ok(msg)))
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
    use crate::scope::Value;

    #[test]
    fn test_default_message() {
        let task = DebugTask::default();
        let result = task.apply(&Scope::new(), &ExecutionContext::new()).unwrap();
        assert!(!result.is_changed());
        assert_eq!(result.message().as_deref(), Some("Hello world!"));
    }

    #[test]
    fn test_var_evaluates_expression() {
        let mut scope = Scope::new();
        scope.set("answer", Value::Number(42.into()));

        let task = DebugTask {
            msg: None,
            var: Some("answer".to_string()),
        };
        let result = task.apply(&scope, &ExecutionContext::new()).unwrap();
        assert_eq!(result.message().as_deref(), Some("answer: 42"));
    }

    #[test]
    fn test_var_undefined_is_error() {
        let task = DebugTask {
            msg: None,
            var: Some("missing".to_string()),
        };
        assert!(task.apply(&Scope::new(), &ExecutionContext::new()).is_err());
    }
}
