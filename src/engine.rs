//! Task execution engine for Statecraft.
//!
//! The engine interprets one host's ordered task stream against that host's
//! variable scope. Per task it runs the lifecycle
//! *expand → condition → validate → apply → register*; looping tasks render
//! the `loop` specification first and then run the single-task lifecycle
//! once per item against a cloned content and an item-extended scope.
//!
//! Execution is strictly sequential: tasks run in declaration order and loop
//! iterations run in item order, each step completing before the next
//! begins. The engine owns nothing shared; its scope is an explicit `&mut`
//! parameter, so a caller that fans out across hosts must construct one
//! scope per host and never share it.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::TaskRegistry;
use crate::result::{CommonResult, LoopResult, TaskResult};
use crate::scope::Scope;
use crate::task::{ExecutionContext, Task, TaskContent};
use crate::template::{self, DynamicValue, TemplateEngine};

use crate::modules::include::{ImportTasks, IncludeTasks};

/// The task execution engine.
///
/// Holds the registry (needed to decode nested task files), the template
/// engine, and the ambient execution context. One engine value serves one
/// host run at a time.
pub struct Engine<'r> {
    registry: &'r TaskRegistry,
    templates: TemplateEngine,
    ctx: ExecutionContext,
}

impl<'r> Engine<'r> {
    /// Create an engine with a default execution context.
    pub fn new(registry: &'r TaskRegistry) -> Self {
        Self {
            registry,
            templates: TemplateEngine::new(),
            ctx: ExecutionContext::new(),
        }
    }

    /// Replace the execution context.
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// The current execution context.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Mutable access to the execution context.
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    /// Run an ordered task list against a scope.
    ///
    /// Stops at the first task-level error; results of completed tasks are
    /// returned on success.
    pub fn run_tasks(
        &self,
        tasks: &[Task],
        scope: &mut Scope,
    ) -> Result<Vec<Box<dyn TaskResult>>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.run_task(task, scope)?);
        }
        Ok(results)
    }

    /// Run a single task through its full lifecycle.
    ///
    /// On success the result is returned and, when `register` is set, also
    /// bound into the scope as a generic keyed mapping. A failure reported
    /// by the module is carried on the result *and* surfaced as an error;
    /// registration happens before the error is raised so the failure
    /// details stay inspectable.
    pub fn run_task(&self, task: &Task, scope: &mut Scope) -> Result<Box<dyn TaskResult>> {
        debug!(task = task.label(), module = %task.module, "running task");

        if is_include(task.content.as_ref()) {
            return self.run_include(task, scope);
        }

        let result: Box<dyn TaskResult> = if task.loop_spec.is_set() {
            Box::new(self.run_loop(task, scope)?)
        } else {
            self.apply_once(task, scope)?
        };

        if let Some(register) = &task.register {
            // A task skipped by its condition leaves the register variable
            // unset; loop results register unconditionally.
            let skip_registration = !task.loop_spec.is_set() && result.is_skipped();
            if !skip_registration {
                scope.set(register.clone(), result.as_value());
            }
        }

        if result.is_failed() {
            let message = result
                .message()
                .unwrap_or_else(|| "module reported failure".to_string());
            return Err(Error::task_failed(task.label(), message));
        }

        info!(
            task = task.label(),
            changed = result.is_changed(),
            skipped = result.is_skipped(),
            "task finished"
        );
        Ok(result)
    }

    /// Run the single-task lifecycle once: clone, expand, evaluate the
    /// condition, validate, apply.
    ///
    /// A false condition yields a skipped result without touching the
    /// module. Validation errors abort the task. Apply-level errors are
    /// folded into a failed result so the caller sees both the result and,
    /// at the task level, the error.
    fn apply_once(&self, task: &Task, scope: &Scope) -> Result<Box<dyn TaskResult>> {
        let mut content = task.content.clone_content();
        template::expand(content.as_mut(), &self.templates, scope)?;

        if let Some(when) = &task.when {
            if !self.templates.evaluate_condition(when, scope)? {
                debug!(task = task.label(), "condition false, skipping");
                return Ok(Box::new(CommonResult::skipped("conditional check failed")));
            }
        }

        content.validate()?;

        match content.apply(scope, &self.ctx) {
            Ok(result) => Ok(result),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => Ok(Box::new(CommonResult::failed(e.to_string()))),
        }
    }

    /// Run a looping task: render the loop specification, coerce it to an
    /// ordered item sequence, and run the single-task lifecycle per item
    /// with `item` bound in a derived scope.
    fn run_loop(&self, task: &Task, scope: &Scope) -> Result<LoopResult> {
        // Render a projection holding only the loop field, so loop-item
        // expressions may reference variables that are not yet meaningful
        // on the rest of the content.
        let mut spec = task.loop_spec.clone();
        spec.render(&self.templates, scope)?;

        let items = match spec {
            DynamicValue::List(items) => items,
            other => return Err(Error::LoopShape(other.shape().to_string())),
        };

        let mut loop_result = LoopResult::new();
        for item in items {
            let mut item_scope = scope.clone();
            item_scope.set("item", item);
            let result = self.apply_once(task, &item_scope)?;
            loop_result.push(result);
        }
        Ok(loop_result)
    }

    /// Run an `import_tasks`/`include_tasks` task: resolve the referenced
    /// file, decode it with the registry, and execute the nested list
    /// against the same scope.
    fn run_include(&self, task: &Task, scope: &mut Scope) -> Result<Box<dyn TaskResult>> {
        let mut content = task.content.clone_content();
        template::expand(content.as_mut(), &self.templates, scope)?;

        if let Some(when) = &task.when {
            if !self.templates.evaluate_condition(when, scope)? {
                return Ok(Box::new(CommonResult::skipped("conditional check failed")));
            }
        }

        content.validate()?;

        let file = include_file(content.as_ref()).ok_or_else(|| {
            Error::TaskDecode("include content without a file reference".to_string())
        })?;
        let path = self.ctx.resolve_tasks(&file);

        debug!(task = task.label(), file = %path.display(), "including tasks");
        let tasks = Task::load_file(&path, self.registry)?;
        let results = self.run_tasks(&tasks, scope)?;

        let changed = results.iter().any(|r| r.is_changed());
        let mut summary = CommonResult::ok(format!(
            "included {} task(s) from {}",
            results.len(),
            path.display()
        ));
        summary.changed = changed;
        Ok(Box::new(summary))
    }
}

/// Whether a content value is one of the nested-task-list types.
fn is_include(content: &dyn TaskContent) -> bool {
    content.as_any().is::<ImportTasks>() || content.as_any().is::<IncludeTasks>()
}

/// Extract the task-file reference from include-type content.
fn include_file(content: &dyn TaskContent) -> Option<String> {
    if let Some(import) = content.as_any().downcast_ref::<ImportTasks>() {
        return Some(import.file.clone());
    }
    content
        .as_any()
        .downcast_ref::<IncludeTasks>()
        .map(|include| include.file.clone())
}
