//! # Statecraft - A Configuration Management Engine
//!
//! Statecraft interprets declarative, Ansible-compatible YAML playbooks and
//! applies idempotent state-changing operations to hosts. The heart of the
//! crate is the task execution engine: the component that turns a task
//! declaration plus a layered variable environment into a concrete side
//! effect, with faithful semantics for conditionals, loops, templating, and
//! multi-source variable precedence.
//!
//! ## Core Concepts
//!
//! - **Scope**: the layered variable environment a task is evaluated against
//! - **Task**: one declarative unit of work — condition, optional loop, and
//!   exactly one module's parameters
//! - **Module**: the concrete operation a task performs (file, copy,
//!   command, ...), implementing the [`TaskContent`](task::TaskContent)
//!   contract
//! - **Result**: the outcome record a module produces
//!   (changed/skipped/failed plus module-specific data)
//! - **Register**: binds a task's result into the scope for later tasks
//! - **Inventory**: the host/group topology and per-host variable source
//! - **Role**: a reusable bundle of defaults, variables, and tasks
//!
//! ## Architecture Overview
//!
//! ```text
//! Inventory ──resolve──▶ per-host Scope
//!                            │
//! Playbook ──decode──▶ Tasks │        (decoding goes through the
//!   (TaskRegistry)           ▼         explicit TaskRegistry)
//!                     ┌─────────────┐
//!                     │   Engine    │  expand → when → validate →
//!                     └─────────────┘  apply → register
//!                            │
//!                            ▼
//!                     module side effects, Results fed back into the Scope
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use statecraft::prelude::*;
//!
//! fn main() -> statecraft::error::Result<()> {
//!     let registry = TaskRegistry::builtin();
//!     let inventory = Inventory::from_file("inventory.yml".as_ref())?;
//!     let playbook = Playbook::from_file("site.yml".as_ref(), &registry)?;
//!
//!     let runner = PlaybookRunner::new(&registry, inventory);
//!     let recap = runner.run(&playbook)?;
//!     for (host, tally) in &recap {
//!         println!("{host}: ok={} changed={}", tally.ok, tally.changed);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

/// Error types and result aliases.
pub mod error;

/// The layered variable environment.
pub mod scope;

/// Template rendering, dynamic values, and the typed field-walk contract.
pub mod template;

/// The task result hierarchy.
pub mod result;

/// The explicit task-type registry.
pub mod registry;

/// The task envelope and content contract.
pub mod task;

/// The task execution engine.
pub mod engine;

/// Host and group inventory.
pub mod inventory;

/// Role loading.
pub mod roles;

/// Playbook parsing and the per-host runner.
pub mod playbook;

/// Built-in module implementations.
pub mod modules;

/// Convenient re-exports of the commonly used types.
pub mod prelude {
    pub use crate::engine::Engine;
    pub use crate::error::{Error, Result};
    pub use crate::inventory::{Group, Inventory};
    pub use crate::playbook::{HostRecap, Play, Playbook, PlaybookRunner, RunOptions};
    pub use crate::registry::TaskRegistry;
    pub use crate::result::{CommonResult, FileResult, LoopResult, TaskResult};
    pub use crate::scope::{Scope, Value};
    pub use crate::task::{ExecutionContext, Task, TaskContent};
    pub use crate::template::{DynamicValue, FieldMut, Templatable, TemplateEngine};
}

/// Returns the current version of Statecraft.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
