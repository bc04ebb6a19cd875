//! Task result model for Statecraft.
//!
//! Every module produces a result that reports whether the operation changed
//! the target, was skipped, or failed, plus whatever module-specific output
//! it carries (return codes, checksums, paths). Results convert to a generic
//! keyed mapping with stable field names for `register` and for serialization
//! across the execution boundary.

use serde::Serialize;
use std::fmt;

use crate::scope::Value;

/// The capability set every task result implements.
pub trait TaskResult: fmt::Debug + Send {
    /// Whether the operation modified the target.
    fn is_changed(&self) -> bool;
    /// Whether the task was skipped (condition false).
    fn is_skipped(&self) -> bool;
    /// Whether the operation failed.
    fn is_failed(&self) -> bool;

    /// Set the changed flag.
    fn set_changed(&mut self, changed: bool);
    /// Set the skipped flag.
    fn set_skipped(&mut self, skipped: bool);
    /// Set the failed flag.
    fn set_failed(&mut self, failed: bool);

    /// The human-readable message attached to this result, if any.
    fn message(&self) -> Option<String>;

    /// Convert to a generic keyed mapping with stable external field names
    /// (`changed`, `skipped`, `failed`, `rc`, `stdout`, `stderr`, `msg`,
    /// `results`, plus module extras).
    fn as_value(&self) -> Value;
}

/// The common result fields shared by every module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommonResult {
    /// Whether the operation modified the target.
    pub changed: bool,
    /// Whether the task was skipped.
    pub skipped: bool,
    /// Whether the operation failed.
    pub failed: bool,
    /// Process return code, for command-like modules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    /// Captured standard output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl CommonResult {
    /// A successful result that made no changes.
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// A successful result that changed the target.
    pub fn changed(msg: impl Into<String>) -> Self {
        Self {
            changed: true,
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// A skipped result.
    pub fn skipped(msg: impl Into<String>) -> Self {
        Self {
            skipped: true,
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// A failed result.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            failed: true,
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// Attach command output to the result.
    pub fn with_command_output(
        mut self,
        rc: Option<i32>,
        stdout: Option<String>,
        stderr: Option<String>,
    ) -> Self {
        self.rc = rc;
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }
}

impl TaskResult for CommonResult {
    fn is_changed(&self) -> bool {
        self.changed
    }

    fn is_skipped(&self) -> bool {
        self.skipped
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    fn set_skipped(&mut self, skipped: bool) {
        self.skipped = skipped;
    }

    fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }

    fn message(&self) -> Option<String> {
        self.msg.clone()
    }

    fn as_value(&self) -> Value {
        serde_yaml::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of a file-affecting module (file, copy, template, get_url).
///
/// Embeds [`CommonResult`] and adds the attribute fields those modules
/// report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileResult {
    /// Common status flags and message.
    #[serde(flatten)]
    pub common: CommonResult,
    /// The path the module operated on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The destination path, for transfer modules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// SHA-256 checksum of the written content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Applied mode, in octal string form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Applied owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Applied group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Resulting state, for the file module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// HTTP status code, for the get_url module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl FileResult {
    /// Build a file result around common flags.
    pub fn new(common: CommonResult) -> Self {
        Self {
            common,
            ..Self::default()
        }
    }

    /// Set the path field.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the destination field.
    pub fn with_dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }
}

impl TaskResult for FileResult {
    fn is_changed(&self) -> bool {
        self.common.changed
    }

    fn is_skipped(&self) -> bool {
        self.common.skipped
    }

    fn is_failed(&self) -> bool {
        self.common.failed
    }

    fn set_changed(&mut self, changed: bool) {
        self.common.changed = changed;
    }

    fn set_skipped(&mut self, skipped: bool) {
        self.common.skipped = skipped;
    }

    fn set_failed(&mut self, failed: bool) {
        self.common.failed = failed;
    }

    fn message(&self) -> Option<String> {
        self.common.msg.clone()
    }

    fn as_value(&self) -> Value {
        serde_yaml::to_value(self).unwrap_or(Value::Null)
    }
}

/// Aggregate result of a looping task.
///
/// Holds per-iteration results in execution order. The aggregate
/// changed/skipped/failed flags are the logical OR over iterations.
#[derive(Debug, Default)]
pub struct LoopResult {
    /// Aggregate status flags.
    pub common: CommonResult,
    /// Per-iteration results, in iteration order.
    pub results: Vec<Box<dyn TaskResult>>,
}

impl LoopResult {
    /// Create an empty loop result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one iteration's result, folding its flags into the aggregate.
    pub fn push(&mut self, result: Box<dyn TaskResult>) {
        self.common.changed |= result.is_changed();
        self.common.skipped |= result.is_skipped();
        self.common.failed |= result.is_failed();
        self.results.push(result);
    }

    /// Number of iterations recorded.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no iterations were recorded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl TaskResult for LoopResult {
    fn is_changed(&self) -> bool {
        self.common.changed
    }

    fn is_skipped(&self) -> bool {
        self.common.skipped
    }

    fn is_failed(&self) -> bool {
        self.common.failed
    }

    fn set_changed(&mut self, changed: bool) {
        self.common.changed = changed;
    }

    fn set_skipped(&mut self, skipped: bool) {
        self.common.skipped = skipped;
    }

    fn set_failed(&mut self, failed: bool) {
        self.common.failed = failed;
    }

    fn message(&self) -> Option<String> {
        let failed: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.is_failed())
            .filter_map(|r| r.message())
            .collect();
        if failed.is_empty() {
            self.common.msg.clone()
        } else {
            Some(failed.join("; "))
        }
    }

    fn as_value(&self) -> Value {
        let mut map = match serde_yaml::to_value(&self.common) {
            Ok(Value::Mapping(m)) => m,
            _ => serde_yaml::Mapping::new(),
        };
        map.insert(
            Value::String("results".to_string()),
            Value::Sequence(self.results.iter().map(|r| r.as_value()).collect()),
        );
        Value::Mapping(map)
    }
}
