//! Task inclusion content types.
//!
//! `import_tasks` and `include_tasks` reference another task file whose
//! tasks the engine splices into the current stream. The content types here
//! only carry the file reference; resolving and executing the nested list
//! is the engine's job, since modules must not call back into it.

use serde::{Deserialize, Deserializer};
use std::any::Any;

use crate::error::{Error, Result};
use crate::result::TaskResult;
use crate::scope::Scope;
use crate::task::{ExecutionContext, TaskContent};
use crate::template::{FieldMut, Templatable};

fn de_file_reference<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(file) => Ok(file),
        serde_yaml::Value::Mapping(map) => match map.get("file") {
            Some(serde_yaml::Value::String(file)) => Ok(file.clone()),
            _ => Err(serde::de::Error::custom("expected a 'file' key")),
        },
        _ => Err(serde::de::Error::custom(
            "expected a file name or a mapping with a 'file' key",
        )),
    }
}

macro_rules! include_content {
    ($(#[$doc:meta])* $name:ident, $module:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $name {
            /// Task file to include, resolved against the role's `tasks/`
            /// directory or the playbook directory.
            pub file: String,
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                Ok(Self {
                    file: de_file_reference(deserializer)?,
                })
            }
        }

        impl Templatable for $name {
            fn template_fields(&mut self) -> Vec<FieldMut<'_>> {
                vec![FieldMut::Scalar(&mut self.file)]
            }
        }

        impl TaskContent for $name {
            fn validate(&self) -> Result<()> {
                if self.file.is_empty() {
                    return Err(Error::MissingParameter {
                        module: $module,
                        parameter: "file",
                    });
                }
                Ok(())
            }

            fn apply(
                &self,
                _scope: &Scope,
                _ctx: &ExecutionContext,
            ) -> Result<Box<dyn TaskResult>> {
                // The engine intercepts include content before dispatch;
                // reaching apply means it was invoked outside an engine run.
                Err(Error::task_failed(
                    $module,
                    "task inclusion is only valid inside an engine run",
                ))
            }

            fn clone_content(&self) -> Box<dyn TaskContent> {
                Box::new(self.clone())
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

include_content!(
    /// Content of an `import_tasks` task.
    ImportTasks,
    "import_tasks"
);

include_content!(
    /// Content of an `include_tasks` task.
    IncludeTasks,
    "include_tasks"
);
