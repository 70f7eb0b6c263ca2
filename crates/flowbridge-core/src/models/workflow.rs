use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::serde_time::option_duration_millis;

/// A unit of work inside a workflow definition.
///
/// `dependencies` holds ids of tasks in the same definition that must finish
/// first. The relation over all tasks must stay acyclic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
}

impl WorkflowTask {
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            task_type: task_type.into(),
            input: Value::Null,
            dependencies: BTreeSet::new(),
            priority: 0,
            timeout: None,
            retries: 0,
            input_function: None,
            output_function: None,
            on_error: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn input_function(mut self, hook: impl Into<String>) -> Self {
        self.input_function = Some(hook.into());
        self
    }

    pub fn output_function(mut self, hook: impl Into<String>) -> Self {
        self.output_function = Some(hook.into());
        self
    }

    pub fn on_error(mut self, hook: impl Into<String>) -> Self {
        self.on_error = Some(hook.into());
        self
    }

    pub fn has_transform_hooks(&self) -> bool {
        self.input_function.is_some() || self.output_function.is_some()
    }
}

/// Named, versioned graph of tasks. Treated as immutable once deployed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WorkflowDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            tasks: Vec::new(),
            output_task: None,
            description: None,
        }
    }

    pub fn task(mut self, task: WorkflowTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn output_task(mut self, task_id: impl Into<String>) -> Self {
        self.output_task = Some(task_id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn find_task(&self, task_id: &str) -> Option<&WorkflowTask> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut WorkflowTask> {
        self.tasks.iter_mut().find(|task| task.id == task_id)
    }

    /// Deployment identity shared by every backend: `name@version`.
    pub fn deployment_key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}
