//! Structural validation of workflow definitions.
//!
//! Checks task id uniqueness, dangling dependency and output references,
//! semver syntax of the definition version, and acyclicity of the dependency
//! graph. Cycle detection is a depth-first walk that keeps a "visiting" set;
//! reaching a node that is still being visited means a back edge.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{
    CoreError, CoreErrorKind, CoreResult, ValidationCode, ValidationResult, WorkflowDefinition,
    WorkflowTask,
};

pub fn validate_definition(definition: &WorkflowDefinition) -> ValidationResult {
    let mut result = ValidationResult::new();

    if definition.id.trim().is_empty() {
        result.error(
            ValidationCode::MissingId,
            "workflow definition id must not be empty",
            Some("id".to_string()),
        );
    }

    if semver::Version::parse(&definition.version).is_err() {
        result.error(
            ValidationCode::InvalidVersion,
            format!("'{}' is not a valid semantic version", definition.version),
            Some("version".to_string()),
        );
    }

    let mut tasks_by_id: HashMap<&str, &WorkflowTask> = HashMap::new();
    for (index, task) in definition.tasks.iter().enumerate() {
        if tasks_by_id.insert(task.id.as_str(), task).is_some() {
            result.error(
                ValidationCode::DuplicateTaskId,
                format!("task id '{}' is declared more than once", task.id),
                Some(format!("tasks[{index}].id")),
            );
        }
    }

    for task in &definition.tasks {
        for dependency in &task.dependencies {
            if !tasks_by_id.contains_key(dependency.as_str()) {
                result.error(
                    ValidationCode::InvalidDependency,
                    format!(
                        "task '{}' depends on unknown task '{dependency}'",
                        task.id
                    ),
                    Some(format!("tasks[{}].dependencies", task.id)),
                );
            }
        }
    }

    for cycle in find_cycles(definition, &tasks_by_id) {
        result.error(
            ValidationCode::CyclicDependency,
            format!("dependency cycle detected: {}", cycle.join(" -> ")),
            cycle.first().map(|id| format!("tasks[{id}].dependencies")),
        );
    }

    if let Some(output_task) = &definition.output_task
        && !tasks_by_id.contains_key(output_task.as_str())
    {
        result.error(
            ValidationCode::InvalidOutputTask,
            format!("output task '{output_task}' does not exist"),
            Some("outputTask".to_string()),
        );
    }

    if definition.tasks.len() > 1 {
        let depended_on: HashSet<&str> = definition
            .tasks
            .iter()
            .flat_map(|task| task.dependencies.iter().map(String::as_str))
            .collect();
        for task in &definition.tasks {
            let is_output = definition.output_task.as_deref() == Some(task.id.as_str());
            if task.dependencies.is_empty() && !depended_on.contains(task.id.as_str()) && !is_output
            {
                result.warning(
                    ValidationCode::IsolatedTask,
                    format!("task '{}' has no dependencies and no dependents", task.id),
                    Some(format!("tasks[{}]", task.id)),
                );
            }
        }
    }

    result
}

/// Fails with `CoreErrorKind::Validation` carrying every error message.
pub fn ensure_valid(definition: &WorkflowDefinition) -> CoreResult<ValidationResult> {
    let result = validate_definition(definition);
    if result.is_valid() {
        return Ok(result);
    }
    Err(
        CoreError::new(CoreErrorKind::Validation, result.summary())
            .with_workflow(definition.deployment_key()),
    )
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

fn find_cycles<'a>(
    definition: &'a WorkflowDefinition,
    tasks_by_id: &HashMap<&'a str, &'a WorkflowTask>,
) -> Vec<Vec<String>> {
    let mut marks: HashMap<&'a str, Mark> = HashMap::new();
    let mut path: Vec<&'a str> = Vec::new();
    let mut cycles = Vec::new();
    let mut reported: HashSet<BTreeSet<String>> = HashSet::new();

    for task in &definition.tasks {
        if !marks.contains_key(task.id.as_str()) {
            visit(
                task.id.as_str(),
                tasks_by_id,
                &mut marks,
                &mut path,
                &mut cycles,
                &mut reported,
            );
        }
    }

    cycles
}

fn visit<'a>(
    task_id: &'a str,
    tasks_by_id: &HashMap<&'a str, &'a WorkflowTask>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
    reported: &mut HashSet<BTreeSet<String>>,
) {
    marks.insert(task_id, Mark::Visiting);
    path.push(task_id);

    if let Some(task) = tasks_by_id.get(task_id).copied() {
        for dependency in &task.dependencies {
            // Dangling references are reported separately.
            let Some(target) = tasks_by_id.get(dependency.as_str()).copied() else {
                continue;
            };
            let target = target.id.as_str();
            match marks.get(target).copied() {
                Some(Mark::Visiting) => {
                    let start = path
                        .iter()
                        .position(|entry| *entry == target)
                        .unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|entry| entry.to_string()).collect();
                    let members: BTreeSet<String> = cycle.iter().cloned().collect();
                    if reported.insert(members) {
                        cycle.push(target.to_string());
                        cycles.push(cycle);
                    }
                }
                Some(Mark::Done) => {}
                None => visit(target, tasks_by_id, marks, path, cycles, reported),
            }
        }
    }

    path.pop();
    marks.insert(task_id, Mark::Done);
}
