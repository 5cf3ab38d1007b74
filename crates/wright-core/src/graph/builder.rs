//! Task graph validation and deterministic topological ordering.
//!
//! Ordering uses Kahn's algorithm with a min-heap as the ready set, keyed by
//! (plan file index, declaration index within that file). Independent tasks
//! therefore come out in plan order, then in the order the architect
//! declared them.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use thiserror::Error;

use super::task::{ImplementationTask, TaskId};
use crate::plan::Plan;

/// Reasons a set of task drafts cannot form a task graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("architect produced no tasks")]
    NoTasks,

    #[error("task with an empty id")]
    EmptyTaskId,

    #[error("duplicate task id: {0:?}")]
    DuplicateTaskId(String),

    #[error("task {task:?} targets {path:?}, which is not in the plan")]
    UnknownPath { task: String, path: String },

    #[error("plan file {0:?} is not covered by any task")]
    UncoveredFile(String),

    #[error("task {task:?} depends on unknown task {dependency:?}")]
    UnknownDependency { task: String, dependency: String },

    #[error("task {task:?} uses a symbol from {dependency:?}, which is not one of its dependencies")]
    UsesNonDependency { task: String, dependency: String },

    #[error("task {task:?} uses symbol {symbol:?}, which task {dependency:?} does not declare")]
    UnknownSymbolRef {
        task: String,
        dependency: String,
        symbol: String,
    },

    #[error("dependency cycle detected involving tasks: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Validated, totally ordered implementation tasks. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGraph {
    tasks: Vec<ImplementationTask>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Tasks in execution order.
    pub fn tasks(&self) -> &[ImplementationTask] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&ImplementationTask> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Position of a task in the execution order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }

    /// Direct dependencies of the task at `position`, in execution order.
    pub fn dependencies_of(&self, position: usize) -> Vec<&ImplementationTask> {
        let mut deps: Vec<usize> = self.tasks[position]
            .depends_on
            .iter()
            .filter_map(|id| self.index.get(id.as_str()).copied())
            .collect();
        deps.sort_unstable();
        deps.into_iter().map(|i| &self.tasks[i]).collect()
    }

    /// Tasks scheduled before `position` that target the same file.
    pub fn earlier_on_path(&self, position: usize) -> Vec<&ImplementationTask> {
        let path = &self.tasks[position].path;
        self.tasks[..position]
            .iter()
            .filter(|t| &t.path == path)
            .collect()
    }
}

/// Validate task drafts against the plan and order them.
///
/// Tasks sharing a path are chained in declaration order by an implicit
/// dependency edge, and each plan file's `depends_on` becomes an edge from
/// the last task on the dependency to the first task on the file. Fails
/// closed: any error returns no graph at all.
pub fn build_task_graph(
    plan: &Plan,
    drafts: Vec<ImplementationTask>,
) -> Result<TaskGraph, GraphValidationError> {
    if drafts.is_empty() {
        return Err(GraphValidationError::NoTasks);
    }

    let file_positions = plan.file_positions();

    // Ids, paths, and declaration index within each file.
    let mut id_to_idx: HashMap<&str, usize> = HashMap::with_capacity(drafts.len());
    let mut decl_index = vec![0usize; drafts.len()];
    let mut per_path: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, task) in drafts.iter().enumerate() {
        if task.id.trim().is_empty() {
            return Err(GraphValidationError::EmptyTaskId);
        }
        if id_to_idx.insert(task.id.as_str(), i).is_some() {
            return Err(GraphValidationError::DuplicateTaskId(task.id.clone()));
        }
        if !file_positions.contains_key(task.path.as_str()) {
            return Err(GraphValidationError::UnknownPath {
                task: task.id.clone(),
                path: task.path.clone(),
            });
        }
        let on_path = per_path.entry(task.path.as_str()).or_default();
        decl_index[i] = on_path.len();
        on_path.push(i);
    }

    for file in &plan.files {
        if !per_path.contains_key(file.path.as_str()) {
            return Err(GraphValidationError::UncoveredFile(file.path.clone()));
        }
    }

    // Resolve explicit edges, then add the implicit same-path chain.
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(drafts.len());
    for task in &drafts {
        let mut resolved = Vec::with_capacity(task.depends_on.len());
        for dep in &task.depends_on {
            let Some(&dep_idx) = id_to_idx.get(dep.as_str()) else {
                return Err(GraphValidationError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            };
            if dep == &task.id {
                return Err(GraphValidationError::Cycle(vec![task.id.clone()]));
            }
            if !resolved.contains(&dep_idx) {
                resolved.push(dep_idx);
            }
        }
        deps.push(resolved);
    }
    for file in &plan.files {
        let Some(chain) = per_path.get(file.path.as_str()) else {
            continue;
        };
        for pair in chain.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if !deps[later].contains(&earlier) {
                deps[later].push(earlier);
            }
        }
    }
    // File-level plan dependencies: the first task on a file waits for the
    // last task on each file it depends on.
    for file in &plan.files {
        let Some(&first) = per_path.get(file.path.as_str()).and_then(|c| c.first()) else {
            continue;
        };
        for dep_path in &file.depends_on {
            let Some(&last) = per_path.get(dep_path.as_str()).and_then(|c| c.last()) else {
                continue;
            };
            if last != first && !deps[first].contains(&last) {
                deps[first].push(last);
            }
        }
    }

    // Symbol references must point at a dependency that declares them.
    for (i, task) in drafts.iter().enumerate() {
        for used in &task.uses {
            let dep_idx = id_to_idx
                .get(used.task.as_str())
                .copied()
                .filter(|d| deps[i].contains(d))
                .ok_or_else(|| GraphValidationError::UsesNonDependency {
                    task: task.id.clone(),
                    dependency: used.task.clone(),
                })?;
            if drafts[dep_idx].symbol(&used.name).is_none() {
                return Err(GraphValidationError::UnknownSymbolRef {
                    task: task.id.clone(),
                    dependency: used.task.clone(),
                    symbol: used.name.clone(),
                });
            }
        }
    }

    let order = topological_order(&drafts, &deps, &decl_index, &file_positions)?;

    // Materialize: effective dependency lists are written back as ids so
    // consumers see the implicit edges too.
    let ids: Vec<TaskId> = drafts.iter().map(|t| t.id.clone()).collect();
    let mut slots: Vec<Option<ImplementationTask>> = drafts.into_iter().map(Some).collect();
    let mut tasks = Vec::with_capacity(order.len());
    for idx in order {
        if let Some(mut task) = slots[idx].take() {
            task.depends_on = deps[idx].iter().map(|&d| ids[d].clone()).collect();
            tasks.push(task);
        }
    }

    let index = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    Ok(TaskGraph { tasks, index })
}

/// Kahn's algorithm over draft indices.
fn topological_order(
    drafts: &[ImplementationTask],
    deps: &[Vec<usize>],
    decl_index: &[usize],
    file_positions: &HashMap<&str, usize>,
) -> Result<Vec<usize>, GraphValidationError> {
    let n = drafts.len();
    let mut in_degree = vec![0usize; n];
    let mut adj: Vec<Vec<usize>> = vec![vec![]; n];
    for (task_idx, task_deps) in deps.iter().enumerate() {
        for &dep_idx in task_deps {
            // Edge: dep -> task (dep must be committed before task).
            adj[dep_idx].push(task_idx);
            in_degree[task_idx] += 1;
        }
    }

    let key = |i: usize| {
        let file_idx = file_positions
            .get(drafts[i].path.as_str())
            .copied()
            .unwrap_or(usize::MAX);
        Reverse((file_idx, decl_index[i], i))
    };

    let mut ready: BinaryHeap<Reverse<(usize, usize, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| key(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse((_, _, node))) = ready.pop() {
        order.push(node);
        for &neighbor in &adj[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                ready.push(key(neighbor));
            }
        }
    }

    if order.len() != n {
        let emitted: HashSet<usize> = order.iter().copied().collect();
        let cycle_tasks = (0..n)
            .filter(|i| !emitted.contains(i))
            .map(|i| drafts[i].id.clone())
            .collect();
        return Err(GraphValidationError::Cycle(cycle_tasks));
    }

    Ok(order)
}
