//! Per-task state machine and the controller's state table.

use thiserror::Error;

use wright_store::TaskState;

use crate::executor::FailureNote;

/// The task state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending  -> running
/// running  -> committed
/// running  -> failed
/// failed   -> running    (retry, while attempt < retry_max)
/// pending  -> cancelled
/// running  -> cancelled
/// ```
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge
    /// in the state graph.
    pub fn is_valid_transition(from: TaskState, to: TaskState) -> bool {
        matches!(
            (from, to),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Committed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Failed, TaskState::Running)
                | (TaskState::Pending, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid state transition: {from} -> {to} for task {task}")]
    InvalidTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("task {task} has used all {retry_max} retries")]
    RetryLimit { task: String, retry_max: u32 },
}

/// State, attempt counter, and failure history of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    pub id: String,
    pub state: TaskState,
    /// Zero-based number of the current (or last) attempt.
    pub attempt: u32,
    pub failures: Vec<FailureNote>,
}

/// The controller's table of task states, indexed by graph position.
#[derive(Debug, Clone)]
pub struct TaskTable {
    entries: Vec<TaskEntry>,
    retry_max: u32,
}

impl TaskTable {
    /// All tasks start PENDING at attempt zero.
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>, retry_max: u32) -> Self {
        let entries = ids
            .into_iter()
            .map(|id| TaskEntry {
                id: id.to_string(),
                state: TaskState::Pending,
                attempt: 0,
                failures: Vec::new(),
            })
            .collect();
        Self { entries, retry_max }
    }

    pub fn get(&self, position: usize) -> &TaskEntry {
        &self.entries[position]
    }

    pub fn state(&self, position: usize) -> TaskState {
        self.entries[position].state
    }

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    /// Whether a failed task may be retried.
    pub fn can_retry(&self, position: usize) -> bool {
        self.entries[position].attempt < self.retry_max
    }

    /// Apply a transition. `failed -> running` bumps the attempt counter
    /// and is refused once the retry bound is reached. Returns the state
    /// the task left.
    pub fn transition(&mut self, position: usize, to: TaskState) -> Result<TaskState, StateError> {
        let retry_max = self.retry_max;
        let entry = &mut self.entries[position];
        let from = entry.state;
        if !TaskStateMachine::is_valid_transition(from, to) {
            return Err(StateError::InvalidTransition {
                task: entry.id.clone(),
                from,
                to,
            });
        }
        if from == TaskState::Failed && to == TaskState::Running {
            if entry.attempt >= retry_max {
                return Err(StateError::RetryLimit {
                    task: entry.id.clone(),
                    retry_max,
                });
            }
            entry.attempt += 1;
        }
        entry.state = to;
        Ok(from)
    }

    /// Record why the current attempt failed.
    pub fn record_failure(&mut self, position: usize, reason: impl Into<String>) {
        let entry = &mut self.entries[position];
        entry.failures.push(FailureNote {
            attempt: entry.attempt,
            reason: reason.into(),
        });
    }

    /// Positions of tasks that can still change state (not COMMITTED,
    /// CANCELLED, or a FAILED task that ended the run).
    pub fn unfinished(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.state, TaskState::Pending | TaskState::Running))
            .map(|(i, _)| i)
            .collect()
    }

    /// `(id, state)` pairs in graph order.
    pub fn states(&self) -> Vec<(String, TaskState)> {
        self.entries
            .iter()
            .map(|e| (e.id.clone(), e.state))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let valid = [
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Committed),
            (TaskState::Running, TaskState::Failed),
            (TaskState::Failed, TaskState::Running),
            (TaskState::Pending, TaskState::Cancelled),
            (TaskState::Running, TaskState::Cancelled),
        ];
        for (from, to) in valid {
            assert!(
                TaskStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be valid"
            );
        }
    }

    #[test]
    fn invalid_transitions() {
        let invalid = [
            (TaskState::Pending, TaskState::Committed),
            (TaskState::Pending, TaskState::Failed),
            (TaskState::Committed, TaskState::Running),
            (TaskState::Committed, TaskState::Cancelled),
            (TaskState::Cancelled, TaskState::Pending),
            (TaskState::Cancelled, TaskState::Running),
            (TaskState::Failed, TaskState::Committed),
            (TaskState::Failed, TaskState::Cancelled),
        ];
        for (from, to) in invalid {
            assert!(
                !TaskStateMachine::is_valid_transition(from, to),
                "{from} -> {to} should be invalid"
            );
        }
    }

    #[test]
    fn retry_increments_attempt_until_bound() {
        let mut table = TaskTable::new(["utils"], 2);
        table.transition(0, TaskState::Running).unwrap();
        for expected_attempt in 1..=2 {
            table.transition(0, TaskState::Failed).unwrap();
            table.record_failure(0, "bad output");
            assert!(table.can_retry(0));
            table.transition(0, TaskState::Running).unwrap();
            assert_eq!(table.get(0).attempt, expected_attempt);
        }
        table.transition(0, TaskState::Failed).unwrap();
        assert!(!table.can_retry(0));
        assert_eq!(
            table.transition(0, TaskState::Running),
            Err(StateError::RetryLimit {
                task: "utils".to_string(),
                retry_max: 2
            })
        );
        let attempts: Vec<u32> = table.get(0).failures.iter().map(|f| f.attempt).collect();
        assert_eq!(attempts, vec![0, 1]);
    }

    #[test]
    fn invalid_transition_is_rejected_and_state_kept() {
        let mut table = TaskTable::new(["a", "b"], 3);
        let err = table.transition(1, TaskState::Committed).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(table.state(1), TaskState::Pending);
    }

    #[test]
    fn unfinished_excludes_terminal_and_failed() {
        let mut table = TaskTable::new(["a", "b", "c", "d"], 0);
        table.transition(0, TaskState::Running).unwrap();
        table.transition(0, TaskState::Committed).unwrap();
        table.transition(1, TaskState::Running).unwrap();
        table.transition(1, TaskState::Failed).unwrap();
        table.transition(2, TaskState::Running).unwrap();
        assert_eq!(table.unfinished(), vec![2, 3]);
        assert_eq!(table.states()[1], ("b".to_string(), TaskState::Failed));
    }
}
