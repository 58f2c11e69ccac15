//! Chain status derivation.

use crate::task::{Task, TaskStatus};

/// Overall status of a chain, given its tasks in chain order.
///
/// The chain reports the status of the earliest non-terminal link; once
/// every link is terminal, the tail's outcome stands for the chain (failure
/// cascades have already propagated to the tail by then).
///
/// An empty slice reports `Success` for want of anything to wait on;
/// schedulers never build empty chains.
pub fn chain_status(ordered: &[Task]) -> TaskStatus {
    for task in ordered {
        if !task.is_terminal() {
            return task.status;
        }
    }
    ordered.last().map(|t| t.status).unwrap_or(TaskStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{PayloadRef, PipelineId, ScopeId};
    use crate::task::BackendKind;

    fn task_with(status: TaskStatus) -> Task {
        let mut task = Task::new(
            ScopeId::new("acme"),
            PipelineId::new("deploy"),
            BackendKind::Container,
            PayloadRef::new("p"),
        );
        task.status = status;
        task
    }

    #[test]
    fn reports_earliest_non_terminal() {
        use TaskStatus::*;
        let chain = vec![task_with(Success), task_with(Running), task_with(Waiting)];
        assert_eq!(chain_status(&chain), Running);
    }

    #[test]
    fn reports_tail_once_all_terminal() {
        use TaskStatus::*;
        let chain = vec![task_with(Success), task_with(Failed), task_with(Failed)];
        assert_eq!(chain_status(&chain), Failed);

        let chain = vec![task_with(Success), task_with(Success), task_with(Success)];
        assert_eq!(chain_status(&chain), Success);
    }

    #[test]
    fn waiting_head_reports_waiting() {
        use TaskStatus::*;
        let chain = vec![task_with(Queued), task_with(Waiting)];
        assert_eq!(chain_status(&chain), Queued);
    }
}
