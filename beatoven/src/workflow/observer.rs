use std::path::Path;

use log::{debug, error, info, warn};

use super::WorkflowState;
use crate::models::TaskState;

/// Receives progress of a single workflow.
///
/// Handed to each workflow explicitly, so concurrent generations can report
/// to different sinks. All methods default to doing nothing.
pub trait Observer: Send + Sync {
    fn transition(&self, _state: WorkflowState, _task_id: Option<&str>) {}

    fn polled(&self, _task_id: &str, _attempt: u32, _status: &TaskState) {}

    fn downloaded(&self, _task_id: &str, _path: &Path) {}
}

/// Forwards workflow progress to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn transition(&self, state: WorkflowState, task_id: Option<&str>) {
        let task = task_id.unwrap_or("-");
        match state {
            WorkflowState::Created => debug!("Workflow created"),
            WorkflowState::Polling => info!("Task {task} submitted, waiting for composition"),
            WorkflowState::Succeeded => info!("Task {task} has completed"),
            WorkflowState::Failed => error!("Task {task} has failed"),
            WorkflowState::TimedOut => warn!("Gave up waiting for task {task}"),
        }
    }

    fn polled(&self, task_id: &str, attempt: u32, status: &TaskState) {
        if status.is_terminal() {
            debug!("Task {task_id} poll #{attempt}: {status}");
        } else {
            info!("Task {task_id} is still {status} (poll #{attempt})");
        }
    }

    fn downloaded(&self, task_id: &str, path: &Path) {
        info!("Task {task_id} saved to {}", path.display());
    }
}
