use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::DupError;
use crate::queue::TaskQueue;
use crate::task::{ProcessFlag, Task, TaskStatus};

/// Resumen de la cola para el operador.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub is_processing: bool,
    pub pending_tasks: usize,
    pub processing_tasks: usize,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Ubicaciones sumadas de todas las tareas.
    pub total_jobs: usize,
    pub processed_jobs: usize,
    pub current_task: Option<Task>,
    pub queue: Vec<Task>,
}

/// Vista de sólo lectura sobre la cola y la bandera.
#[derive(Clone)]
pub struct StatusReporter {
    queue: Arc<TaskQueue>,
}

impl StatusReporter {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    pub fn status(&self) -> Result<QueueStatus, DupError> {
        let tasks = self.queue.list()?;
        let flag = self.queue.process_flag()?;

        let mut status = QueueStatus {
            is_processing: flag == ProcessFlag::Processing,
            pending_tasks: 0,
            processing_tasks: 0,
            completed_tasks: 0,
            total_tasks: tasks.len(),
            total_jobs: 0,
            processed_jobs: 0,
            current_task: None,
            queue: Vec::new(),
        };

        for task in &tasks {
            match task.status {
                TaskStatus::Pending => status.pending_tasks += 1,
                TaskStatus::Processing => {
                    status.processing_tasks += 1;
                    status.current_task = Some(task.clone());
                }
                TaskStatus::Completed => status.completed_tasks += 1,
            }
            status.total_jobs += task.total;
            status.processed_jobs += task.processed;
        }

        status.queue = tasks;
        Ok(status)
    }
}
