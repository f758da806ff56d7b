use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{DupError, StoreError};
use crate::kv::{self, Kv};
use crate::task::{ProcessFlag, Task, TaskId, TaskStatus};

pub const QUEUE_KEY: &str = "queue";
pub const PROCESS_FLAG_KEY: &str = "process_flag";

/// Cola de tareas persistida como un único valor en el slot `queue`.
///
/// Toda operación es leer-modificar-escribir de la cola completa dentro de
/// la sección crítica `lock`, releyendo siempre el valor guardado.
pub struct TaskQueue {
    kv: Arc<dyn Kv>,
    lock: Mutex<()>,
}

impl TaskQueue {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    fn critical(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|_| StoreError::Lock("task queue"))
    }

    fn read(&self) -> Result<Vec<Task>, StoreError> {
        Ok(kv::load(self.kv.as_ref(), QUEUE_KEY)?.unwrap_or_default())
    }

    fn write(&self, tasks: &[Task]) -> Result<(), StoreError> {
        kv::save(self.kv.as_ref(), QUEUE_KEY, &tasks)
    }

    pub fn insert(&self, task: Task) -> Result<(), DupError> {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;
        debug!("encolando tarea {} ({} ubicaciones)", task.id, task.total);
        tasks.push(task);
        self.write(&tasks)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>, DupError> {
        let _guard = self.critical()?;
        Ok(self.read()?.into_iter().find(|t| t.id == id))
    }

    /// Aplica `f` a la tarea y persiste la cola completa. Devuelve la tarea
    /// tal como quedó guardada.
    pub fn update<F>(&self, id: &str, f: F) -> Result<Task, DupError>
    where
        F: FnOnce(&mut Task),
    {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;

        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DupError::TaskNotFound(id.to_string()))?;
        f(task);
        let updated = task.clone();

        self.write(&tasks)?;
        Ok(updated)
    }

    /// Tareas en orden de inserción.
    pub fn list(&self) -> Result<Vec<Task>, DupError> {
        let _guard = self.critical()?;
        Ok(self.read()?)
    }

    pub fn delete(&self, id: &str) -> Result<bool, DupError> {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.write(&tasks)?;
        Ok(true)
    }

    /// Quita las tareas completadas y devuelve cuántas se borraron.
    pub fn clear_completed(&self) -> Result<usize, DupError> {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;
        let before = tasks.len();
        tasks.retain(|t| t.status != TaskStatus::Completed);
        let cleared = before - tasks.len();
        self.write(&tasks)?;
        Ok(cleared)
    }

    pub fn is_empty(&self) -> Result<bool, DupError> {
        Ok(self.list()?.is_empty())
    }

    pub fn has_pending(&self) -> Result<bool, DupError> {
        Ok(self
            .list()?
            .iter()
            .any(|t| t.status == TaskStatus::Pending))
    }

    /// Toma la tarea pendiente más antigua y la marca `processing` en la
    /// misma sección crítica, así dos invocaciones no eligen la misma.
    pub fn claim_next_pending(&self) -> Result<Option<Task>, DupError> {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;

        let Some(task) = tasks.iter_mut().find(|t| t.status == TaskStatus::Pending) else {
            return Ok(None);
        };
        task.status = TaskStatus::Processing;
        task.updated = Utc::now();
        let claimed = task.clone();

        self.write(&tasks)?;
        Ok(Some(claimed))
    }

    /// Devuelve a `pending` las tareas que quedaron en `processing` (un
    /// lote interrumpido). El cursor se conserva porque el progreso se
    /// guarda por ubicación.
    pub fn requeue_interrupted(&self) -> Result<Vec<TaskId>, DupError> {
        let _guard = self.critical()?;
        let mut tasks = self.read()?;
        let mut requeued = Vec::new();

        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Processing {
                warn!(
                    "tarea {} quedó en processing ({}/{}), vuelve a pending",
                    task.id, task.processed, task.total
                );
                task.status = TaskStatus::Pending;
                task.updated = Utc::now();
                requeued.push(task.id.clone());
            }
        }

        if !requeued.is_empty() {
            self.write(&tasks)?;
        }
        Ok(requeued)
    }

    pub fn process_flag(&self) -> Result<ProcessFlag, DupError> {
        Ok(kv::load(self.kv.as_ref(), PROCESS_FLAG_KEY)?.unwrap_or_default())
    }

    pub fn set_process_flag(&self, flag: ProcessFlag) -> Result<(), DupError> {
        kv::save(self.kv.as_ref(), PROCESS_FLAG_KEY, &flag)?;
        Ok(())
    }
}
