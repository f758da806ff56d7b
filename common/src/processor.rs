use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{debug, info, warn};

use crate::duplicator::Executor;
use crate::error::{DupError, ErrorKind};
use crate::queue::TaskQueue;
use crate::task::{ProcessFlag, Task, TaskId, TaskStatus};

/// Resultado de una invocación del scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    QueueEmpty,
    NoPending,
    /// Otro `step` seguía corriendo; no se tocó nada.
    Busy,
    Advanced {
        task_id: TaskId,
        processed: usize,
        total: usize,
        success: usize,
        failed: usize,
        status: TaskStatus,
    },
}

/// Avanza una tarea pendiente por invocación, de a `batch_size` ubicaciones.
pub struct BatchProcessor {
    queue: Arc<TaskQueue>,
    executor: Arc<dyn Executor>,
    batch_size: usize,
    running: Mutex<()>,
}

impl BatchProcessor {
    pub fn new(queue: Arc<TaskQueue>, executor: Arc<dyn Executor>, batch_size: usize) -> Self {
        Self {
            queue,
            executor,
            batch_size: batch_size.max(1),
            running: Mutex::new(()),
        }
    }

    /// Una pasada del scheduler:
    /// 1. cola vacía -> nada
    /// 2. bandera a processing
    /// 3. toma la pendiente más antigua (si no hay, bandera a idle)
    /// 4. procesa un lote, guardando el progreso ubicación por ubicación
    /// 5. la tarea queda completed o vuelve a pending
    /// 6. si no queda ninguna pendiente en la cola, bandera a idle
    pub fn step(&self) -> Result<StepOutcome, DupError> {
        let _running = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("step ignorado: ya hay un lote en curso");
                return Ok(StepOutcome::Busy);
            }
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };

        if self.queue.is_empty()? {
            return Ok(StepOutcome::QueueEmpty);
        }

        self.queue.set_process_flag(ProcessFlag::Processing)?;

        let Some(task) = self.queue.claim_next_pending()? else {
            self.queue.set_process_flag(ProcessFlag::Idle)?;
            return Ok(StepOutcome::NoPending);
        };

        let task = match self.run_batch(&task) {
            Ok(t) => t,
            Err(e) => {
                warn!("lote de la tarea {} abortado: {}", task.id, e);
                self.release(&task.id);
                return Err(e);
            }
        };

        if !self.queue.has_pending()? {
            self.queue.set_process_flag(ProcessFlag::Idle)?;
        }

        Ok(StepOutcome::Advanced {
            task_id: task.id,
            processed: task.processed,
            total: task.total,
            success: task.success,
            failed: task.failed,
            status: task.status,
        })
    }

    /// Disparo manual del operador: sólo corre si la cola tiene algo, la
    /// bandera no está en processing y hay al menos una tarea pendiente.
    /// Devuelve None si se rechazó.
    pub fn trigger_manual(&self) -> Result<Option<StepOutcome>, DupError> {
        if self.queue.is_empty()? {
            return Ok(None);
        }
        if self.queue.process_flag()? == ProcessFlag::Processing {
            return Ok(None);
        }
        if !self.queue.has_pending()? {
            return Ok(None);
        }
        Ok(Some(self.step()?))
    }

    fn run_batch(&self, task: &Task) -> Result<Task, DupError> {
        let range = task.next_batch(self.batch_size);
        info!(
            "procesando tarea {} ubicaciones [{}, {}) de {}",
            task.id, range.start, range.end, task.total
        );

        for i in range {
            let location = &task.locations[i];
            let result =
                self.executor
                    .duplicate(task.job_id, location, task.company_id, task.schedule_date);

            match result {
                Ok(_) => {
                    self.queue.update(&task.id, |t| t.record_success())?;
                }
                // store caído: corta el paso sin avanzar el cursor
                Err(e) if e.kind() == ErrorKind::Persistence => return Err(e),
                Err(e) => {
                    warn!(
                        "tarea {}: falló la ubicación {}: {}",
                        task.id, location, e
                    );
                    self.queue
                        .update(&task.id, |t| t.record_failure(location, &e))?;
                }
            }
        }

        let done = self.queue.update(&task.id, |t| t.finish_batch())?;
        if done.status == TaskStatus::Completed {
            info!(
                "tarea {} completada: {} ok, {} con error",
                done.id, done.success, done.failed
            );
        }
        Ok(done)
    }

    /// Intenta devolver la tarea a pending tras un lote abortado.
    fn release(&self, id: &str) {
        let res = self.queue.update(id, |t| {
            if t.status == TaskStatus::Processing {
                t.status = TaskStatus::Pending;
            }
        });
        if let Err(e) = res {
            warn!("no se pudo liberar la tarea {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StoreError};
    use crate::kv::{Kv, MemoryKv};
    use crate::testing::FakeExecutor;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn setup(exec: Arc<dyn Executor>) -> (Arc<TaskQueue>, BatchProcessor) {
        let queue = Arc::new(TaskQueue::new(Arc::new(MemoryKv::new())));
        let proc_ = BatchProcessor::new(queue.clone(), exec, 25);
        (queue, proc_)
    }

    fn pending_task(n: usize) -> Task {
        Task::new(7, 3, (0..n).map(|i| format!("loc-{i}")).collect(), None)
    }

    fn assert_counters(t: &Task) {
        assert_eq!(t.success + t.failed, t.processed);
        assert!(t.processed <= t.total);
    }

    #[test]
    fn sesenta_ubicaciones_en_tres_pasos() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec.clone());
        let task = pending_task(60);
        queue.insert(task.clone()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            p.step().unwrap();
            let t = queue.get(&task.id).unwrap().unwrap();
            assert_counters(&t);
            seen.push((t.processed, t.status));
        }
        assert_eq!(
            seen,
            vec![
                (25, TaskStatus::Pending),
                (50, TaskStatus::Pending),
                (60, TaskStatus::Completed),
            ]
        );

        let before = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(p.step().unwrap(), StepOutcome::NoPending);
        assert_eq!(queue.get(&task.id).unwrap().unwrap(), before);
        assert_eq!(exec.calls(), 60);
    }

    #[test]
    fn bandera_vuelve_a_idle_en_el_paso_que_completa() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec);
        queue.insert(pending_task(30)).unwrap();

        p.step().unwrap();
        // queda trabajo pendiente: la bandera sigue en processing entre ticks
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Processing);

        let out = p.step().unwrap();
        assert!(matches!(
            out,
            StepOutcome::Advanced {
                status: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Idle);
    }

    #[test]
    fn error_de_ubicacion_se_acumula_y_sigue() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        exec.fail_on("X");
        let (queue, p) = setup(exec);
        let task = Task::new(
            7,
            3,
            vec!["A".into(), "X".into(), "B".into()],
            None,
        );
        queue.insert(task.clone()).unwrap();

        p.step().unwrap();

        let t = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(t.processed, 3);
        assert_eq!(t.success, 2);
        assert_eq!(t.failed, 1);
        assert_eq!(t.errors.len(), 1);
        assert_eq!(t.errors[0].location, "X");
        assert_eq!(t.errors[0].error_kind, ErrorKind::SourceNotFound);
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn atiende_tareas_en_orden_de_llegada() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec);
        let first = pending_task(10);
        let second = pending_task(10);
        queue.insert(first.clone()).unwrap();
        queue.insert(second.clone()).unwrap();

        let StepOutcome::Advanced { task_id, .. } = p.step().unwrap() else {
            panic!("esperaba avance");
        };
        assert_eq!(task_id, first.id);
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Processing);

        let StepOutcome::Advanced { task_id, .. } = p.step().unwrap() else {
            panic!("esperaba avance");
        };
        assert_eq!(task_id, second.id);
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Idle);
    }

    #[test]
    fn cola_vacia_no_toca_la_bandera() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec);
        assert_eq!(p.step().unwrap(), StepOutcome::QueueEmpty);
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Idle);
    }

    #[test]
    fn disparo_manual_respeta_la_guarda() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec);

        assert_eq!(p.trigger_manual().unwrap(), None);

        queue.insert(pending_task(40)).unwrap();
        assert!(p.trigger_manual().unwrap().is_some());

        // quedan 15 pendientes y la bandera está en processing
        assert_eq!(p.trigger_manual().unwrap(), None);

        p.step().unwrap();
        assert_eq!(queue.process_flag().unwrap(), ProcessFlag::Idle);
        assert_eq!(p.trigger_manual().unwrap(), None);
    }

    struct GateExecutor {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Executor for GateExecutor {
        fn duplicate(
            &self,
            _source_id: u64,
            _location: &str,
            _company_id: u64,
            _schedule_date: Option<chrono::NaiveDateTime>,
        ) -> Result<u64, DupError> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(1)
        }

        fn source_exists(&self, _source_id: u64) -> Result<bool, DupError> {
            Ok(true)
        }
    }

    #[test]
    fn step_concurrente_devuelve_busy() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let exec = Arc::new(GateExecutor {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let (queue, p) = setup(exec);
        let p = Arc::new(p);
        let task = pending_task(1);
        queue.insert(task.clone()).unwrap();
        queue.insert(pending_task(1)).unwrap();

        let runner = {
            let p = p.clone();
            std::thread::spawn(move || p.step().unwrap())
        };

        entered_rx.recv().unwrap();
        assert_eq!(p.step().unwrap(), StepOutcome::Busy);
        release_tx.send(()).unwrap();

        let out = runner.join().unwrap();
        assert!(matches!(out, StepOutcome::Advanced { ref task_id, .. } if *task_id == task.id));

        // la segunda tarea no fue tocada por el step rechazado
        let others: Vec<Task> = queue
            .list()
            .unwrap()
            .into_iter()
            .filter(|t| t.id != task.id)
            .collect();
        assert_eq!(others[0].status, TaskStatus::Pending);
        assert_eq!(others[0].processed, 0);
    }

    /// Kv que hace fallar las próximas `fail_writes` escrituras.
    struct FlakyKv {
        inner: MemoryKv,
        fail_writes: AtomicUsize,
    }

    impl Kv for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
            let left = self.fail_writes.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_writes.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Storage("sin espacio".into()));
            }
            self.inner.set(key, value)
        }
        fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(key)
        }
        fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
            self.inner.scan(prefix)
        }
    }

    struct BreakStoreExecutor(Arc<FlakyKv>);

    impl Executor for BreakStoreExecutor {
        fn duplicate(
            &self,
            _source_id: u64,
            _location: &str,
            _company_id: u64,
            _schedule_date: Option<chrono::NaiveDateTime>,
        ) -> Result<u64, DupError> {
            self.0.fail_writes.store(1, Ordering::SeqCst);
            Ok(1)
        }

        fn source_exists(&self, _source_id: u64) -> Result<bool, DupError> {
            Ok(true)
        }
    }

    #[test]
    fn fallo_de_persistencia_aborta_y_libera_la_tarea() {
        let kv = Arc::new(FlakyKv {
            inner: MemoryKv::new(),
            fail_writes: AtomicUsize::new(0),
        });
        let queue = Arc::new(TaskQueue::new(kv.clone()));
        let p = BatchProcessor::new(queue.clone(), Arc::new(BreakStoreExecutor(kv)), 25);
        let task = pending_task(3);
        queue.insert(task.clone()).unwrap();

        let err = p.step().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        // nada a medias: el progreso no se guardó y la tarea volvió a pending
        let t = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.processed, 0);
        assert_counters(&t);
    }

    #[test]
    fn store_caido_en_el_ejecutor_corta_el_paso_sin_saltear_ubicaciones() {
        let exec = Arc::new(FakeExecutor::with_sources(&[7]));
        let (queue, p) = setup(exec.clone());
        let task = pending_task(30);
        queue.insert(task.clone()).unwrap();
        exec.store_down_on("loc-2");

        let err = p.step().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);

        // sólo quedan registradas las ubicaciones anteriores a la caída
        let t = queue.get(&task.id).unwrap().unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!((t.processed, t.success, t.failed), (2, 2, 0));
        assert!(t.errors.is_empty());

        // con el store de vuelta, el paso siguiente retoma desde loc-2
        exec.store_up();
        p.step().unwrap();
        let t = queue.get(&task.id).unwrap().unwrap();
        assert_eq!((t.processed, t.success, t.failed), (27, 27, 0));
        assert_counters(&t);
    }
}
