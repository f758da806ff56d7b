use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use common::{BatchProcessor, StepOutcome, TriggerSchedule};
use tokio::{runtime::Handle, time::sleep};
use tracing::{debug, info, warn};

/// Disparador periódico del scheduler. Se programa una sola vez: al
/// arrancar si ya hay trabajo pendiente, o con el primer envío encolado.
pub struct PeriodicTrigger {
    processor: Arc<BatchProcessor>,
    interval: Duration,
    runtime: Handle,
    scheduled: AtomicBool,
}

impl PeriodicTrigger {
    pub fn new(processor: Arc<BatchProcessor>, interval: Duration, runtime: Handle) -> Self {
        Self {
            processor,
            interval,
            runtime,
            scheduled: AtomicBool::new(false),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }
}

impl TriggerSchedule for PeriodicTrigger {
    fn ensure_scheduled(&self) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disparador periódico programado cada {:?}", self.interval);
        self.runtime
            .spawn(run_trigger_loop(self.processor.clone(), self.interval));
    }
}

/// Loop principal del disparador: un `step` por intervalo, en el pool
/// bloqueante para no frenar el runtime.
pub async fn run_trigger_loop(processor: Arc<BatchProcessor>, interval: Duration) {
    loop {
        sleep(interval).await;

        let p = processor.clone();
        match tokio::task::spawn_blocking(move || p.step()).await {
            Ok(Ok(StepOutcome::Advanced {
                task_id,
                processed,
                total,
                status,
                ..
            })) => {
                info!(
                    "tick: tarea {} en {}/{} ({:?})",
                    task_id, processed, total, status
                );
            }
            Ok(Ok(other)) => {
                debug!("tick sin avance: {:?}", other);
            }
            Ok(Err(e)) => {
                warn!("error en el tick del scheduler: {}", e);
            }
            Err(e) => {
                warn!("panic o join error en el tick del scheduler: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Duplicator, KvRecords, MemoryKv, TaskQueue};

    #[tokio::test]
    async fn ensure_scheduled_es_idempotente() {
        let kv = Arc::new(MemoryKv::new());
        let queue = Arc::new(TaskQueue::new(kv.clone()));
        let exec = Arc::new(Duplicator::new(Arc::new(KvRecords::new(kv))));
        let processor = Arc::new(BatchProcessor::new(queue, exec, 25));
        let trigger = PeriodicTrigger::new(processor, Duration::from_secs(3600), Handle::current());

        assert!(!trigger.is_scheduled());
        trigger.ensure_scheduled();
        trigger.ensure_scheduled();
        assert!(trigger.is_scheduled());
    }
}
