// server/src/state.rs

use common::{
    ApiKeys, BatchProcessor, Dispatcher, Duplicator, Kv, KvRecords, LocationLists, QueueConfig,
    StatusReporter, TaskQueue,
};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::trigger::PeriodicTrigger;

/// Todo lo que comparten los handlers. Se arma una sola vez al arrancar,
/// sobre un único store clave-valor.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub processor: Arc<BatchProcessor>,
    pub reporter: StatusReporter,
    pub queue: Arc<TaskQueue>,
    pub lists: Arc<LocationLists>,
    pub api_keys: Arc<ApiKeys>,
    pub records: Arc<KvRecords>,
    pub trigger: Arc<PeriodicTrigger>,
}

impl AppState {
    pub fn build(kv: Arc<dyn Kv>, config: QueueConfig, runtime: Handle) -> Self {
        let records = Arc::new(KvRecords::new(kv.clone()));
        let executor = Arc::new(Duplicator::new(records.clone()));
        let queue = Arc::new(TaskQueue::new(kv.clone()));

        let processor = Arc::new(BatchProcessor::new(
            queue.clone(),
            executor.clone(),
            config.batch_size,
        ));
        let trigger = Arc::new(PeriodicTrigger::new(
            processor.clone(),
            config.trigger_interval,
            runtime,
        ));

        let api_keys = Arc::new(ApiKeys::new(kv.clone()));
        let lists = Arc::new(LocationLists::new(kv, config.max_list_locations));

        let dispatcher = Arc::new(Dispatcher::new(
            executor,
            queue.clone(),
            api_keys.clone(),
            trigger.clone(),
            config,
        ));

        Self {
            dispatcher,
            processor,
            reporter: StatusReporter::new(queue.clone()),
            queue,
            lists,
            api_keys,
            records,
            trigger,
        }
    }
}
