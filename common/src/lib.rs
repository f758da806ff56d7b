pub mod config;
pub mod credential;
pub mod dispatch;
pub mod duplicator;
pub mod error;
pub mod job;
pub mod kv;
pub mod location;
pub mod processor;
pub mod queue;
pub mod record;
pub mod status;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use config::QueueConfig;
pub use credential::ApiKeys;
pub use dispatch::{
    parse_schedule_date, BulkDetail, BulkOutcome, Dispatcher, DuplicatedJob, SubmitOutcome,
    TriggerSchedule,
};
pub use duplicator::{Duplicator, Executor};
pub use error::{DupError, ErrorBody, ErrorKind, StoreError};
pub use job::{
    resolve_locations, ApiKeyRequest, ApiKeyResponse, BulkDuplicationRequest,
    ClearCompletedResponse, DeletedResponse, DuplicationRequest, LocationListRequest,
    ProcessResponse,
};
pub use kv::{FileKv, Kv, MemoryKv};
pub use location::{normalize_locations, split_location_input, LocationList, LocationLists};
pub use processor::{BatchProcessor, StepOutcome};
pub use queue::TaskQueue;
pub use record::{KvRecords, NewRecord, Record, RecordId, RecordStatus, RecordStore};
pub use status::{QueueStatus, StatusReporter};
pub use task::{ProcessFlag, Task, TaskError, TaskId, TaskStatus};
