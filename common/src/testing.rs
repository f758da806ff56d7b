//! Dobles de prueba compartidos por los tests del crate.

use chrono::NaiveDateTime;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
};

use crate::dispatch::TriggerSchedule;
use crate::duplicator::Executor;
use crate::error::{DupError, StoreError};
use crate::record::RecordId;

/// Ejecutor que no guarda nada: cuenta llamadas y falla en las ubicaciones
/// marcadas con `fail_on`. Con `store_down_on` simula un store caído.
pub struct FakeExecutor {
    sources: HashSet<RecordId>,
    failing: Mutex<HashSet<String>>,
    store_down: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeExecutor {
    pub fn with_sources(ids: &[RecordId]) -> Self {
        Self {
            sources: ids.iter().copied().collect(),
            failing: Mutex::new(HashSet::new()),
            store_down: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            next_id: AtomicU64::new(1000),
        }
    }

    pub fn fail_on(&self, location: &str) {
        self.failing.lock().unwrap().insert(location.to_string());
    }

    pub fn store_down_on(&self, location: &str) {
        self.store_down.lock().unwrap().insert(location.to_string());
    }

    pub fn store_up(&self) {
        self.store_down.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Executor for FakeExecutor {
    fn duplicate(
        &self,
        source_id: RecordId,
        location: &str,
        _company_id: u64,
        _schedule_date: Option<NaiveDateTime>,
    ) -> Result<RecordId, DupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.sources.contains(&source_id) {
            return Err(DupError::SourceNotFound(source_id));
        }
        if self.store_down.lock().unwrap().contains(location) {
            return Err(DupError::Persistence(StoreError::Storage(
                "store caído".into(),
            )));
        }
        if self.failing.lock().unwrap().contains(location) {
            return Err(DupError::SourceNotFound(source_id));
        }
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn source_exists(&self, source_id: RecordId) -> Result<bool, DupError> {
        Ok(self.sources.contains(&source_id))
    }
}

#[derive(Default)]
pub struct CountingTrigger {
    count: AtomicUsize,
}

impl CountingTrigger {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl TriggerSchedule for CountingTrigger {
    fn ensure_scheduled(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
