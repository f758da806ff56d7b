use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{DupError, ErrorKind};
use crate::record::RecordId;

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    /// Sólo dura lo que dura una invocación del scheduler.
    Processing,
    Completed,
}

/// Bandera global de procesamiento: refleja "la cola tiene trabajo pendiente".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessFlag {
    #[default]
    Idle,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub location: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Una duplicación diferida: un job origen hacia una lista de ubicaciones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: RecordId,
    pub company_id: u64,
    pub locations: Vec<String>,
    pub schedule_date: Option<NaiveDateTime>,

    pub status: TaskStatus,
    /// Cursor dentro de `locations`.
    pub processed: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<TaskError>,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        job_id: RecordId,
        company_id: u64,
        locations: Vec<String>,
        schedule_date: Option<NaiveDateTime>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4().simple()),
            job_id,
            company_id,
            total: locations.len(),
            locations,
            schedule_date,
            status: TaskStatus::Pending,
            processed: 0,
            success: 0,
            failed: 0,
            errors: Vec::new(),
            created: now,
            updated: now,
            completed: None,
        }
    }

    /// Rango `[processed, min(processed + batch_size, total))`.
    pub fn next_batch(&self, batch_size: usize) -> Range<usize> {
        let start = self.processed.min(self.total);
        let end = (start + batch_size).min(self.total);
        start..end
    }

    pub fn is_done(&self) -> bool {
        self.processed >= self.total
    }

    pub fn record_success(&mut self) {
        if self.is_done() {
            return;
        }
        self.success += 1;
        self.processed += 1;
        self.updated = Utc::now();
    }

    pub fn record_failure(&mut self, location: &str, err: &DupError) {
        if self.is_done() {
            return;
        }
        self.failed += 1;
        self.errors.push(TaskError {
            location: location.to_string(),
            error_kind: err.kind(),
            message: err.to_string(),
        });
        self.processed += 1;
        self.updated = Utc::now();
    }

    /// Cierra el lote: completed si ya no quedan ubicaciones, pending si no.
    pub fn finish_batch(&mut self) {
        let now = Utc::now();
        if self.is_done() {
            self.status = TaskStatus::Completed;
            self.completed = Some(now);
        } else {
            self.status = TaskStatus::Pending;
        }
        self.updated = now;
    }
}
