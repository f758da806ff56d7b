use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::credential::ApiKeys;
use crate::duplicator::Executor;
use crate::error::{DupError, ErrorBody, ErrorKind};
use crate::location::normalize_locations;
use crate::queue::TaskQueue;
use crate::record::RecordId;
use crate::task::{Task, TaskError, TaskId};

/// Quien dispara el scheduler periódico. `ensure_scheduled` es idempotente.
pub trait TriggerSchedule: Send + Sync {
    fn ensure_scheduled(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatedJob {
    pub location: String,
    pub job_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Duplicado dentro del mismo request; los fallos individuales van en
    /// `errors` y no hacen fallar el envío.
    Immediate {
        total: usize,
        duplicated: usize,
        failed: usize,
        jobs: Vec<DuplicatedJob>,
        errors: Vec<TaskError>,
    },
    Background {
        task_id: TaskId,
        total: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDetail {
    pub job_id: i64,
    pub outcome: Option<SubmitOutcome>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub added_to_queue: usize,
    pub details: Vec<BulkDetail>,
}

/// Decide si una duplicación corre en el request o se encola.
pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    queue: Arc<TaskQueue>,
    api_keys: Arc<ApiKeys>,
    trigger: Arc<dyn TriggerSchedule>,
    config: QueueConfig,
}

impl Dispatcher {
    pub fn new(
        executor: Arc<dyn Executor>,
        queue: Arc<TaskQueue>,
        api_keys: Arc<ApiKeys>,
        trigger: Arc<dyn TriggerSchedule>,
        config: QueueConfig,
    ) -> Self {
        Self {
            executor,
            queue,
            api_keys,
            trigger,
            config,
        }
    }

    pub fn submit(
        &self,
        job_id: i64,
        company_id: i64,
        raw_locations: &[String],
        schedule_date: Option<NaiveDateTime>,
    ) -> Result<SubmitOutcome, DupError> {
        let job_id = positive_id("job_id", job_id)?;
        let company_id = positive_id("company_id", company_id)?;

        if !self.api_keys.validate(None)? {
            return Err(DupError::InvalidApiKey);
        }
        if !self.executor.source_exists(job_id)? {
            return Err(DupError::SourceNotFound(job_id));
        }

        let locations = normalize_locations(raw_locations);
        if locations.is_empty() {
            return Err(DupError::NoLocations);
        }

        if locations.len() <= self.config.immediate_limit && schedule_date.is_none() {
            self.run_immediate(job_id, company_id, locations)
        } else {
            self.enqueue(job_id, company_id, locations, schedule_date)
        }
    }

    /// Envía el mismo conjunto de ubicaciones para varios jobs; un job que
    /// falla no corta a los demás.
    pub fn submit_bulk(
        &self,
        job_ids: &[i64],
        company_id: i64,
        raw_locations: &[String],
        schedule_date: Option<NaiveDateTime>,
    ) -> BulkOutcome {
        let mut out = BulkOutcome {
            total: job_ids.len(),
            processed: 0,
            failed: 0,
            added_to_queue: 0,
            details: Vec::with_capacity(job_ids.len()),
        };

        for &job_id in job_ids {
            out.processed += 1;
            match self.submit(job_id, company_id, raw_locations, schedule_date) {
                Ok(outcome) => {
                    if matches!(outcome, SubmitOutcome::Background { .. }) {
                        out.added_to_queue += 1;
                    }
                    out.details.push(BulkDetail {
                        job_id,
                        outcome: Some(outcome),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("duplicación masiva: job {} falló: {}", job_id, e);
                    out.failed += 1;
                    out.details.push(BulkDetail {
                        job_id,
                        outcome: None,
                        error: Some(ErrorBody::from(&e)),
                    });
                }
            }
        }
        out
    }

    fn run_immediate(
        &self,
        job_id: RecordId,
        company_id: u64,
        locations: Vec<String>,
    ) -> Result<SubmitOutcome, DupError> {
        let mut jobs = Vec::new();
        let mut errors = Vec::new();

        for location in &locations {
            match self.executor.duplicate(job_id, location, company_id, None) {
                Ok(new_id) => jobs.push(DuplicatedJob {
                    location: location.clone(),
                    job_id: new_id,
                }),
                Err(e) if e.kind() == ErrorKind::Persistence => return Err(e),
                Err(e) => errors.push(TaskError {
                    location: location.clone(),
                    error_kind: e.kind(),
                    message: e.to_string(),
                }),
            }
        }

        info!(
            "job {} duplicado en el request: {} ok, {} con error",
            job_id,
            jobs.len(),
            errors.len()
        );

        Ok(SubmitOutcome::Immediate {
            total: locations.len(),
            duplicated: jobs.len(),
            failed: errors.len(),
            jobs,
            errors,
        })
    }

    fn enqueue(
        &self,
        job_id: RecordId,
        company_id: u64,
        locations: Vec<String>,
        schedule_date: Option<NaiveDateTime>,
    ) -> Result<SubmitOutcome, DupError> {
        let task = Task::new(job_id, company_id, locations, schedule_date);
        let task_id = task.id.clone();
        let total = task.total;

        self.queue.insert(task)?;
        self.trigger.ensure_scheduled();

        info!(
            "job {} encolado como tarea {} ({} ubicaciones)",
            job_id, task_id, total
        );

        Ok(SubmitOutcome::Background {
            task_id,
            total,
            message: format!(
                "Duplicación agregada a la cola. Se procesarán {total} ubicaciones."
            ),
        })
    }
}

fn positive_id(field: &str, value: i64) -> Result<u64, DupError> {
    if value <= 0 {
        return Err(DupError::InvalidInput(format!("{field} inválido: {value}")));
    }
    Ok(value as u64)
}

const SCHEDULE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Interpreta la fecha programada que manda un operador. Vacía = sin fecha.
pub fn parse_schedule_date(raw: Option<&str>) -> Result<Option<NaiveDateTime>, DupError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    for fmt in SCHEDULE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(dt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0));
    }

    Err(DupError::InvalidInput(format!(
        "fecha programada inválida: {raw}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::task::TaskStatus;
    use crate::testing::{CountingTrigger, FakeExecutor};

    struct Fixture {
        dispatcher: Dispatcher,
        executor: Arc<FakeExecutor>,
        queue: Arc<TaskQueue>,
        trigger: Arc<CountingTrigger>,
        api_keys: Arc<ApiKeys>,
    }

    fn fixture() -> Fixture {
        let kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
        let executor = Arc::new(FakeExecutor::with_sources(&[7]));
        let queue = Arc::new(TaskQueue::new(kv.clone()));
        let api_keys = Arc::new(ApiKeys::new(kv));
        api_keys.store("clave").unwrap();
        let trigger = Arc::new(CountingTrigger::default());

        let dispatcher = Dispatcher::new(
            executor.clone(),
            queue.clone(),
            api_keys.clone(),
            trigger.clone(),
            QueueConfig::default(),
        );
        Fixture {
            dispatcher,
            executor,
            queue,
            trigger,
            api_keys,
        }
    }

    fn locs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ciudad-{i}")).collect()
    }

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2031, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn cincuenta_ubicaciones_es_inmediato() {
        let f = fixture();
        let out = f.dispatcher.submit(7, 3, &locs(50), None).unwrap();
        assert!(matches!(out, SubmitOutcome::Immediate { total: 50, .. }));
        assert!(f.queue.is_empty().unwrap());
        assert_eq!(f.trigger.count(), 0);
    }

    #[test]
    fn cincuenta_y_una_va_a_la_cola() {
        let f = fixture();
        let out = f.dispatcher.submit(7, 3, &locs(51), None).unwrap();

        let SubmitOutcome::Background { task_id, total, .. } = out else {
            panic!("esperaba modo background");
        };
        assert_eq!(total, 51);

        let task = f.queue.get(&task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.processed, 0);
        assert_eq!(task.total, 51);
        assert_eq!(f.trigger.count(), 1);
        assert_eq!(f.executor.calls(), 0);
    }

    #[test]
    fn fecha_programada_siempre_va_a_la_cola() {
        let f = fixture();
        let out = f.dispatcher.submit(7, 3, &locs(1), Some(date())).unwrap();
        let SubmitOutcome::Background { task_id, .. } = out else {
            panic!("esperaba modo background");
        };
        assert_eq!(
            f.queue.get(&task_id).unwrap().unwrap().schedule_date,
            Some(date())
        );
    }

    #[test]
    fn escenario_inmediato_completo() {
        let f = fixture();
        let raw: Vec<String> = ["NYC", "LA", "SF"].iter().map(|s| s.to_string()).collect();

        let out = f.dispatcher.submit(7, 3, &raw, None).unwrap();

        assert_eq!(f.executor.calls(), 3);
        match out {
            SubmitOutcome::Immediate {
                total,
                duplicated,
                failed,
                jobs,
                errors,
            } => {
                assert_eq!((total, duplicated, failed), (3, 3, 0));
                let where_: Vec<&str> = jobs.iter().map(|j| j.location.as_str()).collect();
                assert_eq!(where_, vec!["NYC", "LA", "SF"]);
                assert!(errors.is_empty());
            }
            other => panic!("esperaba inmediato, vino {other:?}"),
        }
    }

    #[test]
    fn fallos_individuales_no_hacen_fallar_el_envio() {
        let f = fixture();
        f.executor.fail_on("LA");
        let raw: Vec<String> = ["NYC", "LA"].iter().map(|s| s.to_string()).collect();

        let out = f.dispatcher.submit(7, 3, &raw, None).unwrap();
        let SubmitOutcome::Immediate { failed, errors, .. } = out else {
            panic!("esperaba inmediato");
        };
        assert_eq!(failed, 1);
        assert_eq!(errors[0].location, "LA");
    }

    #[test]
    fn store_caido_hace_fallar_el_envio_inmediato() {
        let f = fixture();
        f.executor.store_down_on("LA");
        let raw: Vec<String> = ["NYC", "LA", "SF"].iter().map(|s| s.to_string()).collect();

        let err = f.dispatcher.submit(7, 3, &raw, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        // SF no se intentó
        assert_eq!(f.executor.calls(), 2);
    }

    #[test]
    fn validaciones_previas_no_tocan_la_cola() {
        let f = fixture();
        assert!(matches!(
            f.dispatcher.submit(0, 3, &locs(1), None),
            Err(DupError::InvalidInput(_))
        ));
        assert!(matches!(
            f.dispatcher.submit(7, -1, &locs(1), None),
            Err(DupError::InvalidInput(_))
        ));
        assert_eq!(
            f.dispatcher.submit(7, 3, &[" ".to_string()], None),
            Err(DupError::NoLocations)
        );
        assert_eq!(
            f.dispatcher.submit(8, 3, &locs(60), None),
            Err(DupError::SourceNotFound(8))
        );
        assert!(f.queue.is_empty().unwrap());
        assert_eq!(f.executor.calls(), 0);
    }

    #[test]
    fn sin_api_key_se_rechaza() {
        let f = fixture();
        f.api_keys.store("").unwrap();
        assert_eq!(
            f.dispatcher.submit(7, 3, &locs(1), None),
            Err(DupError::InvalidApiKey)
        );
    }

    #[test]
    fn bulk_cuenta_encolados_y_fallidos() {
        let f = fixture();
        let out = f.dispatcher.submit_bulk(&[7, 99, 7], 3, &locs(51), None);

        assert_eq!(out.total, 3);
        assert_eq!(out.processed, 3);
        assert_eq!(out.failed, 1);
        assert_eq!(out.added_to_queue, 2);
        assert!(out.details[1].error.is_some());
        assert_eq!(f.queue.list().unwrap().len(), 2);
    }

    #[test]
    fn parse_schedule_date_formatos() {
        let expected = Some(date());
        assert_eq!(parse_schedule_date(Some("2031-05-01 08:30:00")).unwrap(), expected);
        assert_eq!(parse_schedule_date(Some("2031-05-01T08:30:00")).unwrap(), expected);
        assert_eq!(parse_schedule_date(Some("2031-05-01T08:30")).unwrap(), expected);
        assert_eq!(
            parse_schedule_date(Some("2031-05-01")).unwrap(),
            NaiveDate::from_ymd_opt(2031, 5, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_schedule_date(Some("   ")).unwrap(), None);
        assert_eq!(parse_schedule_date(None).unwrap(), None);
        assert!(parse_schedule_date(Some("mañana")).is_err());
    }

    #[test]
    fn outcome_se_serializa_con_mode() {
        let out = SubmitOutcome::Background {
            task_id: "task_1".into(),
            total: 60,
            message: "ok".into(),
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["mode"], "background");
        assert_eq!(v["task_id"], "task_1");
    }
}
