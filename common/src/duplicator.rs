use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DupError;
use crate::record::{NewRecord, RecordId, RecordStatus, RecordStore, JOB_LISTING_KIND};

pub const ATTR_LOCATION: &str = "location";
pub const ATTR_COMPANY_ID: &str = "company_id";
pub const ATTR_IS_DUPLICATE: &str = "is_duplicate";
pub const ATTR_ORIGINAL_ID: &str = "original_id";

/// Atributos de marca propios de cada duplicado; nunca se heredan del origen.
pub const MARKER_ATTRIBUTES: [&str; 4] = [
    ATTR_LOCATION,
    ATTR_COMPANY_ID,
    ATTR_IS_DUPLICATE,
    ATTR_ORIGINAL_ID,
];

/// Crea un duplicado por (origen, ubicación). Sin estado entre llamadas.
pub trait Executor: Send + Sync {
    fn duplicate(
        &self,
        source_id: RecordId,
        location: &str,
        company_id: u64,
        schedule_date: Option<NaiveDateTime>,
    ) -> Result<RecordId, DupError>;

    /// true si el origen existe y es un job listing.
    fn source_exists(&self, source_id: RecordId) -> Result<bool, DupError>;
}

pub struct Duplicator {
    records: Arc<dyn RecordStore>,
}

impl Duplicator {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

impl Executor for Duplicator {
    fn duplicate(
        &self,
        source_id: RecordId,
        location: &str,
        company_id: u64,
        schedule_date: Option<NaiveDateTime>,
    ) -> Result<RecordId, DupError> {
        let source = self
            .records
            .get_record(source_id)?
            .ok_or(DupError::SourceNotFound(source_id))?;

        let (status, date) = match schedule_date {
            Some(d) => (RecordStatus::Scheduled, Some(d)),
            None => (source.status, source.date),
        };

        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert(ATTR_LOCATION.to_string(), location.to_string());
        attributes.insert(ATTR_COMPANY_ID.to_string(), company_id.to_string());
        attributes.insert(ATTR_IS_DUPLICATE.to_string(), "true".to_string());
        attributes.insert(ATTR_ORIGINAL_ID.to_string(), source_id.to_string());

        let fields = NewRecord {
            kind: source.kind,
            title: format!("{} - {}", source.title, location),
            content: source.content,
            excerpt: source.excerpt,
            author: source.author,
            status,
            date,
            menu_order: source.menu_order,
            attributes,
            classifications: Default::default(),
        };

        let new_id = self
            .records
            .create_record(fields)
            .map_err(|e| DupError::InsertFailed(e.to_string()))?;

        let copied = self
            .records
            .copy_attributes(source_id, new_id, &MARKER_ATTRIBUTES)
            .and_then(|()| self.records.copy_classifications(source_id, new_id));
        if let Err(e) = copied {
            // el duplicado a medio copiar no queda en el store
            if let Err(del) = self.records.delete_record(new_id) {
                warn!("no se pudo borrar el duplicado incompleto {}: {}", new_id, del);
            }
            return Err(e.into());
        }

        debug!(
            "job {} duplicado como {} para ubicación {}",
            source_id, new_id, location
        );
        Ok(new_id)
    }

    fn source_exists(&self, source_id: RecordId) -> Result<bool, DupError> {
        Ok(self
            .records
            .get_record(source_id)?
            .map(|r| r.kind == JOB_LISTING_KIND)
            .unwrap_or(false))
    }
}
