use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, sync::Mutex};

use crate::error::StoreError;
use crate::kv::{self, Kv};

pub type RecordId = u64;

pub const JOB_LISTING_KIND: &str = "job_listing";

const RECORD_PREFIX: &str = "record_";
const RECORD_SEQ_KEY: &str = "record_seq";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Publish,
    Draft,
    Pending,
    Private,
    /// Publicación futura en `date`.
    Scheduled,
}

/// Contenido almacenado (un job listing original o uno de sus duplicados).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub author: u64,
    pub status: RecordStatus,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
    #[serde(default)]
    pub menu_order: i32,
    /// Atributos secundarios (clave -> valor).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Taxonomía -> slugs de términos, en orden.
    #[serde(default)]
    pub classifications: BTreeMap<String, Vec<String>>,
}

/// Campos para crear un registro nuevo; el id lo asigna el store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(default = "default_kind")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub author: u64,
    #[serde(default = "default_status")]
    pub status: RecordStatus,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
    #[serde(default)]
    pub menu_order: i32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub classifications: BTreeMap<String, Vec<String>>,
}

fn default_kind() -> String {
    JOB_LISTING_KIND.to_string()
}

fn default_status() -> RecordStatus {
    RecordStatus::Publish
}

/// Colaborador de registros que usa el ejecutor de duplicación.
pub trait RecordStore: Send + Sync {
    fn get_record(&self, id: RecordId) -> Result<Option<Record>, StoreError>;

    fn create_record(&self, fields: NewRecord) -> Result<RecordId, StoreError>;

    /// Copia los atributos de `from` a `to`, salvo las claves en `exclude`.
    fn copy_attributes(
        &self,
        from: RecordId,
        to: RecordId,
        exclude: &[&str],
    ) -> Result<(), StoreError>;

    fn copy_classifications(&self, from: RecordId, to: RecordId) -> Result<(), StoreError>;

    /// Borra un registro. Devuelve false si no existía.
    fn delete_record(&self, id: RecordId) -> Result<bool, StoreError>;
}

/// `RecordStore` sobre el mismo colaborador clave-valor que usa la cola.
pub struct KvRecords {
    kv: Arc<dyn Kv>,
    // serializa la asignación de ids y las copias sobre un mismo registro
    lock: Mutex<()>,
}

impl KvRecords {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    fn key(id: RecordId) -> String {
        format!("{RECORD_PREFIX}{id}")
    }

    fn write(&self, record: &Record) -> Result<(), StoreError> {
        kv::save(self.kv.as_ref(), &Self::key(record.id), record)
    }

    fn require(&self, id: RecordId) -> Result<Record, StoreError> {
        self.get_record(id)?
            .ok_or_else(|| StoreError::Storage(format!("registro {id} inexistente")))
    }
}

impl RecordStore for KvRecords {
    fn get_record(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        kv::load(self.kv.as_ref(), &Self::key(id))
    }

    fn create_record(&self, fields: NewRecord) -> Result<RecordId, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Lock("records"))?;

        let last: RecordId = kv::load(self.kv.as_ref(), RECORD_SEQ_KEY)?.unwrap_or(0);
        let id = last + 1;

        let record = Record {
            id,
            kind: fields.kind,
            title: fields.title,
            content: fields.content,
            excerpt: fields.excerpt,
            author: fields.author,
            status: fields.status,
            date: fields.date,
            menu_order: fields.menu_order,
            attributes: fields.attributes,
            classifications: fields.classifications,
        };

        self.write(&record)?;
        kv::save(self.kv.as_ref(), RECORD_SEQ_KEY, &id)?;
        Ok(id)
    }

    fn copy_attributes(
        &self,
        from: RecordId,
        to: RecordId,
        exclude: &[&str],
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Lock("records"))?;

        let source = self.require(from)?;
        let mut target = self.require(to)?;

        for (k, v) in source.attributes {
            if exclude.contains(&k.as_str()) {
                continue;
            }
            target.attributes.insert(k, v);
        }
        self.write(&target)
    }

    fn copy_classifications(&self, from: RecordId, to: RecordId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Lock("records"))?;

        let source = self.require(from)?;
        let mut target = self.require(to)?;

        for (taxonomy, terms) in source.classifications {
            target.classifications.insert(taxonomy, terms);
        }
        self.write(&target)
    }

    fn delete_record(&self, id: RecordId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Lock("records"))?;
        self.kv.delete(&Self::key(id))
    }
}
