use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordId;
use crate::task::TaskId;

/// Errores de la capa clave-valor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("clave inválida: {0}")]
    InvalidKey(String),

    #[error("error de almacenamiento: {0}")]
    Storage(String),

    #[error("error de serialización: {0}")]
    Serialization(String),

    #[error("lock envenenado: {0}")]
    Lock(&'static str),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Conjunto cerrado de errores del núcleo de duplicación.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DupError {
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    #[error("no se recibieron ubicaciones válidas")]
    NoLocations,

    #[error("el job {0} no existe o no es un job_listing")]
    SourceNotFound(RecordId),

    #[error("no se pudo crear el duplicado: {0}")]
    InsertFailed(String),

    #[error("API key inválida, revisa la configuración")]
    InvalidApiKey,

    #[error("lista de ubicaciones {0} no encontrada")]
    ListNotFound(String),

    #[error("máximo {0} ubicaciones por lista")]
    TooManyLocations(usize),

    #[error("tarea {0} no encontrada")]
    TaskNotFound(TaskId),

    #[error("registro {0} no encontrado")]
    RecordNotFound(RecordId),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Versión serializable del tipo de error, la que viaja en respuestas y en
/// el historial de errores de cada tarea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NoLocations,
    SourceNotFound,
    InsertFailed,
    InvalidApiKey,
    ListNotFound,
    TooManyLocations,
    TaskNotFound,
    RecordNotFound,
    Persistence,
}

impl DupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DupError::InvalidInput(_) => ErrorKind::InvalidInput,
            DupError::NoLocations => ErrorKind::NoLocations,
            DupError::SourceNotFound(_) => ErrorKind::SourceNotFound,
            DupError::InsertFailed(_) => ErrorKind::InsertFailed,
            DupError::InvalidApiKey => ErrorKind::InvalidApiKey,
            DupError::ListNotFound(_) => ErrorKind::ListNotFound,
            DupError::TooManyLocations(_) => ErrorKind::TooManyLocations,
            DupError::TaskNotFound(_) => ErrorKind::TaskNotFound,
            DupError::RecordNotFound(_) => ErrorKind::RecordNotFound,
            DupError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

/// Cuerpo JSON de error que devuelve el server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&DupError> for ErrorBody {
    fn from(e: &DupError) -> Self {
        ErrorBody {
            error: e.kind(),
            message: e.to_string(),
        }
    }
}
