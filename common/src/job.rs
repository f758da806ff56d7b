use serde::{Deserialize, Serialize};

use crate::error::DupError;
use crate::location::LocationLists;
use crate::processor::StepOutcome;

/* --------- Requests y respuestas del server --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicationRequest {
    /// Job listing original a duplicar
    pub job_id: i64,
    pub company_id: i64,

    /// Ubicaciones explícitas, ej: ["Lima", "Quito"]
    #[serde(default)]
    pub locations: Option<Vec<String>>,

    /// O bien el id de una lista de ubicaciones guardada
    #[serde(default)]
    pub list_id: Option<String>,

    /// "2030-01-31 09:00:00" u otros formatos aceptados; vacío = sin fecha
    #[serde(default)]
    pub schedule_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDuplicationRequest {
    pub job_ids: Vec<i64>,
    pub company_id: i64,
    #[serde(default)]
    pub locations: Option<Vec<String>>,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub schedule_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationListRequest {
    pub name: String,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub started: bool,
    pub outcome: Option<StepOutcome>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCompletedResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: String,
    pub message: String,
}

/// Ubicaciones de un envío: las explícitas si vienen, si no las de la lista.
pub fn resolve_locations(
    locations: Option<&[String]>,
    list_id: Option<&str>,
    lists: &LocationLists,
) -> Result<Vec<String>, DupError> {
    if let Some(locs) = locations.filter(|l| !l.is_empty()) {
        return Ok(locs.to_vec());
    }
    match list_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => lists.locations_of(id),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use std::sync::Arc;

    #[test]
    fn request_acepta_campos_opcionales_ausentes() {
        let req: DuplicationRequest =
            serde_json::from_str(r#"{"job_id": 7, "company_id": 3, "list_id": "andes"}"#).unwrap();
        assert!(req.locations.is_none());
        assert!(req.schedule_date.is_none());
        assert_eq!(req.list_id.as_deref(), Some("andes"));
    }

    #[test]
    fn resolve_prefiere_ubicaciones_explicitas() {
        let lists = LocationLists::new(Arc::new(MemoryKv::new()), 50);
        lists
            .save("andes", &["Lima".to_string()], Some("andes"))
            .unwrap();

        let explicit = vec!["Quito".to_string()];
        assert_eq!(
            resolve_locations(Some(explicit.as_slice()), Some("andes"), &lists).unwrap(),
            explicit
        );
        assert_eq!(
            resolve_locations(Some(&[][..]), Some("andes"), &lists).unwrap(),
            vec!["Lima".to_string()]
        );
        assert_eq!(
            resolve_locations(None, Some("otra"), &lists),
            Err(DupError::ListNotFound("otra".into()))
        );
        assert!(resolve_locations(None, None, &lists).unwrap().is_empty());
    }
}
