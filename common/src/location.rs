use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

use crate::error::DupError;
use crate::kv::{self, Kv};

const LIST_PREFIX: &str = "location_list_";

/// Limpia una lista cruda de ubicaciones: recorta, colapsa espacios
/// internos, descarta vacías y quita repetidas conservando el primer orden.
pub fn normalize_locations<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for item in raw {
        let clean = item
            .as_ref()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if clean.is_empty() {
            continue;
        }
        if seen.insert(clean.clone()) {
            out.push(clean);
        }
    }
    out
}

/// Separa el texto "Lima, Quito, Bogotá" que escribe un operador.
pub fn split_location_input(input: &str) -> Vec<String> {
    input.split(',').map(|s| s.trim().to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationList {
    pub id: String,
    pub name: String,
    pub locations: Vec<String>,
    pub count: usize,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Listas de ubicaciones guardadas, una por slot `location_list_<id>`.
pub struct LocationLists {
    kv: Arc<dyn Kv>,
    max_locations: usize,
}

impl LocationLists {
    pub fn new(kv: Arc<dyn Kv>, max_locations: usize) -> Self {
        Self { kv, max_locations }
    }

    fn key(id: &str) -> Option<String> {
        let key = format!("{LIST_PREFIX}{id}");
        kv::is_valid_key(&key).then_some(key)
    }

    /// Crea la lista, o la reemplaza si `id` ya existe.
    pub fn save(
        &self,
        name: &str,
        raw_locations: &[String],
        id: Option<&str>,
    ) -> Result<LocationList, DupError> {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err(DupError::InvalidInput(
                "el nombre de la lista no puede estar vacío".into(),
            ));
        }

        let locations = normalize_locations(raw_locations);
        if locations.is_empty() {
            return Err(DupError::NoLocations);
        }
        if locations.len() > self.max_locations {
            return Err(DupError::TooManyLocations(self.max_locations));
        }

        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let key = Self::key(&id)
            .ok_or_else(|| DupError::InvalidInput(format!("id de lista inválido: {id}")))?;

        let now = Utc::now();
        let created = self.get(&id)?.map(|l| l.created).unwrap_or(now);

        let list = LocationList {
            id,
            name,
            count: locations.len(),
            locations,
            created,
            updated: now,
        };
        kv::save(self.kv.as_ref(), &key, &list)?;

        info!(
            "lista de ubicaciones {} guardada ({} ubicaciones)",
            list.id, list.count
        );
        Ok(list)
    }

    pub fn get(&self, id: &str) -> Result<Option<LocationList>, DupError> {
        match Self::key(id) {
            Some(key) => Ok(kv::load(self.kv.as_ref(), &key)?),
            None => Ok(None),
        }
    }

    /// Ubicaciones de una lista guardada, para enviar una duplicación por id.
    pub fn locations_of(&self, id: &str) -> Result<Vec<String>, DupError> {
        self.get(id)?
            .map(|l| l.locations)
            .ok_or_else(|| DupError::ListNotFound(id.to_string()))
    }

    pub fn delete(&self, id: &str) -> Result<(), DupError> {
        let key = Self::key(id).ok_or_else(|| DupError::ListNotFound(id.to_string()))?;
        if !self.kv.delete(&key)? {
            return Err(DupError::ListNotFound(id.to_string()));
        }
        info!("lista de ubicaciones {} borrada", id);
        Ok(())
    }

    /// Todas las listas, por nombre sin distinguir mayúsculas.
    pub fn list_all(&self) -> Result<Vec<LocationList>, DupError> {
        let mut lists = Vec::new();
        for (key, value) in self.kv.scan(LIST_PREFIX)? {
            match serde_json::from_value::<LocationList>(value) {
                Ok(list) => lists.push(list),
                Err(e) => warn!("slot {} corrupto, se ignora: {}", key, e),
            }
        }
        lists.sort_by_key(|l| l.name.to_lowercase());
        Ok(lists)
    }

    /// Unión ordenada de todas las ubicaciones guardadas.
    pub fn unique_locations(&self) -> Result<Vec<String>, DupError> {
        let all: BTreeSet<String> = self
            .list_all()?
            .into_iter()
            .flat_map(|l| l.locations)
            .collect();
        Ok(all.into_iter().collect())
    }
}
