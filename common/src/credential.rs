use std::sync::Arc;
use tracing::info;

use crate::error::DupError;
use crate::kv::{self, Kv};

const API_KEY_SLOT: &str = "api_key";

/// API key que habilita el envío de duplicaciones.
///
/// No hay validación remota: cualquier clave no vacía se acepta.
pub struct ApiKeys {
    kv: Arc<dyn Kv>,
}

impl ApiKeys {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Guarda la clave. Una clave vacía borra la guardada y devuelve false.
    pub fn store(&self, key: &str) -> Result<bool, DupError> {
        let key = key.trim();
        if key.is_empty() {
            self.kv.delete(API_KEY_SLOT)?;
            info!("API key borrada");
            return Ok(false);
        }
        kv::save(self.kv.as_ref(), API_KEY_SLOT, &key)?;
        info!("API key guardada");
        Ok(true)
    }

    pub fn stored(&self) -> Result<Option<String>, DupError> {
        Ok(kv::load(self.kv.as_ref(), API_KEY_SLOT)?)
    }

    /// Valida `key`, o la clave guardada si es None.
    pub fn validate(&self, key: Option<&str>) -> Result<bool, DupError> {
        let key = match key {
            Some(k) => k.trim().to_string(),
            None => self.stored()?.unwrap_or_default(),
        };
        Ok(!key.is_empty())
    }
}
