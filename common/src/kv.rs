use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// Colaborador de persistencia: slots con nombre que guardan un valor JSON.
///
/// La única garantía es atomicidad por clave; cualquier secuencia
/// leer-modificar-escribir la tiene que serializar quien llama.
pub trait Kv: Send + Sync {
    /// Devuelve el valor de la clave, o None si no existe.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Borra la clave. Devuelve false si no existía.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Todos los pares (clave, valor) cuyo nombre empieza con `prefix`,
    /// ordenados por clave.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;
}

/// Lee y deserializa una clave.
pub fn load<T: DeserializeOwned>(kv: &dyn Kv, key: &str) -> Result<Option<T>, StoreError> {
    match kv.get(key)? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

/// Serializa y escribe una clave.
pub fn save<T: Serialize>(kv: &dyn Kv, key: &str, value: &T) -> Result<(), StoreError> {
    kv.set(key, serde_json::to_value(value)?)
}

/// Sólo letras, dígitos, '_' y '-': las claves terminan siendo nombres de archivo.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/* ---------------- en memoria ---------------- */

#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<BTreeMap<String, Value>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kv for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Lock("memory kv"))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Lock("memory kv"))?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Lock("memory kv"))?;
        Ok(data.remove(key).is_some())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Lock("memory kv"))?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/* ---------------- en disco ---------------- */

/// Un archivo `<clave>.json` por slot dentro de `dir`.
///
/// Cada escritura va a un archivo temporal y luego se renombra encima del
/// definitivo, así un lector nunca ve un valor a medio escribir.
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn write_file(path: &Path, value: &Value) -> Result<(), StoreError> {
    let mut file = fs::File::create(path)?;
    serde_json::to_writer(&mut file, value)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

impl Kv for FileKv {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // temporal propio de cada escritura: dos escritores de la misma
        // clave nunca comparten archivo
        let tmp = self
            .dir
            .join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));

        let written = write_file(&tmp, &value)
            .and_then(|()| fs::rename(&tmp, &path).map_err(StoreError::from));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written?;

        debug!("slot {} escrito en {}", key, path.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut keys: Vec<String> = Vec::new();

        for entry in fs::read_dir(&self.dir)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = name.strip_suffix(".json") {
                if key.starts_with(prefix) {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            // puede haberse borrado entre read_dir y get
            if let Some(v) = self.get(&key)? {
                out.push((key, v));
            }
        }
        Ok(out)
    }
}
