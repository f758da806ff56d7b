use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_IMMEDIATE_LIMIT: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_TRIGGER_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_LIST_LOCATIONS: usize = 50;

/// Parámetros de la política de cola.
///
/// Se pueden sobreescribir con las env vars IMMEDIATE_LIMIT, BATCH_SIZE,
/// TRIGGER_INTERVAL_SECS y MAX_LIST_LOCATIONS.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hasta cuántas ubicaciones (sin fecha programada) se duplican en el
    /// mismo request.
    pub immediate_limit: usize,
    /// Ubicaciones procesadas por cada invocación del scheduler.
    pub batch_size: usize,
    pub trigger_interval: Duration,
    pub max_list_locations: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            immediate_limit: DEFAULT_IMMEDIATE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            trigger_interval: Duration::from_secs(DEFAULT_TRIGGER_INTERVAL_SECS),
            max_list_locations: DEFAULT_MAX_LIST_LOCATIONS,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            immediate_limit: env_or("IMMEDIATE_LIMIT", DEFAULT_IMMEDIATE_LIMIT),
            // un lote de 0 nunca avanzaría una tarea
            batch_size: env_or("BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            trigger_interval: Duration::from_secs(
                env_or("TRIGGER_INTERVAL_SECS", DEFAULT_TRIGGER_INTERVAL_SECS).max(1),
            ),
            max_list_locations: env_or("MAX_LIST_LOCATIONS", DEFAULT_MAX_LIST_LOCATIONS),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_usa_los_umbrales_conocidos() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.immediate_limit, 50);
        assert_eq!(cfg.batch_size, 25);
        assert_eq!(cfg.trigger_interval, Duration::from_secs(60));
        assert_eq!(cfg.max_list_locations, 50);
    }

    #[test]
    fn env_or_usa_default_si_no_hay_variable() {
        assert_eq!(env_or("QUEUE_CONFIG_TEST_UNSET_VAR", 7usize), 7);
    }
}
