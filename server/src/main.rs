mod error;
mod handlers;
mod recovery;
mod state;
mod trigger;

use std::{env, sync::Arc};

use anyhow::Context;
use common::{FileKv, Kv, MemoryKv, QueueConfig, TriggerSchedule};
use tokio::{net::TcpListener, runtime::Handle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOG_FILTER: &str = "server=debug,common=debug,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = QueueConfig::from_env();
    info!(
        "config: inmediato hasta {} ubicaciones, lotes de {}, tick cada {:?}",
        config.immediate_limit, config.batch_size, config.trigger_interval
    );

    // store compartido: en disco si hay DATA_DIR, si no en memoria
    let kv: Arc<dyn Kv> = match env::var("DATA_DIR").ok() {
        Some(dir) => {
            info!("persistiendo en {}", dir);
            Arc::new(FileKv::open(&dir).with_context(|| format!("abriendo DATA_DIR {dir}"))?)
        }
        None => {
            warn!("DATA_DIR no definido: la cola vive sólo en memoria");
            Arc::new(MemoryKv::new())
        }
    };

    let state = AppState::build(kv, config, Handle::current());

    // tareas que quedaron a medias en una corrida anterior
    if recovery::recover_interrupted(&state)? {
        state.trigger.ensure_scheduled();
    }

    let app = handlers::build_router(state);

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind en {addr}"))?;
    info!("server escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
