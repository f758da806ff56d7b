use common::{DupError, ProcessFlag};
use tracing::info;

use crate::state::AppState;

/// Pasada de arranque:
/// 1. reencola las tareas que quedaron en processing
/// 2. si no queda nada pendiente, baja la bandera a idle
///
/// Devuelve true si hay trabajo pendiente para el disparador.
pub fn recover_interrupted(state: &AppState) -> Result<bool, DupError> {
    let requeued = state.queue.requeue_interrupted()?;
    if !requeued.is_empty() {
        info!("{} tareas interrumpidas vuelven a pending", requeued.len());
    }

    let pending = state.queue.has_pending()?;
    if !pending && state.queue.process_flag()? == ProcessFlag::Processing {
        info!("bandera en processing sin tareas pendientes, vuelve a idle");
        state.queue.set_process_flag(ProcessFlag::Idle)?;
    }
    Ok(pending)
}
