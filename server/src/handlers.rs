use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use common::{
    parse_schedule_date, resolve_locations, ApiKeyRequest, ApiKeyResponse, BulkDuplicationRequest,
    BulkOutcome, ClearCompletedResponse, DeletedResponse, DupError, DuplicationRequest,
    LocationList, LocationListRequest, NewRecord, ProcessResponse, QueueStatus, Record,
    RecordStore, StepOutcome, SubmitOutcome, Task,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{blocking, ApiError};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/duplications", post(submit_duplication))
        .route("/api/v1/duplications/bulk", post(submit_bulk))
        .route("/api/v1/queue", get(queue_status))
        .route("/api/v1/queue/process", post(process_queue))
        .route("/api/v1/queue/clear-completed", post(clear_completed))
        .route("/api/v1/queue/tasks/:id", get(get_task))
        .route(
            "/api/v1/location-lists",
            get(list_location_lists).post(create_location_list),
        )
        .route(
            "/api/v1/location-lists/:id",
            get(get_location_list)
                .put(update_location_list)
                .delete(delete_location_list),
        )
        .route("/api/v1/locations", get(unique_locations))
        .route("/api/v1/api-key", put(save_api_key))
        .route("/api/v1/api-key/validate", post(validate_api_key))
        .route("/api/v1/records", post(create_record))
        .route("/api/v1/records/:id", get(get_record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Envía una duplicación: corre en el request o queda encolada
async fn submit_duplication(
    State(state): State<AppState>,
    Json(req): Json<DuplicationRequest>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let outcome = blocking(move || {
        let schedule = parse_schedule_date(req.schedule_date.as_deref())?;
        let locations =
            resolve_locations(req.locations.as_deref(), req.list_id.as_deref(), &state.lists)?;
        state
            .dispatcher
            .submit(req.job_id, req.company_id, &locations, schedule)
    })
    .await?;

    Ok(Json(outcome))
}

// Mismo set de ubicaciones para varios jobs
async fn submit_bulk(
    State(state): State<AppState>,
    Json(req): Json<BulkDuplicationRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let outcome = blocking(move || {
        let schedule = parse_schedule_date(req.schedule_date.as_deref())?;
        let locations =
            resolve_locations(req.locations.as_deref(), req.list_id.as_deref(), &state.lists)?;
        Ok(state
            .dispatcher
            .submit_bulk(&req.job_ids, req.company_id, &locations, schedule))
    })
    .await?;

    info!(
        "duplicación masiva: {} jobs, {} encolados, {} fallidos",
        outcome.total, outcome.added_to_queue, outcome.failed
    );
    Ok(Json(outcome))
}

async fn queue_status(State(state): State<AppState>) -> Result<Json<QueueStatus>, ApiError> {
    let status = blocking(move || state.reporter.status()).await?;
    Ok(Json(status))
}

// Disparo manual del operador; 409 si no corresponde procesar ahora
async fn process_queue(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ProcessResponse>), ApiError> {
    let outcome = blocking(move || state.processor.trigger_manual()).await?;

    let resp = match outcome {
        Some(outcome) if outcome != StepOutcome::Busy => (
            StatusCode::OK,
            Json(ProcessResponse {
                started: true,
                outcome: Some(outcome),
                message: "Procesamiento de la cola iniciado.".to_string(),
            }),
        ),
        _ => (
            StatusCode::CONFLICT,
            Json(ProcessResponse {
                started: false,
                outcome: None,
                message: "No hay tareas pendientes o ya hay un procesamiento en curso."
                    .to_string(),
            }),
        ),
    };
    Ok(resp)
}

async fn clear_completed(
    State(state): State<AppState>,
) -> Result<Json<ClearCompletedResponse>, ApiError> {
    let cleared = blocking(move || state.queue.clear_completed()).await?;
    info!("{} tareas completadas borradas de la cola", cleared);
    Ok(Json(ClearCompletedResponse { cleared }))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = blocking(move || {
        state
            .queue
            .get(&id)?
            .ok_or_else(|| DupError::TaskNotFound(id.clone()))
    })
    .await?;
    Ok(Json(task))
}

/* ---------------- listas de ubicaciones ---------------- */

async fn list_location_lists(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocationList>>, ApiError> {
    let lists = blocking(move || state.lists.list_all()).await?;
    Ok(Json(lists))
}

async fn create_location_list(
    State(state): State<AppState>,
    Json(req): Json<LocationListRequest>,
) -> Result<(StatusCode, Json<LocationList>), ApiError> {
    let list = blocking(move || state.lists.save(&req.name, &req.locations, None)).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn get_location_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LocationList>, ApiError> {
    let list = blocking(move || {
        state
            .lists
            .get(&id)?
            .ok_or_else(|| DupError::ListNotFound(id.clone()))
    })
    .await?;
    Ok(Json(list))
}

async fn update_location_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LocationListRequest>,
) -> Result<Json<LocationList>, ApiError> {
    let list = blocking(move || {
        if state.lists.get(&id)?.is_none() {
            return Err(DupError::ListNotFound(id));
        }
        state.lists.save(&req.name, &req.locations, Some(&id))
    })
    .await?;
    Ok(Json(list))
}

async fn delete_location_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let id = blocking(move || state.lists.delete(&id).map(|_| id)).await?;
    Ok(Json(DeletedResponse {
        id,
        message: "Lista de ubicaciones borrada.".to_string(),
    }))
}

async fn unique_locations(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let all = blocking(move || state.lists.unique_locations()).await?;
    Ok(Json(all))
}

/* ---------------- API key ---------------- */

async fn save_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let saved = blocking(move || state.api_keys.store(&req.api_key)).await?;
    let message = if saved {
        "API key guardada."
    } else {
        "API key vacía: se borró la clave guardada."
    };
    Ok(Json(ApiKeyResponse {
        ok: saved,
        message: message.to_string(),
    }))
}

async fn validate_api_key(
    State(state): State<AppState>,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let valid = blocking(move || state.api_keys.validate(Some(&req.api_key))).await?;
    let message = if valid {
        "API key válida."
    } else {
        "API key inválida."
    };
    Ok(Json(ApiKeyResponse {
        ok: valid,
        message: message.to_string(),
    }))
}

/* ---------------- registros ---------------- */

// Alta de un job listing origen
async fn create_record(
    State(state): State<AppState>,
    Json(fields): Json<NewRecord>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let record = blocking(move || {
        let id = state.records.create_record(fields)?;
        state
            .records
            .get_record(id)?
            .ok_or(DupError::RecordNotFound(id))
    })
    .await?;
    info!("registro {} creado: {}", record.id, record.title);
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Record>, ApiError> {
    let record = blocking(move || {
        state
            .records
            .get_record(id)?
            .ok_or(DupError::RecordNotFound(id))
    })
    .await?;
    Ok(Json(record))
}
