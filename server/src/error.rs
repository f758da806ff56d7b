use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{DupError, ErrorBody, ErrorKind};
use tracing::warn;

/// Error de un handler: un error del núcleo o una falla interna del server.
#[derive(Debug)]
pub enum ApiError {
    Dup(DupError),
    Internal(String),
}

impl From<DupError> for ApiError {
    fn from(e: DupError) -> Self {
        ApiError::Dup(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("tarea bloqueante abortada: {e}"))
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput | ErrorKind::NoLocations | ErrorKind::TooManyLocations => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidApiKey => StatusCode::FORBIDDEN,
        ErrorKind::SourceNotFound
        | ErrorKind::ListNotFound
        | ErrorKind::TaskNotFound
        | ErrorKind::RecordNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsertFailed | ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Dup(e) => (status_for(e.kind()), ErrorBody::from(&e)),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: ErrorKind::Persistence,
                    message: msg,
                },
            ),
        };
        if status.is_server_error() {
            warn!("request falló: {}", body.message);
        }
        (status, Json(body)).into_response()
    }
}

/// Corre una operación del núcleo en el pool bloqueante.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, DupError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
