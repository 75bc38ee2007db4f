use crate::{error::AppError, AppState};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /:code
///
/// 1. Resolve the short code (in-memory cache first, database on a miss).
/// 2. Count the click; the database write and the `url_clicked` broadcast run
///    in a tracked background task.
/// 3. Return a 302 to the original URL without waiting for that write.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let record = match state.urls.resolve(&code).await? {
        Some(record) => record,
        None => {
            tracing::debug!("Unknown short code '{}'", code);
            return Err(AppError::NotFound);
        }
    };

    state.urls.record_click(&record);

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, record.original_url)],
    )
        .into_response())
}
