use crate::{error::AppError, models::UrlView, AppState};
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::header,
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    url: Option<String>,
    #[serde(rename = "originalUrl")]
    original_url: Option<String>,
}

impl ShortenRequest {
    /// Read the body as a form when it says so, JSON otherwise.
    async fn read(request: Request) -> Result<Self, AppError> {
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(body) = Form::<Self>::from_request(request, &())
                .await
                .map_err(|e| AppError::InvalidBody(e.body_text()))?;
            Ok(body)
        } else {
            let Json(body) = Json::<Self>::from_request(request, &())
                .await
                .map_err(|e| AppError::InvalidBody(e.body_text()))?;
            Ok(body)
        }
    }
}

/// POST /api/shorten
///
/// Accepts `{url}` (or `{originalUrl}`) as JSON or a urlencoded form and
/// returns the new or existing record.
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<UrlView>, AppError> {
    let body = ShortenRequest::read(request).await?;

    let url = body
        .url
        .filter(|u| !u.trim().is_empty())
        .or(body.original_url)
        .ok_or(AppError::MissingUrl)?;

    let shortened = state.urls.shorten(&url, None).await?;
    Ok(Json(state.urls.view(&shortened.record)))
}

/// GET /api/urls
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UrlView>>, AppError> {
    Ok(Json(state.urls.list_views().await?))
}

/// DELETE /api/urls/:id
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id: i64 = id.parse().map_err(|_| AppError::InvalidId(id))?;
    state.urls.delete(id).await?;
    Ok(Json(json!({ "success": true })))
}
