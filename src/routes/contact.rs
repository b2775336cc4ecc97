use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::ALLOW, StatusCode},
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde_json::json;
use tracing::info;

use crate::{
    contact::{ContactRequest, ContactResponse},
    error::{AppError, Result},
    state::AppState,
};

pub fn contact_router() -> Router {
    Router::new().route("/api/contact", post(send_contact).fallback(method_not_allowed))
}

async fn send_contact(
    Extension(state): Extension<AppState>,
    payload: std::result::Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<ContactResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::Validation(format!("Richiesta non valida: {}", rejection.body_text()))
    })?;
    request.validate()?;

    let email = request.to_email(&state.config.email);
    let sent = state.mailer.send(&email).await?;
    info!(message_id = %sent.message_id, "Contact form delivered");

    Ok(Json(ContactResponse {
        success: true,
        message: "Messaggio inviato con successo. Ti risponderemo al più presto.".to_string(),
    }))
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, "POST")],
        Json(json!({ "error": "Metodo non consentito" })),
    )
}
