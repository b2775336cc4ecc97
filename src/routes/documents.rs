use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, Path, Query},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::{AppError, Result},
    model::{
        document::{Document, DocumentQuery},
        user::{User, UserType},
    },
    state::AppState,
    storage::{progress_channel, resolve_content_type, CancellationToken, IncomingFile, StorageBucket, UploadResult},
};

const UPLOAD_BODY_LIMIT: usize = 25 * 1024 * 1024;

const DOCUMENT_COLUMNS: &str =
    "id, owner_id, booking_id, service_id, name, bucket, path, url, mime_type, size_bytes, created_at";

pub fn documents_router() -> Router {
    Router::new()
        .route("/api/uploads/:bucket", post(upload_files))
        .route("/api/documents", post(upload_document))
        .route("/api/documents", get(list_documents))
        .route("/api/documents/:id", delete(delete_document))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

struct MultipartForm {
    files: Vec<IncomingFile>,
    fields: HashMap<String, String>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm> {
    let mut form = MultipartForm {
        files: Vec::new(),
        fields: HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Richiesta multipart non valida: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let declared = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Lettura del file non riuscita: {e}")))?;
                form.files.push(IncomingFile {
                    content_type: resolve_content_type(&file_name, declared.as_deref()),
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Campo {name} non valido: {e}")))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

fn ensure_bucket_access(user: &User, bucket: StorageBucket) -> Result<()> {
    if bucket == StorageBucket::ServiceImages && user.kind()? == UserType::Client {
        return Err(AppError::Forbidden(
            "Solo i fornitori possono caricare immagini dei servizi".into(),
        ));
    }
    Ok(())
}

/// `POST /api/uploads/:bucket` with one or more `file` parts.
async fn upload_files(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(bucket): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let bucket: StorageBucket = bucket
        .parse()
        .map_err(|_| AppError::NotFound(format!("Bucket sconosciuto: {bucket}")))?;
    ensure_bucket_access(&user, bucket)?;

    let form = read_multipart(multipart).await?;
    if form.files.is_empty() {
        return Err(AppError::Validation("Nessun file ricevuto".into()));
    }

    let (progress_tx, mut progress_rx) = progress_channel();
    let watcher = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = progress_rx.borrow().clone();
            debug!(
                state = ?progress.state,
                completed = progress.completed,
                total = progress.total,
                file = ?progress.current_file,
                "Upload progress"
            );
        }
    });

    let owner = user.id.to_string();
    let outcome = state
        .storage
        .upload_many(bucket, &owner, form.files, &CancellationToken::new(), &progress_tx)
        .await;
    drop(progress_tx);
    if let Err(err) = watcher.await {
        warn!(error = %err, "Upload progress watcher stopped unexpectedly");
    }

    let results = outcome?;
    info!(user_id = %user.id, bucket = bucket.as_str(), count = results.len(), "Files uploaded");
    Ok(Json(json!({ "success": true, "files": results })))
}

fn optional_uuid(fields: &HashMap<String, String>, key: &str) -> Result<Option<Uuid>> {
    match fields.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => Uuid::parse_str(raw)
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{key} non valido"))),
        None => Ok(None),
    }
}

/// The uploader must be a party to the booking, or own the service.
async fn ensure_document_links(
    state: &AppState,
    user: &User,
    booking_id: Option<Uuid>,
    service_id: Option<Uuid>,
) -> Result<()> {
    if user.is_admin() {
        return Ok(());
    }
    if let Some(booking_id) = booking_id {
        let allowed: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM bookings WHERE id = $1 AND (client_id = $2 OR provider_id = $2)")
                .bind(booking_id)
                .bind(user.id)
                .fetch_optional(&state.pool)
                .await?;
        if allowed.is_none() {
            return Err(AppError::Forbidden("Non hai accesso a questa prenotazione".into()));
        }
    }
    if let Some(service_id) = service_id {
        let allowed: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM services WHERE id = $1 AND provider_id = $2")
            .bind(service_id)
            .bind(user.id)
            .fetch_optional(&state.pool)
            .await?;
        if allowed.is_none() {
            return Err(AppError::Forbidden("Non puoi allegare documenti a questo servizio".into()));
        }
    }
    Ok(())
}

async fn upload_document(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Json<Document>> {
    let mut form = read_multipart(multipart).await?;
    let booking_id = optional_uuid(&form.fields, "booking_id")?;
    let service_id = optional_uuid(&form.fields, "service_id")?;
    ensure_document_links(&state, &user, booking_id, service_id).await?;

    if form.files.len() != 1 {
        return Err(AppError::Validation("Carica un solo documento alla volta".into()));
    }
    let file = form.files.remove(0);

    let uploaded: UploadResult = state
        .storage
        .upload(StorageBucket::Documents, &user.id.to_string(), file)
        .await?;

    let insert = format!(
        "INSERT INTO documents (id, owner_id, booking_id, service_id, name, bucket, path, url, mime_type, size_bytes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {DOCUMENT_COLUMNS}"
    );
    let stored = sqlx::query_as::<_, Document>(&insert)
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(booking_id)
        .bind(service_id)
        .bind(&uploaded.original_name)
        .bind(uploaded.bucket)
        .bind(&uploaded.path)
        .bind(&uploaded.url)
        .bind(&uploaded.content_type)
        .bind(uploaded.size_bytes as i64)
        .fetch_one(&state.pool)
        .await;

    match stored {
        Ok(document) => {
            info!(document_id = %document.id, user_id = %user.id, "Document stored");
            Ok(Json(document))
        }
        Err(err) => {
            // Keep storage in step with the table.
            if let Err(cleanup) = state.storage.delete(StorageBucket::Documents, &uploaded.path).await {
                warn!(path = %uploaded.path, error = %cleanup, "Orphaned document left in storage");
            }
            Err(err.into())
        }
    }
}

async fn list_documents(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<DocumentQuery>,
) -> Result<Json<Vec<Document>>> {
    let query = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents d
         WHERE ($1::uuid IS NULL OR d.booking_id = $1)
           AND ($2::uuid IS NULL OR d.service_id = $2)
           AND (
               $4
               OR d.owner_id = $3
               OR EXISTS (SELECT 1 FROM bookings b
                          WHERE b.id = d.booking_id AND (b.client_id = $3 OR b.provider_id = $3))
           )
         ORDER BY d.created_at DESC"
    );
    let documents = sqlx::query_as::<_, Document>(&query)
        .bind(params.booking_id)
        .bind(params.service_id)
        .bind(user.id)
        .bind(user.is_admin())
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(documents))
}

async fn delete_document(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
    let document = sqlx::query_as::<_, Document>(&query)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Documento non trovato".into()))?;

    if document.owner_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("Non puoi eliminare questo documento".into()));
    }

    let bucket: StorageBucket = document.bucket.parse()?;
    state.storage.delete(bucket, &document.path).await?;
    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    info!(document_id = %id, user_id = %user.id, "Document deleted");
    Ok(Json(json!({ "success": true })))
}
