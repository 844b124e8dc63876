//! File upload and listing endpoints.
//!
//! The upload handler authorizes against the session, streams the payload to
//! the storage provider, and records the returned reference under the owning
//! user. The metadata write happens only after the provider confirmed the
//! file, so a failed provider call never leaves a partial record.

use crate::directory::{DirectoryStore, UploadedFile};
use crate::drive::DriveClient;
use crate::session::Sessions;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Shared application state for the upload API
#[derive(Clone)]
pub struct UploadAppState {
    pub directory: Arc<DirectoryStore>,
    pub drive: Arc<DriveClient>,
    pub sessions: Sessions,
    pub body_limit_bytes: usize,
}

/// Success response for a completed upload
#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    id: String,
    #[serde(rename = "webViewLink", skip_serializing_if = "Option::is_none")]
    web_view_link: Option<String>,
}

/// Listing response
#[derive(Serialize)]
struct FilesResponse {
    files: Vec<UploadedFile>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
enum AppError {
    NoFile,
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NoFile => (StatusCode::BAD_REQUEST, "No file uploaded".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Create upload API router
pub fn create_upload_router(state: UploadAppState) -> Router {
    let body_limit = state.body_limit_bytes;
    Router::new()
        .route("/api/upload", post(upload_file))
        .route("/api/files/:user_id", get(list_files))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
}

/// One parsed multipart submission.
#[derive(Default)]
struct UploadForm {
    payload: Option<Vec<u8>>,
    original_name: Option<String>,
    mime_type: Option<String>,
    path: String,
    requested_name: String,
    user_id: Option<String>,
}

/// POST /api/upload
///
/// Multipart fields: `file` (binary), `path`, `filename`, `userId`.
///
/// The access credential comes from the active session, never from the
/// request body. A missing user record or storage root is tolerated: the
/// file then lands in the provider's default top level.
async fn upload_file(
    State(state): State<Arc<UploadAppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let form = read_upload_form(multipart).await?;

    // A concrete binary attachment is required
    let (Some(payload), Some(original_name)) = (form.payload, form.original_name) else {
        return Err(AppError::NoFile);
    };

    let session = state
        .sessions
        .from_headers(&headers)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user_id = form
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing 'userId' field".to_string()))?;

    // Lenient parent resolution: an unknown user or unset root means the
    // upload proceeds with no parent folder
    let parent_id = state
        .directory
        .get_user(&user_id)
        .map_err(|e| AppError::ServerError(format!("Failed to read user: {}", e)))?
        .map(|user| user.drive.folder_id);

    let file_name = resolve_file_name(&form.requested_name, &original_name);
    let mime_type = form
        .mime_type
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

    debug!(
        user_id = %user_id,
        file_name = %file_name,
        size = payload.len(),
        parent = parent_id.as_deref().unwrap_or("<none>"),
        "Uploading file"
    );

    let created = state
        .drive
        .create_file(
            &session.access_token,
            &file_name,
            parent_id.as_deref(),
            &mime_type,
            payload,
        )
        .await
        .map_err(|e| {
            error!(user_id = %user_id, error = %e, "Drive upload failed");
            AppError::ServerError(format!("Upload failed: {}", e))
        })?;

    // Provider confirmed the file; record the reference under the user
    let record = UploadedFile {
        id: created.id.clone(),
        web_view_link: created.web_view_link.clone(),
        path: form.path,
        file_name,
    };
    state.directory.record_file(&user_id, &record).map_err(|e| {
        error!(user_id = %user_id, file_id = %created.id, error = %e, "Failed to record uploaded file");
        AppError::ServerError(format!("Failed to record upload: {}", e))
    })?;

    info!(user_id = %user_id, file_id = %created.id, "Upload completed");

    Ok(Json(UploadResponse {
        success: true,
        id: created.id,
        web_view_link: created.web_view_link,
    }))
}

/// GET /api/files/:user_id
///
/// Lists a user's uploaded-file records, oldest first.
async fn list_files(
    State(state): State<Arc<UploadAppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<FilesResponse>, AppError> {
    state
        .sessions
        .from_headers(&headers)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let files = state
        .directory
        .list_files(&user_id)
        .map_err(|e| AppError::ServerError(format!("Failed to list files: {}", e)))?;

    Ok(Json(FilesResponse { files }))
}

/// Collect the known multipart fields, ignoring any others.
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                // Only a part with a filename counts as a binary attachment
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                form.mime_type = field.content_type().map(str::to_string);
                form.original_name = Some(file_name);
                form.payload = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?
                        .to_vec(),
                );
            }
            Some("path") => {
                form.path = read_text(field).await?;
            }
            Some("filename") => {
                form.requested_name = read_text(field).await?;
            }
            Some("userId") => {
                form.user_id = Some(read_text(field).await?);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read field: {}", e)))
}

/// Final stored name: the requested name wins over the attachment's own,
/// with the original extension carried over but never duplicated.
fn resolve_file_name(requested: &str, original: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        return original.to_string();
    }

    match extension(original) {
        Some(ext) => {
            let suffix = format!(".{}", ext);
            if requested
                .to_ascii_lowercase()
                .ends_with(&suffix.to_ascii_lowercase())
            {
                requested.to_string()
            } else {
                format!("{}{}", requested, suffix)
            }
        }
        None => requested.to_string(),
    }
}

/// Extension of a file name, if it has a real one.
fn extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}
