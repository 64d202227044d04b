use actix_multipart::{Multipart, MultipartError};
use actix_web::{delete, post, web, HttpResponse};
use futures_util::stream::StreamExt;
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Form field carrying the upload.
const FILE_FIELD: &str = "file";

fn bad_body(e: MultipartError) -> AppError {
    AppError::Validation(format!("bad multipart body: {e}"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_url: String,
}

/// POST /files (multipart/form-data, field `file`)
#[post("/files")]
pub async fn upload_file(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(bad_body)?;
        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_string),
                cd.get_filename().map(str::to_string),
            ),
            None => (None, None),
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(bad_body)?;
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(AppError::Validation("file exceeds 20 MiB".into()));
            }
            bytes.extend_from_slice(&chunk);
        }

        if name.as_deref() == Some(FILE_FIELD) {
            let filename =
                filename.ok_or_else(|| AppError::Validation("file field needs a filename".into()))?;
            upload = Some((filename, bytes));
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::Validation(format!("missing `{FILE_FIELD}` field")))?;
    let file_url = state.media.store(&bytes, &filename).await?;
    tracing::info!(user_id = %user.id, size = bytes.len(), "file uploaded");
    Ok(HttpResponse::Created().json(UploadResponse { file_url }))
}

/// DELETE /files/{name}
#[delete("/files/{name}")]
pub async fn delete_file(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    name: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state.media.delete(&name).await?;
    Ok(HttpResponse::NoContent().finish())
}
