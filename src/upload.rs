//! multipart 上传处理器。

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::atomic::AtomicFile;
use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::locking::LockManager;
use crate::storage::Storage;

const FILE_FIELD: &str = "file";
const PATH_FIELD: &str = "path";
const FILENAME_FIELD: &str = "filename";
const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    pub path: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
}

/// The file part, already streamed into a staging file.
struct StagedPart {
    file: AtomicFile,
    original_name: Option<String>,
    mimetype: String,
}

#[derive(Default)]
struct UploadForm {
    path: Option<String>,
    filename: Option<String>,
    part: Option<StagedPart>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(part) = self.part {
            part.file.cleanup().await;
        }
    }
}

/// 接收 multipart 上传并写入上传根目录。
pub async fn upload_file(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(locks): Extension<Arc<LockManager>>,
    Extension(config): Extension<Arc<GatewayConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let result: Result<UploadResponse, ApiError> = async {
        let mut multipart =
            multipart.map_err(|rejection| ApiError::MalformedUpload(rejection.body_text()))?;
        let form = read_form(&storage, config.max_file_size, &mut multipart).await?;
        store_form(&storage, &locks, &config, form).await
    }
    .await;

    match &result {
        Ok(response) => info!(
            path = response.path,
            filename = response.filename,
            size = response.size,
            mimetype = response.mimetype,
            "file saved"
        ),
        Err(err) => warn!(status = %err.status(), error = %err, "upload failed"),
    }
    result.map(JsonResponse)
}

async fn read_form(
    storage: &Storage,
    limit: u64,
    multipart: &mut Multipart,
) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    match collect_fields(storage, limit, multipart, &mut form).await {
        Ok(()) => Ok(form),
        Err(err) => {
            form.discard().await;
            Err(err)
        }
    }
}

async fn collect_fields(
    storage: &Storage,
    limit: u64,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            // A `file` part without a filename is a plain text field, not an upload.
            Some(FILE_FIELD) if field.file_name().is_some() => {
                if form.part.is_some() {
                    return Err(ApiError::MalformedUpload(
                        "multiple file parts are not supported".into(),
                    ));
                }
                let file = storage.begin_write(limit).await.map_err(ApiError::upload)?;
                let part = form.part.insert(StagedPart {
                    file,
                    original_name: field.file_name().map(client_basename),
                    mimetype: field.content_type().unwrap_or(DEFAULT_MIME).to_string(),
                });
                stream_field(field, &mut part.file, limit).await?;
            }
            Some(PATH_FIELD) => {
                form.path = Some(read_text(field, limit).await?);
            }
            Some(FILENAME_FIELD) => {
                form.filename = Some(read_text(field, limit).await?);
            }
            // Unknown parts are drained by the next `next_field` call.
            _ => {}
        }
    }
    Ok(())
}

async fn stream_field(
    mut field: Field<'_>,
    file: &mut AtomicFile,
    limit: u64,
) -> Result<(), ApiError> {
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if chunk.is_empty() {
            continue;
        }
        file.write_chunk(&chunk).await.map_err(ApiError::upload)?;
    }
    debug!(staging = ?file.temp_path(), bytes = file.written(), "file part staged");
    Ok(())
}

async fn read_text(field: Field<'_>, limit: u64) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| multipart_error(err, limit))
}

/// Last segment of a client-supplied filename; browsers and some clients send
/// `C:\fakepath\photo.png` or `folder/photo.png`.
fn client_basename(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

fn multipart_error(err: MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::MalformedUpload(err.body_text())
    }
}

async fn store_form(
    storage: &Storage,
    locks: &LockManager,
    config: &GatewayConfig,
    form: UploadForm,
) -> Result<UploadResponse, ApiError> {
    let UploadForm {
        path,
        filename,
        part,
    } = form;
    let Some(part) = part else {
        return Err(ApiError::NoFileProvided);
    };

    let relative_path = path.unwrap_or_default();
    let filename = filename
        .filter(|name| !name.trim().is_empty())
        .or(part.original_name)
        .unwrap_or_default();

    let target = match storage.resolve_destination(&relative_path, &filename).await {
        Ok(target) => target,
        Err(err) => {
            part.file.cleanup().await;
            return Err(ApiError::upload(err));
        }
    };

    let _guard = match locks
        .lock_path_with_timeout(&target.key(), config.lock_timeout)
        .await
    {
        Ok(guard) => guard,
        Err(_) => {
            part.file.cleanup().await;
            return Err(ApiError::PathLocked);
        }
    };
    let size = storage
        .commit(part.file, &target)
        .await
        .map_err(ApiError::upload)?;

    Ok(UploadResponse {
        success: true,
        url: format!("{}/uploads/{}", config.base_url, target.key()),
        path: target.dir.clone(),
        filename: target.filename.clone(),
        size,
        mimetype: part.mimetype,
    })
}
