//! 按存储路径读取文件，支持条件请求与单段 Range。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path as UrlPath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::fmt_http_date;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, if_range_matches, is_not_modified};
use crate::storage::Storage;

/// 读取 `/file/{*path}` 指向的文件。
pub async fn retrieve_file(
    UrlPath(path): UrlPath<String>,
    request_headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let result = serve_stored(&path, &request_headers, &storage).await;
    if let Err(err) = &result {
        match err {
            ApiError::NotFound => debug!(path, "file not found"),
            _ => warn!(path, error = %err, "error retrieving file"),
        }
    }
    result
}

async fn serve_stored(
    path: &str,
    request_headers: &HeaderMap,
    storage: &Storage,
) -> Result<Response, ApiError> {
    let (mut file, metadata) = storage.open_stored(path).await.map_err(ApiError::retrieve)?;
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, header::ETAG, &etag)?;
    if let Some(modified) = modified {
        insert_header(&mut headers, header::LAST_MODIFIED, &fmt_http_date(modified))?;
    }

    if is_not_modified(request_headers, &etag, modified) {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    insert_header(&mut headers, header::CONTENT_TYPE, mime.essence_str())?;
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let range = match request_headers.get(header::RANGE) {
        Some(value) if if_range_matches(request_headers, &etag, modified) => {
            parse_range(value, file_size)?
        }
        _ => None,
    };

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(path, start, end, length, "range request accepted");
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::RetrieveFailed(err.to_string()))?;
        insert_header(
            &mut headers,
            header::CONTENT_RANGE,
            &format!("bytes {start}-{end}/{file_size}"),
        )?;
        insert_header(&mut headers, header::CONTENT_LENGTH, &length.to_string())?;
        let stream = ReaderStream::new(file.take(length));
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    insert_header(&mut headers, header::CONTENT_LENGTH, &file_size.to_string())?;
    info!(path, size = file_size, "serve file");
    Ok((
        StatusCode::OK,
        headers,
        AxumBody::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn insert_header(
    headers: &mut HeaderMap,
    name: header::HeaderName,
    value: &str,
) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| ApiError::RetrieveFailed(format!("invalid {name} header value")))?;
    headers.insert(name, value);
    Ok(())
}

/// 解析单段 `bytes=` Range；无法识别的写法按无 Range 处理。
fn parse_range(value: &HeaderValue, file_size: u64) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(spec) = value
        .to_str()
        .ok()
        .and_then(|value| value.trim().strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = spec.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            u64::MAX
        } else {
            let Ok(end) = end_part.parse::<u64>() else {
                return Ok(None);
            };
            end
        };
        if start > end {
            return Ok(None);
        }
        (start, end)
    };

    if start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end.min(file_size - 1))))
}
