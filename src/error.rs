//! 统一的 API 错误类型与 JSON 响应封装。

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    NoFileProvided,
    InvalidPath(String),
    MalformedUpload(String),
    PayloadTooLarge(u64),
    NotFound,
    PathLocked,
    RangeNotSatisfiable(u64),
    UploadFailed(String),
    RetrieveFailed(String),
}

/// 所有失败响应共用的 JSON 封装。
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    /// 上传路径上的存储错误映射。
    pub fn upload(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath(reason) => ApiError::InvalidPath(reason.into()),
            StorageError::TooLarge(limit) => ApiError::PayloadTooLarge(limit),
            StorageError::NotFound => ApiError::UploadFailed("file not found".into()),
            StorageError::Io(err) => ApiError::UploadFailed(err.to_string()),
        }
    }

    /// 读取路径上的存储错误映射：根目录内无法解析的路径一律视为不存在。
    pub fn retrieve(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath(_) | StorageError::NotFound => ApiError::NotFound,
            StorageError::Io(err) if err.kind() == ErrorKind::NotFound => ApiError::NotFound,
            other => ApiError::RetrieveFailed(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFileProvided | ApiError::InvalidPath(_) | ApiError::MalformedUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PathLocked => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::UploadFailed(_) | ApiError::RetrieveFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        let (message, error) = match self {
            ApiError::NoFileProvided => ("No file uploaded", None),
            ApiError::InvalidPath(reason) => ("Invalid path", Some(reason.clone())),
            ApiError::MalformedUpload(reason) => ("Invalid upload", Some(reason.clone())),
            ApiError::PayloadTooLarge(limit) => (
                "File too large",
                Some(format!("file exceeds the {limit} byte limit")),
            ),
            ApiError::NotFound => ("File not found", None),
            ApiError::PathLocked => (
                "Upload failed",
                Some("destination is locked by another upload".into()),
            ),
            ApiError::RangeNotSatisfiable(_) => ("Range not satisfiable", None),
            ApiError::UploadFailed(reason) => ("Upload failed", Some(reason.clone())),
            ApiError::RetrieveFailed(_) => ("Error retrieving file", None),
        };
        ErrorEnvelope {
            success: false,
            message,
            error,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RetrieveFailed(detail) => write!(f, "Error retrieving file: {detail}"),
            other => {
                let envelope = other.envelope();
                match envelope.error {
                    Some(detail) => write!(f, "{}: {detail}", envelope.message),
                    None => f.write_str(envelope.message),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(self.envelope())).into_response();
        if let ApiError::RangeNotSatisfiable(size) = self
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}"))
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn retrieve_never_reports_unresolvable_paths_as_server_errors() {
        let cases = [
            StorageError::InvalidPath("path escapes the upload root"),
            StorageError::NotFound,
            StorageError::Io(io::Error::from(ErrorKind::NotFound)),
        ];
        for error in cases {
            assert_eq!(ApiError::retrieve(error).status(), StatusCode::NOT_FOUND);
        }
        let denied = ApiError::retrieve(StorageError::Io(io::Error::from(
            ErrorKind::PermissionDenied,
        )));
        assert_eq!(denied.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upload_maps_size_and_path_errors_to_client_errors() {
        assert_eq!(
            ApiError::upload(StorageError::TooLarge(10)).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::upload(StorageError::InvalidPath("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::upload(StorageError::Io(io::Error::other("disk full"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_omits_error_field_when_absent() {
        let body = serde_json::to_value(ApiError::NotFound.envelope()).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({ "success": false, "message": "File not found" })
        );

        let body = serde_json::to_value(ApiError::UploadFailed("disk full".into()).envelope())
            .expect("serialize");
        assert_eq!(body["message"], "Upload failed");
        assert_eq!(body["error"], "disk full");
    }

    #[test]
    fn display_keeps_retrieve_detail_out_of_the_envelope() {
        let err = ApiError::RetrieveFailed("permission denied".into());
        assert_eq!(err.to_string(), "Error retrieving file: permission denied");
        assert_eq!(err.envelope().error, None);

        assert_eq!(ApiError::NotFound.to_string(), "File not found");
        assert_eq!(
            ApiError::PayloadTooLarge(8).to_string(),
            "File too large: file exceeds the 8 byte limit"
        );
    }

    #[test]
    fn unsatisfiable_range_carries_content_range() {
        let response = ApiError::RangeNotSatisfiable(42).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).map(|v| v.as_bytes()),
            Some(&b"bytes */42"[..])
        );
    }
}
