//! ETag 计算与条件 GET 校验。

use axum::http::{HeaderMap, header};
use httpdate::parse_http_date;
use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

/// 根据文件元数据生成弱 ETag。
pub fn etag_from_metadata(metadata: &Metadata) -> String {
    let size = metadata.len();
    if let Some(duration) = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
    {
        return format!(
            "W/\"{}-{}-{}\"",
            size,
            duration.as_secs(),
            duration.subsec_nanos()
        );
    }
    format!("W/\"{size}\"")
}

/// 判断客户端缓存是否仍然有效；`If-None-Match` 优先于 `If-Modified-Since`。
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return value.trim() == "*" || etag_matches(value, etag);
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_http_date(v).ok());
    match (since, modified) {
        // HTTP dates have second precision.
        (Some(since), Some(modified)) => truncate_to_secs(modified) <= since,
        _ => false,
    }
}

/// `If-Range` 需要强比较：弱 ETag 永远不满足，日期必须与修改时间一致。
/// 没有该头时 Range 照常生效。
pub fn if_range_matches(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    let Some(raw) = headers.get(header::IF_RANGE) else {
        return true;
    };
    let Ok(value) = raw.to_str().map(str::trim) else {
        return false;
    };
    if let Ok(date) = parse_http_date(value) {
        return modified.is_some_and(|modified| truncate_to_secs(modified) == date);
    }
    if value.starts_with("W/") || etag.starts_with("W/") {
        return false;
    }
    value == etag
}

fn truncate_to_secs(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => UNIX_EPOCH + std::time::Duration::from_secs(duration.as_secs()),
        Err(_) => time,
    }
}

fn etag_matches(header_value: &str, current: &str) -> bool {
    let weak = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let current = weak(current);
    header_value.split(',').any(|item| weak(item) == current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use httpdate::fmt_http_date;
    use std::time::Duration;

    #[test]
    fn if_none_match_compares_weakly() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("\"other\", \"5-10-0\""),
        );
        assert!(is_not_modified(&headers, "W/\"5-10-0\"", None));
        assert!(!is_not_modified(&headers, "W/\"6-10-0\"", None));
    }

    #[test]
    fn if_modified_since_uses_second_precision() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let mut headers = HeaderMap::new();
        let value = fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&value).expect("header"),
        );
        assert!(is_not_modified(&headers, "W/\"x\"", Some(modified)));

        let later = UNIX_EPOCH + Duration::from_secs(1_700_000_001);
        assert!(!is_not_modified(&headers, "W/\"x\"", Some(later)));
    }

    fn if_range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_RANGE, HeaderValue::from_str(value).expect("header"));
        headers
    }

    #[test]
    fn if_range_never_accepts_weak_tags() {
        let etag = "W/\"5-10-0\"";
        assert!(!if_range_matches(&if_range(etag), etag, None));
        assert!(!if_range_matches(&if_range("\"5-10-0\""), etag, None));
        assert!(if_range_matches(&if_range("\"abc\""), "\"abc\"", None));
        assert!(if_range_matches(&HeaderMap::new(), etag, None));
    }

    #[test]
    fn if_range_date_must_equal_last_modified() {
        let modified = UNIX_EPOCH + Duration::from_millis(1_700_000_000_500);
        let same = fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert!(if_range_matches(&if_range(&same), "W/\"x\"", Some(modified)));

        let earlier = fmt_http_date(UNIX_EPOCH + Duration::from_secs(1_699_999_999));
        assert!(!if_range_matches(&if_range(&earlier), "W/\"x\"", Some(modified)));
        assert!(!if_range_matches(&if_range(&same), "W/\"x\"", None));
    }

    #[test]
    fn no_conditional_headers_means_modified() {
        assert!(!is_not_modified(&HeaderMap::new(), "W/\"x\"", None));
    }
}
