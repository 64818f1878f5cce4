//! Blurhash preview rendering with conditional GET support.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use vfs_core::defaults::{DB_DEFAULT_NAMESPACE, PREVIEW_CACHE_CONTROL};
use vfs_core::{fs_namespace, strip_extension};

use crate::{ApiError, AppState};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// `GET /preview/:ns/:file`
pub async fn namespaced(
    State(state): State<AppState>,
    Path((ns, file)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    render(&state, &ns, &file, &headers).await
}

/// `GET /preview/:file` in the public namespace.
pub async fn public(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    render(&state, DB_DEFAULT_NAMESPACE, &file, &headers).await
}

async fn render(
    state: &AppState,
    ns: &str,
    file: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let namespace = preview_namespace(state, ns);
    let hash = strip_extension(file);
    let entry = state.previews.get(namespace, hash).await?;

    if let Some(since) = if_modified_since(headers) {
        if entry.not_modified_since(since) {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let mut response = entry.data.to_vec().into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PREVIEW_CACHE_CONTROL),
    );
    if let Ok(value) = HeaderValue::from_str(&http_date(entry.modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    Ok(response)
}

/// Metadata namespace for a preview request; unknown namespaces fall back
/// to the public one.
fn preview_namespace<'a>(state: &AppState, ns: &'a str) -> &'a str {
    let fs_ns = fs_namespace(ns);
    if fs_ns.is_empty() || state.store.validate_namespace(fs_ns).is_err() {
        DB_DEFAULT_NAMESPACE
    } else {
        fs_ns
    }
}

fn if_modified_since(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(header::IF_MODIFIED_SINCE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn http_date(t: DateTime<Utc>) -> String {
    t.format(HTTP_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_round_trips_through_rfc2822() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let formatted = http_date(t);
        assert_eq!(formatted, "Tue, 05 Mar 2024 07:08:09 GMT");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&formatted).unwrap(),
        );
        assert_eq!(if_modified_since(&headers), Some(t));
    }

    #[test]
    fn test_if_modified_since_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_static("yesterday"));
        assert_eq!(if_modified_since(&headers), None);
        assert_eq!(if_modified_since(&HeaderMap::new()), None);
    }
}
