use url::Url;

use crate::error::ApiError;

/// Default base URL for a locally running assistant service.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8100";

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const REFRESH_PATH: &str = "/refresh";
pub const LOGOUT_PATH: &str = "/logout";
pub const ME_PATH: &str = "/me";
pub const RUNS_PATH: &str = "/runs";
pub const RUNS_STREAM_PATH: &str = "/runs/stream";
pub const RUNS_FEEDBACK_PATH: &str = "/runs/feedback";
pub const INGEST_PATH: &str = "/ingest";
pub const MEMORY_PATH: &str = "/memory";

pub fn ingest_job_path(job_id: &str) -> Result<String, ApiError> {
    segment_path(&[route(INGEST_PATH), job_id])
}

pub fn ingest_cancel_path(job_id: &str) -> Result<String, ApiError> {
    segment_path(&[route(INGEST_PATH), job_id, "cancel"])
}

pub fn memory_item_path(memory_id: &str) -> Result<String, ApiError> {
    segment_path(&[route(MEMORY_PATH), memory_id])
}

fn route(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Build an absolute path from segments, percent-encoding each one.
///
/// Empty, `.` and `..` segments are rejected: an id must never be able to
/// address a different endpoint.
pub fn segment_path(segments: &[&str]) -> Result<String, ApiError> {
    let mut url = Url::parse(DEFAULT_BASE_URL)
        .map_err(|error| ApiError::InvalidBaseUrl(format!("{DEFAULT_BASE_URL}: {error}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| ApiError::InvalidRequest("cannot build request path".to_owned()))?;
        path.clear();
        for segment in segments {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(ApiError::InvalidRequest(format!(
                    "invalid path segment {segment:?}"
                )));
            }
            path.push(segment);
        }
    }
    Ok(url.path().to_owned())
}

/// Join an endpoint path onto a base URL.
///
/// Joining rules:
/// 1) a blank base falls back to [`DEFAULT_BASE_URL`]
/// 2) any path prefix on the base is kept (`http://host/api` + `/me` -> `http://host/api/me`)
/// 3) slashes at the seam are collapsed to exactly one
pub fn endpoint_url(base_url: &str, path: &str) -> Result<Url, ApiError> {
    let base = if base_url.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base_url.trim()
    };

    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|error| ApiError::InvalidBaseUrl(format!("{joined}: {error}")))
}

/// Whether `path` targets the credential refresh endpoint.
#[must_use]
pub fn is_refresh_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_end_matches('/') == REFRESH_PATH
}
