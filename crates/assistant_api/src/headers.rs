use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::Credential;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";

/// Headers applied to every request before per-request headers.
pub fn default_headers(config: &ApiConfig) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(USER_AGENT, header_value(USER_AGENT.as_str(), &user_agent)?);

    for (key, value) in &config.extra_headers {
        let key = key.trim().to_ascii_lowercase();
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ApiError::InvalidRequest(format!("invalid header key: {key}")))?;
        headers.insert(name, header_value(&key, value.trim())?);
    }

    Ok(headers)
}

/// Replace any `Authorization` header with the bearer form of `credential`.
pub fn apply_bearer(headers: &mut HeaderMap, credential: &Credential) -> Result<(), ApiError> {
    let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|_| {
        ApiError::InvalidRequest("credential is not a valid header value".to_owned())
    })?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

#[must_use]
pub fn default_user_agent() -> String {
    format!(
        "assistant-runtime/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        normalize_arch(std::env::consts::ARCH)
    )
}

fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        other => other,
    }
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::InvalidRequest(format!("invalid header value for {key}")))
}
