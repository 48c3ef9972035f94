use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::transport::ApiRequest;
use crate::url::{LOGIN_PATH, LOGOUT_PATH, ME_PATH, SIGNUP_PATH};
use crate::Credential;

const LOGIN_FALLBACK: &str = "Login failed";
const SIGNUP_FALLBACK: &str = "Signup failed";
const ME_FALLBACK: &str = "Failed to load user";

/// Body returned by `/login`, `/signup` and `/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

impl TokenResponse {
    pub fn credential(&self) -> Result<Credential, ApiError> {
        let token = self.access_token.trim();
        if token.is_empty() {
            return Err(ApiError::InvalidRequest(
                "token response carried an empty access_token".to_owned(),
            ));
        }
        Ok(Credential::new(token))
    }
}

/// The account behind the current credential, as returned by `/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// The login name when the server reports one, else the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.sub.as_deref().unwrap_or(&self.user_id)
    }
}

/// Credential-issuing endpoints.
///
/// Login and signup bypass the gateway: a rejected password is an ordinary
/// failure, not a reason to refresh.
#[derive(Debug, Clone)]
pub struct AuthClient {
    gateway: Arc<Gateway>,
}

impl AuthClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn login(
        &self,
        username: &str,
        password: Option<&str>,
    ) -> Result<TokenResponse, ApiError> {
        let username = require_username(username)?;
        let mut body = json!({ "username": username });
        if let Some(password) = password {
            body["password"] = json!(password);
        }

        let token = self.issue(LOGIN_PATH, body, LOGIN_FALLBACK).await?;
        info!(username, "logged in");
        Ok(token)
    }

    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<TokenResponse, ApiError> {
        let username = require_username(username)?;
        let body = json!({
            "username": username,
            "password": password,
            "password_confirm": password_confirm,
        });

        let token = self.issue(SIGNUP_PATH, body, SIGNUP_FALLBACK).await?;
        info!(username, "signed up");
        Ok(token)
    }

    /// Best effort on the server; the local credential is always cleared.
    pub async fn logout(&self) {
        match self
            .gateway
            .transport()
            .send(ApiRequest::post(LOGOUT_PATH))
            .await
        {
            Ok(response) if response.is_success() => info!("logged out"),
            Ok(response) => warn!(status = response.status().as_u16(), "logout rejected"),
            Err(error) => warn!(%error, "logout request failed"),
        }
        // Reset first: an attempt settling in between must not restore
        // the credential being cleared.
        self.gateway.refresh_coordinator().reset();
        self.gateway.store().clear();
    }

    /// The signed-in user, or `None` when the credential is not accepted.
    pub async fn me(&self) -> Result<Option<User>, ApiError> {
        let response = self.gateway.request(ApiRequest::get(ME_PATH)).await?;
        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(ApiError::from_response(response, ME_FALLBACK).await),
        }
    }

    async fn issue(
        &self,
        path: &str,
        body: Value,
        fallback: &str,
    ) -> Result<TokenResponse, ApiError> {
        let response = self
            .gateway
            .transport()
            .send(ApiRequest::post(path).json(body))
            .await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, fallback).await);
        }

        let token: TokenResponse = response.json().await?;
        self.gateway.store().set(token.credential()?);
        self.gateway.terminator().reset();
        Ok(token)
    }
}

fn require_username(username: &str) -> Result<&str, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::InvalidRequest("username is required".to_owned()));
    }
    Ok(username)
}
