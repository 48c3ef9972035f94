use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::headers::apply_bearer;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionTerminator;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::url::is_refresh_path;
use crate::{Credential, CredentialStore};

/// Authenticated entry point for every outbound request.
///
/// HTTP-level failures come back as ordinary responses; only transport
/// failures are returned as errors.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    refresh: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        let refresh = RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&store));
        Self {
            transport,
            store,
            refresh,
            terminator,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    pub fn terminator(&self) -> &Arc<SessionTerminator> {
        &self.terminator
    }

    /// Send `request` with the current credential.
    ///
    /// On 401/403 the credential is renewed once and the request retried
    /// once; the retry's response is returned whatever its status. When
    /// renewal is impossible the session-ended latch fires.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let credential = self.store.get();
        let response = self.send_with(&request, credential.as_ref()).await?;
        if !is_auth_failure(response.status()) {
            return Ok(response);
        }

        if is_refresh_path(&request.path) {
            debug!(path = %request.path, "refresh endpoint rejected; not recursing");
            self.terminator.terminate(&self.store);
            return Ok(response);
        }

        debug!(
            path = %request.path,
            status = response.status().as_u16(),
            "authorization rejected; refreshing credential"
        );
        match self.refresh.refresh().await {
            Some(renewed) => {
                info!(path = %request.path, "retrying request with renewed credential");
                self.send_with(&request, Some(&renewed)).await
            }
            None => {
                self.terminator.terminate(&self.store);
                Ok(response)
            }
        }
    }

    /// Attach the current credential (if any) without sending.
    pub fn authorize(&self, request: ApiRequest) -> Result<ApiRequest, ApiError> {
        with_credential(request, self.store.get().as_ref())
    }

    async fn send_with(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let request = with_credential(request.clone(), credential)?;
        self.transport.send(request).await
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("refresh", &self.refresh)
            .field("terminator", &self.terminator)
            .finish_non_exhaustive()
    }
}

fn with_credential(
    mut request: ApiRequest,
    credential: Option<&Credential>,
) -> Result<ApiRequest, ApiError> {
    if let Some(credential) = credential {
        apply_bearer(&mut request.headers, credential)?;
    }
    Ok(request)
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}
