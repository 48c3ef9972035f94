use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::transport::ApiRequest;
use crate::url::{memory_item_path, MEMORY_PATH};

pub const DEFAULT_MEMORY_LIMIT: u32 = 200;
pub const MEMORY_LIMIT_RANGE: RangeInclusive<u32> = 1..=500;

const LIST_FALLBACK: &str = "Failed to load memory";
const DELETE_FALLBACK: &str = "Failed to delete memory";
const CLEAR_FALLBACK: &str = "Failed to clear memory";

/// One remembered fact stored by the server for the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Deleted<T> {
    deleted: T,
}

#[derive(Debug, Clone)]
pub struct MemoryClient {
    gateway: Arc<Gateway>,
}

impl MemoryClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, limit: u32, offset: u32) -> Result<Vec<MemoryItem>, ApiError> {
        if !MEMORY_LIMIT_RANGE.contains(&limit) {
            return Err(ApiError::InvalidRequest(format!(
                "memory limit must be between {} and {}, got {limit}",
                MEMORY_LIMIT_RANGE.start(),
                MEMORY_LIMIT_RANGE.end()
            )));
        }

        let request = ApiRequest::get(MEMORY_PATH)
            .query("limit", limit)
            .query("offset", offset);
        let response = self.gateway.request(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, LIST_FALLBACK).await);
        }
        response.json().await
    }

    /// Returns whether the item existed.
    pub async fn delete(&self, memory_id: &str) -> Result<bool, ApiError> {
        let response = self
            .gateway
            .request(ApiRequest::delete(memory_item_path(memory_id)?))
            .await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, DELETE_FALLBACK).await);
        }
        Ok(response.json::<Deleted<bool>>().await?.deleted)
    }

    /// Returns the number of items removed.
    pub async fn clear(&self) -> Result<u64, ApiError> {
        let response = self
            .gateway
            .request(ApiRequest::delete(MEMORY_PATH))
            .await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, CLEAR_FALLBACK).await);
        }
        Ok(response.json::<Deleted<u64>>().await?.deleted)
    }
}
