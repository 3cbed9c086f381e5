//! services/api/src/adapters/remote.rs
//!
//! The remote `StudyStore`: every operation is one request against the CRUD
//! service. A 404 on a single load is the absent value; any other failure is
//! reported as `BackendUnavailable`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use research_interview_core::domain::Study;
use research_interview_core::ports::{PortError, PortResult, StudyStore};
use std::time::Duration;
use tracing::warn;

use crate::error::ApiError;

/// An adapter that implements `StudyStore` over HTTP.
#[derive(Clone)]
pub struct RemoteStudyStore {
    client: Client,
    base_url: Url,
}

impl RemoteStudyStore {
    /// Creates a store for the service rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::Internal(format!("Invalid API_URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Internal(format!(
                "API_URL '{}' cannot be used as a base URL",
                base_url
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn studies_url(&self, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("studies");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        request
            .send()
            .await
            .map_err(|e| PortError::BackendUnavailable(e.to_string()))
    }
}

fn status_error(response: &Response) -> PortError {
    let status = response.status();
    warn!("Study API answered {} for {}", status, response.url());
    PortError::BackendUnavailable(format!("API error: {}", status))
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> PortResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| PortError::BackendUnavailable(format!("Malformed API response: {}", e)))
}

//=========================================================================================
// `StudyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyStore for RemoteStudyStore {
    async fn load_all(&self) -> PortResult<Vec<Study>> {
        let response = self.send(self.client.get(self.studies_url(None))).await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        read_json(response).await
    }

    async fn load(&self, id: &str) -> PortResult<Option<Study>> {
        let response = self.send(self.client.get(self.studies_url(Some(id)))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        read_json(response).await.map(Some)
    }

    async fn save(&self, study: &Study) -> PortResult<()> {
        let response = self
            .send(self.client.put(self.studies_url(Some(&study.id))).json(study))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> PortResult<()> {
        let response = self.send(self.client.delete(self.studies_url(Some(id)))).await?;
        if !response.status().is_success() {
            return Err(status_error(&response));
        }
        Ok(())
    }
}
