//! Backend API Client
//!
//! HTTP client for the assessment backend: violation reports, integrity config,
//! draft saves, beacons and the final submit.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DraftTransport, ScoringAuthority, SubmissionTransport, SyncError};
use crate::constants;
use crate::logic::config::SessionConfig;
use crate::logic::drafts::types::{
    DraftSaveRequest, DraftSaveResponse, FinalAnswer, ServerDraft, SubmitResponse,
};
use crate::logic::integrity::types::{IntegrityConfig, ViolationEvent, ViolationVerdict};

/// Backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub server_url: String,
    pub session_token: String,
    pub timeout_seconds: u64,
}

impl BackendConfig {
    pub fn new(session_token: impl Into<String>) -> Self {
        Self {
            server_url: constants::get_api_url(),
            session_token: session_token.into(),
            timeout_seconds: constants::get_request_timeout_secs(),
        }
    }

    pub fn from_session_config(session_token: impl Into<String>, config: &SessionConfig) -> Self {
        Self {
            server_url: config.api_url.clone(),
            session_token: session_token.into(),
            timeout_seconds: config.request_timeout.as_secs().max(1),
        }
    }
}

/// Backend API client
pub struct HttpBackend {
    config: BackendConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    answers: &'a [FinalAnswer],
}

#[derive(Debug, Deserialize)]
struct DraftListResponse {
    drafts: Vec<ServerDraft>,
}

impl HttpBackend {
    /// Create new backend client
    pub fn new(config: BackendConfig) -> Result<Self, SyncError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(format!("session-core/{}", crate::constants::APP_VERSION))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn session_token(&self) -> &str {
        &self.config.session_token
    }

    fn session_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/sessions/{}/{}",
            self.config.server_url.trim_end_matches('/'),
            self.config.session_token,
            path
        )
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| SyncError::Parse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::from_status(status.as_u16(), &body))
        }
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::Network(e.to_string())
    }
}

#[async_trait]
impl ScoringAuthority for HttpBackend {
    async fn report_violation(&self, event: &ViolationEvent) -> Result<ViolationVerdict, SyncError> {
        let response = self
            .http_client
            .post(self.session_url("violations"))
            .json(event)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }

    async fn fetch_config(&self) -> Result<IntegrityConfig, SyncError> {
        let response = self
            .http_client
            .get(self.session_url("integrity/config"))
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }
}

#[async_trait]
impl DraftTransport for HttpBackend {
    async fn save_draft(&self, request: &DraftSaveRequest) -> Result<DraftSaveResponse, SyncError> {
        let response = self
            .http_client
            .post(self.session_url("drafts"))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }

    async fn load_drafts(&self) -> Result<Vec<ServerDraft>, SyncError> {
        let response = self
            .http_client
            .get(self.session_url("drafts"))
            .send()
            .await
            .map_err(transport_error)?;

        let list: DraftListResponse = Self::read_json(response).await?;
        Ok(list.drafts)
    }

    fn send_beacon(&self, request: &DraftSaveRequest) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime for beacon, draft {} not sent", request.field_id);
            return false;
        };

        let pending = self
            .http_client
            .post(self.session_url("drafts/beacon"))
            .json(request)
            .send();
        let field_id = request.field_id.clone();

        // Detached; nobody waits on the result
        handle.spawn(async move {
            if let Err(e) = pending.await {
                log::debug!("Beacon for {} failed: {}", field_id, e);
            }
        });
        true
    }
}

#[async_trait]
impl SubmissionTransport for HttpBackend {
    async fn submit_answers(&self, answers: &[FinalAnswer]) -> Result<SubmitResponse, SyncError> {
        let response = self
            .http_client
            .post(self.session_url("submit"))
            .json(&SubmitRequest { answers })
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_json(response).await
    }
}
