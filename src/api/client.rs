use anyhow::{Context, Result};
use reqwest::multipart;
use std::time::Duration;

use super::types::{RemoteSession, SessionRequest, UploadAck};
use super::TranscriptionApi;

/// Per-request timeout. A hung call must not occupy a concurrency slot
/// forever; expiry surfaces as an upload or poll failure.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for the transcription service.
pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("transcription service returned {}: {}", status, body)
    }
}

#[async_trait::async_trait]
impl TranscriptionApi for HttpApi {
    async fn create_session(&self, request: &SessionRequest) -> Result<RemoteSession> {
        let response = self
            .client
            .post(format!("{}/api/conversations", self.base_url))
            .json(request)
            .send()
            .await
            .context("Session creation request failed")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Invalid session creation response")
    }

    async fn upload_chunk(
        &self,
        session_id: i64,
        index: u32,
        payload: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadAck> {
        let part = multipart::Part::bytes(payload)
            .file_name(format!("chunk-{:03}.wav", index))
            .mime_str(mime_type)
            .context("Invalid chunk MIME type")?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("chunk_index", index.to_string());

        let response = self
            .client
            .post(format!(
                "{}/api/conversations/{}/chunks",
                self.base_url, session_id
            ))
            .multipart(form)
            .send()
            .await
            .context("Chunk upload request failed")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Invalid chunk upload response")
    }

    async fn get_session(&self, session_id: i64) -> Result<RemoteSession> {
        let response = self
            .client
            .get(format!("{}/api/conversations/{}", self.base_url, session_id))
            .send()
            .await
            .context("Session status request failed")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Invalid session status response")
    }

    async fn complete_session(&self, session_id: i64) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/api/conversations/{}/complete",
                self.base_url, session_id
            ))
            .send()
            .await
            .context("Session completion request failed")?;

        Self::check(response).await?;
        Ok(())
    }

    async fn retry_chunk(&self, chunk_id: i64) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/api/transcriptions/{}/retry",
                self.base_url, chunk_id
            ))
            .send()
            .await
            .context("Chunk retry request failed")?;

        Self::check(response).await?;
        Ok(())
    }
}
