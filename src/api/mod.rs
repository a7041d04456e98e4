//! Client contract for the remote transcription service.
//!
//! The engine only ever talks to the service through the narrow
//! [`TranscriptionApi`] trait; [`HttpApi`] is the production REST
//! implementation.

mod client;
mod types;

pub use client::HttpApi;
pub use types::{RemoteChunk, RemoteChunkStatus, RemoteSession, SessionRequest, UploadAck};

use anyhow::Result;

/// Narrow interface to the remote transcription/diarization service.
///
/// `upload_chunk` is not guaranteed idempotent per (session, index);
/// callers must not re-submit the same index except through an explicit
/// retry of a failed transfer.
#[async_trait::async_trait]
pub trait TranscriptionApi: Send + Sync {
    /// Create a new session; returns the server-assigned record.
    async fn create_session(&self, request: &SessionRequest) -> Result<RemoteSession>;

    /// Upload one chunk's encoded payload.
    async fn upload_chunk(
        &self,
        session_id: i64,
        index: u32,
        payload: Vec<u8>,
        mime_type: &str,
    ) -> Result<UploadAck>;

    /// Fetch the authoritative session record with all chunk statuses.
    async fn get_session(&self, session_id: i64) -> Result<RemoteSession>;

    /// Tell the service the recording is finished.
    async fn complete_session(&self, session_id: i64) -> Result<()>;

    /// Ask the service to reprocess an already-uploaded chunk.
    async fn retry_chunk(&self, chunk_id: i64) -> Result<()>;
}
