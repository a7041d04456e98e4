use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::RemoteChunkStatus;

/// Top-level session state machine:
/// `Idle -> Recording <-> Paused -> Stopping -> Idle`.
/// `Ended` means the engine itself has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopping,
    Ended,
}

/// Processing state of one chunk, from rotation through transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Waiting for an upload slot
    Queued,
    /// Transfer in progress
    Uploading,
    /// Known to the server, waiting for transcription
    Pending,
    /// Being transcribed server-side
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }

    /// Non-terminal server-side states that keep reconciliation armed.
    pub fn is_reconciling(self) -> bool {
        matches!(self, ChunkStatus::Pending | ChunkStatus::Processing)
    }
}

impl From<RemoteChunkStatus> for ChunkStatus {
    fn from(status: RemoteChunkStatus) -> Self {
        match status {
            RemoteChunkStatus::Pending => ChunkStatus::Pending,
            RemoteChunkStatus::Processing => ChunkStatus::Processing,
            RemoteChunkStatus::Completed => ChunkStatus::Completed,
            RemoteChunkStatus::Failed => ChunkStatus::Failed,
        }
    }
}

/// One rotation's worth of audio and its processing state.
///
/// Immutable once uploaded, except for `status`, `transcript_text` and
/// `error_message`, which only the reconciliation path mutates.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based, strictly increasing, never reused within a session
    pub index: u32,
    /// Client-assigned ID, stable before the server acknowledges
    pub local_id: Uuid,
    /// Server-assigned ID, present once the upload succeeds
    pub remote_id: Option<i64>,
    pub status: ChunkStatus,
    pub payload_size_bytes: usize,
    pub duration_ms: u64,
    /// Present only once the chunk is Completed
    pub transcript_text: Option<String>,
    pub error_message: Option<String>,
    /// Encoded payload, retained until the transfer succeeds so a failed
    /// upload can be retried without re-encoding
    pub(crate) payload: Option<Vec<u8>>,
}

impl Chunk {
    pub(crate) fn new(index: u32, payload: Vec<u8>, duration_ms: u64) -> Self {
        Self {
            index,
            local_id: Uuid::new_v4(),
            remote_id: None,
            status: ChunkStatus::Queued,
            payload_size_bytes: payload.len(),
            duration_ms,
            transcript_text: None,
            error_message: None,
            payload: Some(payload),
        }
    }

    /// Copy for the event stream, without the payload bytes.
    pub fn snapshot(&self) -> Chunk {
        Chunk {
            payload: None,
            ..self.clone()
        }
    }
}
