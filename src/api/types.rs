use serde::{Deserialize, Serialize};

/// Configuration sent when creating a remote session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    pub title: Option<String>,
    /// Language hint ("auto" lets the service detect it)
    pub language: String,
    pub chunk_interval_sec: u32,
    /// Expected speaker count for diarization; `None` disables it
    pub num_speakers: Option<u32>,
    pub trim_silence: bool,
}

/// Server-side processing status of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One chunk record as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChunk {
    pub id: i64,
    pub chunk_index: u32,
    pub status: RemoteChunkStatus,
    #[serde(default)]
    pub transcript_text: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The authoritative session record, including all known chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSession {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub chunks: Vec<RemoteChunk>,
}

/// Acknowledgment of a chunk upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAck {
    /// Server-assigned chunk ID
    pub id: i64,
    pub status: RemoteChunkStatus,
}
