//! Recording session engine
//!
//! This module provides the core pipeline:
//! - Session state machine and control surface (`SessionEngine` /
//!   `SessionHandle`)
//! - Audio-time driven chunk rotation over the segment encoder
//! - Bounded-concurrency upload queue
//! - Polling status reconciliation against the transcription service

mod chunk;
mod session;
mod uploads;

pub use chunk::{Chunk, ChunkStatus, SessionState};
pub use session::{
    EngineConfig, EngineEvent, SessionEngine, SessionHandle, POLL_INTERVAL, STOP_GRACE,
};
pub use uploads::{UploadQueue, UploadTask, MAX_CONCURRENT_UPLOADS};
