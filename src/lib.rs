pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;

pub use api::{HttpApi, RemoteChunkStatus, SessionRequest, TranscriptionApi};
pub use audio::{AudioBackend, AudioFrame, CpalBackend, EncodedSegment, SegmentEncoder};
pub use config::Config;
pub use engine::{
    Chunk, ChunkStatus, EngineConfig, EngineEvent, SessionEngine, SessionHandle, SessionState,
};
pub use error::{CaptureError, EngineError};
