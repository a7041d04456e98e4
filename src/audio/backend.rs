use anyhow::Result;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Audio capture backend trait
///
/// The backend exclusively holds the input device for the lifetime of a
/// capture; `stop()` (or dropping the backend) releases it.
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing from the selected input device
    ///
    /// Returns a channel receiver that will receive audio frames. Device,
    /// permission, and format problems map to [`CaptureError`] so callers
    /// can surface them as a capture-unavailable condition.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
