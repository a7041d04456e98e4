use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the transcription service
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Channel count (only mono capture is supported)
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Input device name; `None` selects the system default
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            device: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Duration of each chunk before rotating, in seconds
    #[serde(default = "default_chunk_interval")]
    pub chunk_interval_secs: u32,
    /// Language hint for transcription ("auto" to detect)
    #[serde(default = "default_language")]
    pub language: String,
    /// Expected speaker count for diarization; `None` disables it
    #[serde(default = "default_num_speakers")]
    pub num_speakers: Option<u32>,
    #[serde(default)]
    pub trim_silence: bool,
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_interval_secs: default_chunk_interval(),
            language: default_language(),
            num_speakers: default_num_speakers(),
            trim_silence: false,
            title: None,
        }
    }
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_chunk_interval() -> u32 {
    60
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_num_speakers() -> Option<u32> {
    Some(2)
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.session.chunk_interval_secs > 0,
            "chunk_interval_secs must be positive"
        );
        anyhow::ensure!(self.audio.sample_rate > 0, "sample_rate must be positive");
        Ok(())
    }
}
