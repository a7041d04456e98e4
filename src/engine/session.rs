use std::collections::HashSet;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{SessionRequest, TranscriptionApi};
use crate::audio::{AudioBackend, AudioFrame, EncodedSegment, SegmentEncoder};
use crate::engine::chunk::{Chunk, ChunkStatus, SessionState};
use crate::engine::uploads::{UploadQueue, UploadTask, MAX_CONCURRENT_UPLOADS};
use crate::error::EngineError;

/// How often the reconciler asks the server for chunk statuses.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Grace period between `stop()` and notifying the server the session is
/// complete, so the final chunk's upload gets submitted first.
pub const STOP_GRACE: Duration = Duration::from_secs(2);

const WAV_MIME: &str = "audio/wav";

/// Engine configuration, combining session settings and audio format.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chunk_interval_secs: u32,
    pub language: String,
    pub num_speakers: Option<u32>,
    pub trim_silence: bool,
    pub title: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
    pub max_concurrent_uploads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_interval_secs: 60,
            language: "auto".to_string(),
            num_speakers: Some(2),
            trim_silence: false,
            title: None,
            sample_rate: 16000,
            channels: 1,
            poll_interval: POLL_INTERVAL,
            stop_grace: STOP_GRACE,
            max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
        }
    }
}

impl EngineConfig {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            chunk_interval_secs: cfg.session.chunk_interval_secs,
            language: cfg.session.language.clone(),
            num_speakers: cfg.session.num_speakers,
            trim_silence: cfg.session.trim_silence,
            title: cfg.session.title.clone(),
            sample_rate: cfg.audio.sample_rate,
            channels: cfg.audio.channels,
            ..Self::default()
        }
    }
}

/// Control operations accepted by the engine.
#[derive(Debug)]
enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Retry(u32),
}

/// Notifications to the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SessionStateChanged(SessionState),
    /// A chunk was created or its status/transcript changed
    ChunkUpdated(Chunk),
    Error { kind: &'static str, message: String },
}

/// Result of one spawned upload attempt, tagged with the session it was
/// spawned for so a slow upload cannot leak into a successor session.
#[derive(Debug)]
struct UploadOutcome {
    session_id: i64,
    chunk_index: u32,
    result: Result<i64, String>,
}

/// Cloneable control surface over a running [`SessionEngine`].
///
/// Calls invalid in the current state are rejected no-ops. Dropping all
/// handles asks the engine to wind down once its outstanding work is
/// done.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn start(&self) {
        let _ = self.commands.send(Command::Start).await;
    }

    pub async fn pause(&self) {
        let _ = self.commands.send(Command::Pause).await;
    }

    pub async fn resume(&self) {
        let _ = self.commands.send(Command::Resume).await;
    }

    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    /// Retry a failed chunk. Valid only while its status is `Failed`.
    pub async fn retry(&self, chunk_index: u32) {
        let _ = self.commands.send(Command::Retry(chunk_index)).await;
    }
}

/// What the main loop woke up for.
enum Tick {
    Command(Option<Command>),
    Frame(Option<AudioFrame>),
    Outcome(UploadOutcome),
    Poll,
    StopGraceExpired,
}

/// The recording session engine: segment rotation, the bounded-concurrency
/// upload queue, and the status-reconciliation loop.
///
/// All mutable state lives in this one task; the rest of the system talks
/// to it through channels. Rotation is driven by audio time (sample
/// count), so paused wall-clock time never advances chunk time, and chunk
/// boundaries are exact.
pub struct SessionEngine<A: TranscriptionApi + 'static> {
    config: EngineConfig,
    api: Arc<A>,
    backend: Box<dyn AudioBackend>,

    state: SessionState,
    session_id: Option<i64>,
    chunks: Vec<Chunk>,
    next_index: u32,
    encoder: Option<SegmentEncoder>,

    uploads: UploadQueue,
    /// Chunks currently holding a concurrency slot, from upload start
    /// until they reach a terminal status
    slot_holders: HashSet<u32>,

    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<EngineEvent>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    outcome_tx: mpsc::Sender<UploadOutcome>,
    outcome_rx: mpsc::Receiver<UploadOutcome>,

    stop_deadline: Option<Instant>,
}

impl<A: TranscriptionApi + 'static> SessionEngine<A> {
    pub fn new(
        config: EngineConfig,
        api: Arc<A>,
        backend: Box<dyn AudioBackend>,
    ) -> (Self, SessionHandle, mpsc::Receiver<EngineEvent>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outcome_tx, outcome_rx) = mpsc::channel(MAX_CONCURRENT_UPLOADS.max(config.max_concurrent_uploads));

        let engine = Self {
            uploads: UploadQueue::new(config.max_concurrent_uploads),
            config,
            api,
            backend,
            state: SessionState::Idle,
            session_id: None,
            chunks: Vec::new(),
            next_index: 0,
            encoder: None,
            slot_holders: HashSet::new(),
            commands: command_rx,
            events: event_tx,
            frames: None,
            outcome_tx,
            outcome_rx,
            stop_deadline: None,
        };

        (engine, SessionHandle { commands: command_tx }, event_rx)
    }

    /// Drive the engine until every control handle is dropped and no
    /// outstanding work remains.
    pub async fn run(mut self) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut commands_closed = false;

        loop {
            if commands_closed && self.is_quiet() {
                break;
            }

            let needs_poll = self.needs_poll();
            let stop_deadline = self.stop_deadline;
            let commands_open = !commands_closed;

            let tick = tokio::select! {
                command = self.commands.recv(), if commands_open => Tick::Command(command),
                frame = Self::next_frame(&mut self.frames) => Tick::Frame(frame),
                Some(outcome) = self.outcome_rx.recv() => Tick::Outcome(outcome),
                _ = poll.tick(), if needs_poll => Tick::Poll,
                _ = Self::sleep_opt(stop_deadline) => Tick::StopGraceExpired,
            };

            match tick {
                Tick::Command(Some(command)) => self.handle_command(command).await,
                Tick::Command(None) => {
                    commands_closed = true;
                    if matches!(self.state, SessionState::Recording | SessionState::Paused) {
                        self.handle_stop().await;
                    }
                }
                Tick::Frame(Some(frame)) => self.handle_frame(frame).await,
                Tick::Frame(None) => self.frames = None,
                Tick::Outcome(outcome) => self.handle_upload_outcome(outcome).await,
                Tick::Poll => self.reconcile().await,
                Tick::StopGraceExpired => self.finish_stop().await,
            }
        }

        if self.backend.is_capturing() {
            if let Err(e) = self.backend.stop().await {
                warn!("Failed to stop audio backend on shutdown: {:#}", e);
            }
        }
        self.state = SessionState::Ended;
        info!("Session engine shut down");
    }

    async fn next_frame(frames: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
        match frames {
            Some(rx) => rx.recv().await,
            None => future::pending().await,
        }
    }

    async fn sleep_opt(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    }

    /// Nothing in flight, nothing to reconcile, no pending transition.
    fn is_quiet(&self) -> bool {
        self.uploads.in_flight() == 0
            && self.uploads.waiting() == 0
            && !self.needs_poll()
            && self.stop_deadline.is_none()
    }

    /// Level-triggered polling rule: poll iff at least one chunk is in a
    /// non-terminal server-side state.
    fn needs_poll(&self) -> bool {
        self.session_id.is_some() && self.chunks.iter().any(|c| c.status.is_reconciling())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.handle_start().await,
            Command::Pause => {
                if self.state == SessionState::Recording {
                    self.set_state(SessionState::Paused).await;
                } else {
                    warn!(state = ?self.state, "Pause rejected");
                }
            }
            Command::Resume => {
                if self.state == SessionState::Paused {
                    self.set_state(SessionState::Recording).await;
                } else {
                    warn!(state = ?self.state, "Resume rejected");
                }
            }
            Command::Stop => self.handle_stop().await,
            Command::Retry(index) => self.handle_retry(index).await,
        }
    }

    async fn handle_start(&mut self) {
        if self.state != SessionState::Idle {
            warn!(state = ?self.state, "Start rejected: session already active");
            return;
        }

        let request = SessionRequest {
            title: self.config.title.clone(),
            language: self.config.language.clone(),
            chunk_interval_sec: self.config.chunk_interval_secs,
            num_speakers: self.config.num_speakers,
            trim_silence: self.config.trim_silence,
        };

        let remote = match self.api.create_session(&request).await {
            Ok(remote) => remote,
            Err(e) => {
                error!("Failed to create session: {:#}", e);
                self.emit_error(EngineError::SessionCreateFailed(format!("{:#}", e)))
                    .await;
                return;
            }
        };

        let frames = match self.backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Audio capture unavailable: {}", e);
                self.emit_error(EngineError::CaptureUnavailable(e)).await;
                return;
            }
        };

        self.session_id = Some(remote.id);
        self.chunks.clear();
        self.next_index = 0;
        self.slot_holders.clear();
        self.uploads = UploadQueue::new(self.config.max_concurrent_uploads);
        self.encoder = Some(SegmentEncoder::new(
            self.config.sample_rate,
            self.config.channels,
            self.config.chunk_interval_secs,
        ));
        self.frames = Some(frames);

        info!(
            session_id = remote.id,
            interval_secs = self.config.chunk_interval_secs,
            backend = self.backend.name(),
            "Recording session started"
        );
        self.set_state(SessionState::Recording).await;
    }

    async fn handle_frame(&mut self, frame: AudioFrame) {
        match self.state {
            SessionState::Recording => {}
            // Paused capture contributes no audio: chunk time stands still
            SessionState::Paused => return,
            _ => return,
        }

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.push(&frame.samples);
        }
        while self
            .encoder
            .as_ref()
            .is_some_and(|encoder| encoder.boundary_reached())
        {
            self.rotate().await;
        }
    }

    async fn rotate(&mut self) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        match encoder.rotate() {
            Ok(Some(segment)) => self.admit_chunk(segment).await,
            Ok(None) => debug!("Rotation yielded no payload, dropped"),
            Err(e) => error!("Segment encoding failed: {:#}", e),
        }
    }

    /// Assign the next index, record the chunk and queue its upload.
    async fn admit_chunk(&mut self, segment: EncodedSegment) {
        let index = self.next_index;
        self.next_index += 1;

        let chunk = Chunk::new(index, segment.bytes, segment.duration_ms);
        info!(
            index,
            size_bytes = chunk.payload_size_bytes,
            duration_ms = chunk.duration_ms,
            "Chunk ready for upload"
        );
        self.chunks.push(chunk);
        self.emit_chunk(index).await;

        self.uploads.submit(UploadTask { chunk_index: index });
        self.pump_uploads().await;
    }

    /// Start waiting uploads while concurrency slots are free.
    async fn pump_uploads(&mut self) {
        while let Some(task) = self.uploads.next_ready() {
            let index = task.chunk_index;

            let Some(session_id) = self.session_id else {
                self.uploads.complete_one();
                continue;
            };
            let payload = match self.chunks.iter_mut().find(|c| c.index == index) {
                Some(chunk) if chunk.status == ChunkStatus::Queued => {
                    match chunk.payload.clone() {
                        Some(payload) => {
                            chunk.status = ChunkStatus::Uploading;
                            payload
                        }
                        None => {
                            warn!(index, "Queued chunk has no payload, skipping");
                            self.uploads.complete_one();
                            continue;
                        }
                    }
                }
                _ => {
                    // Chunk no longer wants this upload (e.g. healed by a
                    // poll in the meantime)
                    self.uploads.complete_one();
                    continue;
                }
            };

            self.slot_holders.insert(index);
            self.emit_chunk(index).await;

            let api = Arc::clone(&self.api);
            let outcome_tx = self.outcome_tx.clone();
            tokio::spawn(async move {
                debug!(index, "Uploading chunk");
                let result = api
                    .upload_chunk(session_id, index, payload, WAV_MIME)
                    .await
                    .map(|ack| ack.id)
                    .map_err(|e| format!("{:#}", e));
                let _ = outcome_tx
                    .send(UploadOutcome { session_id, chunk_index: index, result })
                    .await;
            });
        }
    }

    async fn handle_upload_outcome(&mut self, outcome: UploadOutcome) {
        // An upload still in flight when its session was replaced must not
        // touch the successor's chunks; its slot died with the old queue.
        if self.session_id != Some(outcome.session_id) {
            debug!(
                index = outcome.chunk_index,
                session_id = outcome.session_id,
                "Ignoring upload outcome from a superseded session"
            );
            return;
        }
        let index = outcome.chunk_index;
        match outcome.result {
            Ok(remote_id) => {
                if let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) {
                    if chunk.remote_id.is_none() {
                        chunk.remote_id = Some(remote_id);
                    }
                    // Payload is on the server now; retries go through the
                    // reprocess endpoint instead of a re-upload
                    chunk.payload = None;
                    if chunk.status == ChunkStatus::Uploading {
                        chunk.status = ChunkStatus::Pending;
                    }
                }
                info!(index, remote_id, "Chunk upload acknowledged");
                self.emit_chunk(index).await;
                // The slot stays held until the server reports a terminal
                // status for this chunk.
            }
            Err(reason) => {
                error!(index, %reason, "Chunk upload failed");
                let mut marked = false;
                if let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) {
                    if chunk.status == ChunkStatus::Uploading {
                        chunk.status = ChunkStatus::Failed;
                        chunk.error_message = Some(reason.clone());
                        marked = true;
                    }
                }
                self.release_slot(index);
                if marked {
                    self.emit_chunk(index).await;
                    self.emit_error(EngineError::UploadFailed { index, reason }).await;
                }
                self.pump_uploads().await;
            }
        }
    }

    /// Merge the server's authoritative chunk list into local state.
    async fn reconcile(&mut self) {
        let Some(session_id) = self.session_id else {
            return;
        };

        let remote = match self.api.get_session(session_id).await {
            Ok(remote) => remote,
            Err(e) => {
                // Transient; the next tick retries and no chunk is marked
                // failed
                warn!("{}", EngineError::PollFailed(format!("{:#}", e)));
                return;
            }
        };

        let mut changed = Vec::new();
        for record in &remote.chunks {
            let Some(chunk) = self.chunks.iter_mut().find(|c| {
                c.remote_id == Some(record.id)
                    || (c.remote_id.is_none() && c.index == record.chunk_index)
            }) else {
                continue;
            };

            let newly_linked = chunk.remote_id.is_none();
            if newly_linked {
                chunk.remote_id = Some(record.id);
                chunk.payload = None;
            }

            // Only chunks awaiting the server are merged; a newly linked
            // record also adopts the server's view (a transfer whose
            // acknowledgment was lost).
            if !chunk.status.is_reconciling() && !newly_linked {
                continue;
            }

            let status = ChunkStatus::from(record.status);
            let mut dirty = newly_linked;
            if chunk.status != status {
                chunk.status = status;
                dirty = true;
            }
            if status == ChunkStatus::Completed && chunk.transcript_text != record.transcript_text
            {
                chunk.transcript_text = record.transcript_text.clone();
                dirty = true;
            }
            if status == ChunkStatus::Failed && chunk.error_message != record.error_message {
                chunk.error_message = record.error_message.clone();
                dirty = true;
            }

            if dirty {
                changed.push(chunk.index);
            }
        }

        for index in changed {
            let terminal = self
                .chunks
                .iter()
                .find(|c| c.index == index)
                .is_some_and(|c| c.status.is_terminal());
            if terminal {
                self.release_slot(index);
            }
            self.emit_chunk(index).await;
        }

        self.pump_uploads().await;
    }

    async fn handle_stop(&mut self) {
        if !matches!(self.state, SessionState::Recording | SessionState::Paused) {
            warn!(state = ?self.state, "Stop rejected");
            return;
        }

        if let Err(e) = self.backend.stop().await {
            warn!("Failed to stop audio backend: {:#}", e);
        }

        // Drain frames already captured before the stop landed
        let recording = self.state == SessionState::Recording;
        if let Some(mut frames) = self.frames.take() {
            frames.close();
            while let Ok(frame) = frames.try_recv() {
                if recording {
                    if let Some(encoder) = self.encoder.as_mut() {
                        encoder.push(&frame.samples);
                    }
                }
            }
        }
        while self
            .encoder
            .as_ref()
            .is_some_and(|encoder| encoder.boundary_reached())
        {
            self.rotate().await;
        }

        // Final partial chunk, if any
        if let Some(encoder) = self.encoder.take() {
            match encoder.finish() {
                Ok(Some(segment)) => self.admit_chunk(segment).await,
                Ok(None) => debug!("Final segment below minimum payload size, dropped"),
                Err(e) => error!("Failed to finalize last segment: {:#}", e),
            }
        }

        self.set_state(SessionState::Stopping).await;
        self.stop_deadline = Some(Instant::now() + self.config.stop_grace);
    }

    async fn finish_stop(&mut self) {
        self.stop_deadline = None;

        if let Some(session_id) = self.session_id {
            if let Err(e) = self.api.complete_session(session_id).await {
                // Local state is optimistic relative to server completion
                warn!("Session completion failed: {:#}", e);
                self.emit_error(EngineError::SessionCompletionFailed(format!("{:#}", e)))
                    .await;
            }
        }

        info!("Session stopped; outstanding uploads and reconciliation continue");
        self.set_state(SessionState::Idle).await;
    }

    async fn handle_retry(&mut self, index: u32) {
        let Some((status, remote_id, has_payload)) = self
            .chunks
            .iter()
            .find(|c| c.index == index)
            .map(|c| (c.status, c.remote_id, c.payload.is_some()))
        else {
            warn!(index, "Retry rejected: unknown chunk");
            return;
        };

        if status != ChunkStatus::Failed {
            warn!(index, ?status, "Retry rejected: chunk is not failed");
            return;
        }

        match remote_id {
            Some(remote_id) => {
                // Already uploaded: ask the server to reprocess, no
                // re-upload
                if let Err(e) = self.api.retry_chunk(remote_id).await {
                    error!(index, "Chunk retry failed: {:#}", e);
                    self.emit_error(EngineError::UploadFailed {
                        index,
                        reason: format!("{:#}", e),
                    })
                    .await;
                    return;
                }
                if let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) {
                    chunk.status = ChunkStatus::Pending;
                    chunk.error_message = None;
                    chunk.transcript_text = None;
                }
                info!(index, remote_id, "Chunk queued for reprocessing");
                // needs_poll() re-arms reconciliation on the next pass
                self.emit_chunk(index).await;
            }
            None if has_payload => {
                // The transfer itself failed; re-enter at the back of the
                // upload queue
                if let Some(chunk) = self.chunks.iter_mut().find(|c| c.index == index) {
                    chunk.status = ChunkStatus::Queued;
                    chunk.error_message = None;
                }
                info!(index, "Chunk re-queued for upload");
                self.emit_chunk(index).await;
                self.uploads.submit(UploadTask { chunk_index: index });
                self.pump_uploads().await;
            }
            None => {
                warn!(index, "Retry rejected: no payload retained for chunk");
            }
        }
    }

    fn release_slot(&mut self, index: u32) {
        if self.slot_holders.remove(&index) {
            self.uploads.complete_one();
        }
    }

    async fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        info!(from = ?self.state, to = ?state, "Session state changed");
        self.state = state;
        let _ = self
            .events
            .send(EngineEvent::SessionStateChanged(state))
            .await;
    }

    async fn emit_chunk(&mut self, index: u32) {
        if let Some(chunk) = self.chunks.iter().find(|c| c.index == index) {
            let _ = self
                .events
                .send(EngineEvent::ChunkUpdated(chunk.snapshot()))
                .await;
        }
    }

    async fn emit_error(&mut self, error: EngineError) {
        let event = EngineEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        };
        let _ = self.events.send(event).await;
    }
}
