//! Playback session: owns the selected streams and applies control commands.
//! Commands can be sent from any thread over a crossbeam channel and are
//! applied by whoever owns the engine.

use std::sync::Arc;

use crossbeam::channel;

use crate::core::config::{SessionConfig, SyncMode};
use crate::core::error::{Error, Result};
use crate::core::time::{Seconds, TimeBase};
use crate::playback::buffer_gate::BufferGate;
use crate::playback::state::PlaybackState;
use crate::playback::sync::SyncController;
use crate::stream::{Stream, StreamKind};

/// Command sent to the playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Stop,
    /// Seek to a position in seconds
    Seek(Seconds),
    SetSyncMode(SyncMode),
    SetFramedrop(bool),
    SetInfiniteBuffer(bool),
}

/// One playback session
pub struct PlaybackEngine {
    config: SessionConfig,
    state: PlaybackState,
    audio: Option<Arc<Stream>>,
    video: Option<Arc<Stream>>,
    sync_controller: Arc<SyncController>,
    buffer_gate: Arc<BufferGate>,
    command_tx: channel::Sender<PlaybackCommand>,
    command_rx: channel::Receiver<PlaybackCommand>,
}

impl PlaybackEngine {
    /// Create a stopped session with no streams
    pub fn new(config: SessionConfig) -> Self {
        let sync_controller = Arc::new(SyncController::new(&config));
        let buffer_gate = Arc::new(BufferGate::new(&config));
        let (command_tx, command_rx) = channel::unbounded();

        Self {
            config,
            state: PlaybackState::Stopped,
            audio: None,
            video: None,
            sync_controller,
            buffer_gate,
            command_tx,
            command_rx,
        }
    }

    /// Select a track for playback, replacing any open stream of the same kind
    pub fn open_stream(&mut self, kind: StreamKind, index: usize, time_base: TimeBase) -> Arc<Stream> {
        self.close_stream(kind);

        let stream = Arc::new(Stream::new(kind, index, time_base, self.config.limits));
        stream.queue().set_infinite_buffer(self.config.infinite_buffer);
        if self.state.is_paused() {
            stream.set_paused(true);
        }
        self.sync_controller.attach(Arc::clone(&stream));
        *self.slot_mut(kind) = Some(Arc::clone(&stream));

        tracing::info!(%kind, index, ?time_base, "stream opened");
        stream
    }

    /// End playback of a track; blocked workers on its queue are released
    pub fn close_stream(&mut self, kind: StreamKind) -> Option<Arc<Stream>> {
        let stream = self.slot_mut(kind).take()?;
        self.sync_controller.detach(kind);
        stream.close();
        Some(stream)
    }

    fn slot_mut(&mut self, kind: StreamKind) -> &mut Option<Arc<Stream>> {
        match kind {
            StreamKind::Audio => &mut self.audio,
            StreamKind::Video => &mut self.video,
        }
    }

    pub fn stream(&self, kind: StreamKind) -> Option<&Arc<Stream>> {
        match kind {
            StreamKind::Audio => self.audio.as_ref(),
            StreamKind::Video => self.video.as_ref(),
        }
    }

    /// Require an open stream of `kind`
    pub fn expect_stream(&self, kind: StreamKind) -> Result<&Arc<Stream>> {
        self.stream(kind).ok_or(Error::StreamNotOpen(kind))
    }

    /// Open streams, audio first
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.audio.iter().chain(self.video.iter()).map(|s| s.as_ref())
    }

    pub fn sync_controller(&self) -> &Arc<SyncController> {
        &self.sync_controller
    }

    pub fn buffer_gate(&self) -> &Arc<BufferGate> {
        &self.buffer_gate
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Handle for sending commands from other threads
    pub fn command_sender(&self) -> channel::Sender<PlaybackCommand> {
        self.command_tx.clone()
    }

    /// Apply every command queued on the channel. Returns how many were applied.
    pub fn pump_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.command_rx.try_recv() {
            self.process_command(command);
            applied += 1;
        }
        applied
    }

    /// Process a playback command
    pub fn process_command(&mut self, command: PlaybackCommand) {
        tracing::debug!(?command, state = ?self.state, "processing command");
        match command {
            PlaybackCommand::Play => match self.state {
                PlaybackState::Paused { .. } => {
                    self.set_clocks_paused(false);
                    self.state = PlaybackState::Buffering;
                }
                PlaybackState::Stopped => self.state = PlaybackState::Buffering,
                PlaybackState::Buffering | PlaybackState::Playing => {}
            },
            PlaybackCommand::Pause => {
                if self.state.is_active() {
                    let position = self.position();
                    self.set_clocks_paused(true);
                    self.state = PlaybackState::Paused { position };
                }
            }
            PlaybackCommand::Stop => {
                self.close_stream(StreamKind::Audio);
                self.close_stream(StreamKind::Video);
                self.state = PlaybackState::Stopped;
            }
            PlaybackCommand::Seek(target) => self.seek(target),
            PlaybackCommand::SetSyncMode(mode) => {
                self.config.sync_mode = mode;
                self.sync_controller.set_mode(mode);
            }
            PlaybackCommand::SetFramedrop(enabled) => {
                self.config.framedrop = enabled;
                self.sync_controller.set_framedrop(enabled);
            }
            PlaybackCommand::SetInfiniteBuffer(enabled) => {
                self.config.infinite_buffer = enabled;
                self.buffer_gate.set_infinite_buffer(enabled);
                for stream in self.streams() {
                    stream.queue().set_infinite_buffer(enabled);
                }
            }
        }
    }

    /// Flush every queue and restart the external clock at `target`.
    /// Stream clocks go stale with their queues until the presenter sets them again.
    fn seek(&mut self, target: Seconds) {
        for stream in self.streams() {
            stream.queue().flush();
        }
        self.sync_controller.set_external_clock(target);

        match self.state {
            PlaybackState::Playing => self.state = PlaybackState::Buffering,
            PlaybackState::Paused { .. } => {
                self.sync_controller.set_paused(true);
                self.state = PlaybackState::Paused { position: Some(target) };
            }
            PlaybackState::Buffering | PlaybackState::Stopped => {}
        }
        tracing::info!(target, "seek requested");
    }

    fn set_clocks_paused(&self, paused: bool) {
        for stream in self.streams() {
            stream.set_paused(paused);
        }
        self.sync_controller.set_paused(paused);
    }

    /// Leave buffering once every open stream reports enough packets
    pub fn poll_ready(&mut self) -> PlaybackState {
        if self.state.is_buffering()
            && self.streams().next().is_some()
            && self.buffer_gate.all_ready(self.streams())
        {
            tracing::info!("buffering complete, playing");
            self.state = PlaybackState::Playing;
        }
        self.state
    }

    /// Whether the demuxer should pause reading
    pub fn should_throttle(&self) -> bool {
        self.buffer_gate.should_throttle(self.streams())
    }

    /// Current master clock value
    pub fn position(&self) -> Option<Seconds> {
        self.sync_controller.master_clock_value()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        // Release any worker still blocked on a queue
        for stream in self.streams() {
            stream.close();
        }
    }
}
