//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between search,
//! collections, session, player-runtime, and sequence handlers.

use std::sync::Arc;

use crate::collections::Track;
use crate::player::{PlaybackState, PlayerHandle};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Search(SearchMessage),
    Collection(CollectionMessage),
    Session(SessionMessage),
    Player(PlayerMessage),
    Sequence(SequenceMessage),
}

/// How a floating session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Direct user selection (search result, playlist row, history row).
    Manual,
    /// Created by the playlist sequencer for the given playlist index.
    Sequence { index: usize },
}

/// Search-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum SearchMessage {
    Submit(String),
    /// Ranked results from the proxy, provider order preserved.
    Completed(Vec<Track>),
    /// The proxy answered successfully with zero results.
    NoResults,
    /// Validation or upstream failure, as a user-facing message.
    Failed(String),
}

/// Playlist/history commands and snapshot notifications.
#[derive(Debug, Clone)]
pub enum CollectionMessage {
    AddToPlaylist(Track),
    RemoveFromPlaylist(String),
    /// A track was opened in a session; history moves it to the front.
    RecordSelection(Track),
    /// Full playlist contents after a restore or mutation.
    PlaylistChanged(Vec<Track>),
    /// Full history contents after a restore or mutation.
    HistoryChanged(Vec<Track>),
}

/// Per-session view published by the synchronizer after every sweep.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub title: String,
    pub x: f32,
    pub y: f32,
    pub progress_percent: f32,
    pub duration_seconds: f64,
    pub volume_percent: f32,
    pub is_playing: bool,
    pub sequence_index: Option<usize>,
    /// Most recent polled backing state; None until the first successful
    /// poll after binding.
    pub playback_state: Option<PlaybackState>,
}

/// Session-registry commands and notifications.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    Open {
        track: Track,
        origin: SessionOrigin,
    },
    Close(String),
    /// A session left the registry. `sequence_index` is set when the
    /// closed session belonged to the active sequence.
    Closed {
        id: String,
        sequence_index: Option<usize>,
    },
    Move {
        id: String,
        x: f32,
        y: f32,
    },
    SetVolume {
        id: String,
        percent: f32,
    },
    /// Seek expressed as a share of the session's known duration.
    SeekPercent {
        id: String,
        percent: f32,
    },
    TogglePlay(String),
    /// Sequencer stop: pause every sequence session, keep them open.
    PauseSequenceSessions,
    /// Synchronizer heartbeat, delivered by the sync timer thread.
    SyncTick,
    /// Full registry snapshot after a synchronizer sweep.
    Synced(Vec<SessionSnapshot>),
    /// Manual session creation hit the concurrency cap.
    OpenRejected(String),
}

/// Notifications from the embeddable player runtime.
#[derive(Debug, Clone)]
pub enum PlayerMessage {
    /// One-shot: the on-demand runtime load finished.
    RuntimeReady,
    /// Asynchronous bind resolved for the given session.
    Bound {
        track_id: String,
        handle: Arc<dyn PlayerHandle>,
        duration_seconds: f64,
    },
    /// The backing instance reported a state transition.
    StateChanged {
        track_id: String,
        state: PlaybackState,
    },
}

/// Sequencer commands and notifications.
#[derive(Debug, Clone)]
pub enum SequenceMessage {
    Start,
    Stop,
    /// Advancement-check heartbeat, delivered by the sequence timer thread.
    Tick,
    /// Active playlist index changed; None means the sequencer is idle.
    StateChanged { active_index: Option<usize> },
    /// Start was refused, as a user-facing message.
    StartRejected(String),
}
