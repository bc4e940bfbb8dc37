use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::{
    collections::Track,
    player::PlaybackState,
    protocol::{
        CollectionMessage, Message, SequenceMessage, SessionMessage, SessionOrigin,
        SessionSnapshot,
    },
};

const EMPTY_PLAYLIST_MESSAGE: &str = "The playlist is empty";

/// Ordered-playlist autoplay state machine.
///
/// Idle when `active_index` is None, Active(i) otherwise. The playlist and
/// the session registry are mirrored from bus snapshots; advancement is
/// evaluated on the sequence tick and immediately when the current
/// sequence session is closed.
pub struct SequenceManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    playlist: Vec<Track>,
    sessions: Vec<SessionSnapshot>,
    active_index: Option<usize>,
    /// Set between requesting a session open and first observing that
    /// session in a registry snapshot; suppresses absence-driven
    /// advancement while the asynchronous open is in flight.
    awaiting_session: bool,
}

impl SequenceManager {
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            playlist: Vec::new(),
            sessions: Vec::new(),
            active_index: None,
            awaiting_session: false,
        }
    }

    fn broadcast_state(&self) {
        let _ = self
            .bus_producer
            .send(Message::Sequence(SequenceMessage::StateChanged {
                active_index: self.active_index,
            }));
    }

    fn go_idle(&mut self) {
        info!("SequenceManager: Sequence finished, going idle");
        self.active_index = None;
        self.awaiting_session = false;
        self.broadcast_state();
    }

    fn activate(&mut self, index: usize) {
        let Some(track) = self.playlist.get(index).cloned() else {
            self.go_idle();
            return;
        };
        info!(
            "SequenceManager: Activating playlist index {} ({})",
            index, track.id
        );
        self.active_index = Some(index);
        self.awaiting_session = true;
        self.broadcast_state();
        let _ = self
            .bus_producer
            .send(Message::Session(SessionMessage::Open {
                track,
                origin: SessionOrigin::Sequence { index },
            }));
    }

    fn advance_from(&mut self, index: usize) {
        let next = index + 1;
        if next < self.playlist.len() {
            self.activate(next);
        } else {
            self.go_idle();
        }
    }

    fn handle_start(&mut self) {
        if self.playlist.is_empty() {
            debug!("SequenceManager: Start rejected, playlist is empty");
            let _ = self.bus_producer.send(Message::Sequence(
                SequenceMessage::StartRejected(EMPTY_PLAYLIST_MESSAGE.to_string()),
            ));
            return;
        }
        self.activate(0);
    }

    fn handle_stop(&mut self) {
        info!("SequenceManager: Stopping sequence");
        self.active_index = None;
        self.awaiting_session = false;
        let _ = self
            .bus_producer
            .send(Message::Session(SessionMessage::PauseSequenceSessions));
        self.broadcast_state();
    }

    /// One advancement check: the current session being gone (after it was
    /// observed at least once) or its backing state reporting Ended moves
    /// the sequence forward.
    fn handle_tick(&mut self) {
        let Some(index) = self.active_index else {
            return;
        };
        if index >= self.playlist.len() {
            self.go_idle();
            return;
        }

        let current = self
            .sessions
            .iter()
            .find(|snapshot| snapshot.sequence_index == Some(index));
        match current {
            None => {
                if !self.awaiting_session {
                    debug!(
                        "SequenceManager: Session for index {} is gone, advancing",
                        index
                    );
                    self.advance_from(index);
                }
            }
            Some(snapshot) => {
                if snapshot.playback_state == Some(PlaybackState::Ended) {
                    debug!(
                        "SequenceManager: Index {} finished playback, advancing",
                        index
                    );
                    self.advance_from(index);
                }
            }
        }
    }

    fn handle_synced(&mut self, snapshots: Vec<SessionSnapshot>) {
        if self.awaiting_session {
            if let Some(index) = self.active_index {
                if snapshots
                    .iter()
                    .any(|snapshot| snapshot.sequence_index == Some(index))
                {
                    self.awaiting_session = false;
                }
            }
        }
        self.sessions = snapshots;
    }

    fn handle_closed(&mut self, sequence_index: Option<usize>) {
        let (Some(closed), Some(active)) = (sequence_index, self.active_index) else {
            return;
        };
        if closed == active {
            debug!(
                "SequenceManager: Current sequence session closed, advancing past {}",
                closed
            );
            self.advance_from(closed);
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Sequence(SequenceMessage::Start) => self.handle_start(),
            Message::Sequence(SequenceMessage::Stop) => self.handle_stop(),
            Message::Sequence(SequenceMessage::Tick) => self.handle_tick(),
            Message::Collection(CollectionMessage::PlaylistChanged(tracks)) => {
                self.playlist = tracks;
            }
            Message::Session(SessionMessage::Synced(snapshots)) => self.handle_synced(snapshots),
            Message::Session(SessionMessage::Closed { sequence_index, .. }) => {
                self.handle_closed(sequence_index);
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("SequenceManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SequenceManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
