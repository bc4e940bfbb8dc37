use log::{error, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::{
    collections::{History, Playlist, Track},
    db_manager::{DbManager, HISTORY_KEY, PLAYLIST_KEY},
    protocol::{CollectionMessage, Message},
};

/// Owns the playlist and history collections: restores them at startup,
/// applies mutations, persists after every change, and broadcasts full
/// snapshots for the other components to mirror.
pub struct CollectionsManager {
    playlist: Playlist,
    history: History,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    db_manager: DbManager,
}

impl CollectionsManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        db_manager: DbManager,
    ) -> Self {
        Self {
            playlist: Playlist::new(),
            history: History::new(),
            bus_consumer,
            bus_producer,
            db_manager,
        }
    }

    fn restore(&mut self) {
        match self.db_manager.load_tracks(PLAYLIST_KEY) {
            Ok(tracks) => {
                info!("CollectionsManager: Restoring {} playlist tracks", tracks.len());
                self.playlist = Playlist::from_tracks(tracks);
            }
            Err(e) => {
                error!("CollectionsManager: Failed to restore playlist: {}", e);
            }
        }
        match self.db_manager.load_tracks(HISTORY_KEY) {
            Ok(tracks) => {
                info!("CollectionsManager: Restoring {} history tracks", tracks.len());
                self.history = History::from_tracks(tracks);
            }
            Err(e) => {
                error!("CollectionsManager: Failed to restore history: {}", e);
            }
        }
        self.broadcast_playlist();
        self.broadcast_history();
    }

    fn broadcast_playlist(&self) {
        let _ = self.bus_producer.send(Message::Collection(
            CollectionMessage::PlaylistChanged(self.playlist.tracks().to_vec()),
        ));
    }

    fn broadcast_history(&self) {
        let _ = self.bus_producer.send(Message::Collection(
            CollectionMessage::HistoryChanged(self.history.tracks().to_vec()),
        ));
    }

    fn persist_playlist(&self) {
        if let Err(e) = self
            .db_manager
            .save_tracks(PLAYLIST_KEY, self.playlist.tracks())
        {
            error!("CollectionsManager: Failed to persist playlist: {}", e);
        }
    }

    fn persist_history(&self) {
        if let Err(e) = self
            .db_manager
            .save_tracks(HISTORY_KEY, self.history.tracks())
        {
            error!("CollectionsManager: Failed to persist history: {}", e);
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Collection(CollectionMessage::AddToPlaylist(track)) => {
                if self.playlist.add_track(track) {
                    self.persist_playlist();
                    self.broadcast_playlist();
                }
            }
            Message::Collection(CollectionMessage::RemoveFromPlaylist(id)) => {
                if self.playlist.remove_track(&id) {
                    self.persist_playlist();
                    self.broadcast_playlist();
                }
            }
            Message::Collection(CollectionMessage::RecordSelection(track)) => {
                self.history.record(track);
                self.persist_history();
                self.broadcast_history();
            }
            _ => {}
        }
    }

    /// Restores persisted collections, then starts the blocking manager
    /// loop.
    pub fn run(&mut self) {
        self.restore();
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("CollectionsManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
