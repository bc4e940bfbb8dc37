use std::sync::{Arc, Mutex};

use log::warn;
use tokio::sync::broadcast::Receiver;

use crate::{
    collections::Track,
    protocol::{
        CollectionMessage, Message, SearchMessage, SequenceMessage, SessionMessage,
        SessionSnapshot,
    },
};

/// Last-known view of everything the command loop can act on.
#[derive(Debug, Default)]
pub struct ConsoleState {
    pub search_results: Vec<Track>,
    pub playlist: Vec<Track>,
    pub history: Vec<Track>,
    pub sessions: Vec<SessionSnapshot>,
    pub active_sequence_index: Option<usize>,
}

/// Terminal rendering surface: consumes bus broadcasts, mirrors them into
/// shared state for the command loop, and prints user-facing messages.
pub struct ConsoleManager {
    bus_consumer: Receiver<Message>,
    state: Arc<Mutex<ConsoleState>>,
}

impl ConsoleManager {
    pub fn new(bus_consumer: Receiver<Message>) -> Self {
        Self {
            bus_consumer,
            state: Arc::new(Mutex::new(ConsoleState::default())),
        }
    }

    pub fn state(&self) -> Arc<Mutex<ConsoleState>> {
        Arc::clone(&self.state)
    }

    fn with_state(&self, update: impl FnOnce(&mut ConsoleState)) {
        match self.state.lock() {
            Ok(mut state) => update(&mut state),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Search(SearchMessage::Completed(results)) => {
                println!("Results:");
                for (index, track) in results.iter().enumerate() {
                    println!("  {}. {} [{}]", index + 1, track.title, track.id);
                }
                self.with_state(|state| state.search_results = results);
            }
            Message::Search(SearchMessage::NoResults) => {
                println!("No results found. Check your search.");
                self.with_state(|state| state.search_results.clear());
            }
            Message::Search(SearchMessage::Failed(text)) => {
                println!("{}", text);
            }
            Message::Session(SessionMessage::OpenRejected(text)) => {
                println!("{}", text);
            }
            Message::Sequence(SequenceMessage::StartRejected(text)) => {
                println!("{}", text);
            }
            Message::Sequence(SequenceMessage::StateChanged { active_index }) => {
                let playlist_len = match self.state.lock() {
                    Ok(state) => state.playlist.len(),
                    Err(poisoned) => poisoned.into_inner().playlist.len(),
                };
                match active_index {
                    Some(index) => {
                        println!("Playing playlist: track {} of {}", index + 1, playlist_len);
                    }
                    None => println!("Playlist playback stopped."),
                }
                self.with_state(|state| state.active_sequence_index = active_index);
            }
            Message::Collection(CollectionMessage::PlaylistChanged(tracks)) => {
                self.with_state(|state| state.playlist = tracks);
            }
            Message::Collection(CollectionMessage::HistoryChanged(tracks)) => {
                self.with_state(|state| state.history = tracks);
            }
            Message::Session(SessionMessage::Synced(snapshots)) => {
                self.with_state(|state| state.sessions = snapshots);
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("ConsoleManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
