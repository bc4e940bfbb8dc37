use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backends::{SearchBackend, SearchError};
use crate::protocol::{Message, SearchMessage};

/// Queries shorter than this (after trimming) are rejected locally.
pub const MIN_QUERY_CHARS: usize = 2;

/// Validates and dispatches catalog searches over the injected backend.
pub struct SearchManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    backend: Arc<dyn SearchBackend>,
}

impl SearchManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            backend,
        }
    }

    fn handle_submit(&mut self, query: &str) {
        let trimmed = query.trim();
        if trimmed.chars().count() < MIN_QUERY_CHARS {
            debug!("SearchManager: Rejected short query {:?}", query);
            let _ = self.bus_producer.send(Message::Search(SearchMessage::Failed(
                SearchError::QueryTooShort.to_string(),
            )));
            return;
        }

        match self.backend.search(trimmed) {
            Ok(results) if results.is_empty() => {
                debug!("SearchManager: No results for {:?}", trimmed);
                let _ = self
                    .bus_producer
                    .send(Message::Search(SearchMessage::NoResults));
            }
            Ok(results) => {
                debug!(
                    "SearchManager: {} results for {:?}",
                    results.len(),
                    trimmed
                );
                let _ = self
                    .bus_producer
                    .send(Message::Search(SearchMessage::Completed(results)));
            }
            Err(error) => {
                warn!("SearchManager: Search failed: {}", error);
                let _ = self
                    .bus_producer
                    .send(Message::Search(SearchMessage::Failed(error.to_string())));
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        if let Message::Search(SearchMessage::Submit(query)) = message {
            self.handle_submit(&query);
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("SearchManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SearchManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
