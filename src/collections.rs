use serde::{Deserialize, Serialize};

/// Number of entries the playback history retains.
pub const HISTORY_LIMIT: usize = 10;

/// One catalog item as returned by the search proxy.
///
/// `id` and `media_id` carry the same catalog identifier; `id` keys the
/// playlist, history and session registries while `media_id` is what the
/// embeddable player runtime is asked to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub media_id: String,
    pub title: String,
    pub thumbnail_url: String,
}

/// Ordered track collection with id uniqueness. Order is playback order
/// when the sequencer is driving.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new() -> Playlist {
        Playlist { tracks: Vec::new() }
    }

    pub fn from_tracks(tracks: Vec<Track>) -> Playlist {
        let mut playlist = Playlist::new();
        for track in tracks {
            playlist.add_track(track);
        }
        playlist
    }

    /// Appends a track unless one with the same id is already present.
    /// Returns whether the playlist changed.
    pub fn add_track(&mut self, track: Track) -> bool {
        if self.tracks.iter().any(|existing| existing.id == track.id) {
            return false;
        }
        self.tracks.push(track);
        true
    }

    /// Removes the track with the given id. Returns whether the playlist
    /// changed.
    pub fn remove_track(&mut self, id: &str) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|track| track.id != id);
        self.tracks.len() != before
    }

    pub fn get_track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

/// Most-recent-first selection history, deduplicated by id and capped at
/// `HISTORY_LIMIT` entries.
#[derive(Debug, Clone, Default)]
pub struct History {
    tracks: Vec<Track>,
}

impl History {
    pub fn new() -> History {
        History { tracks: Vec::new() }
    }

    pub fn from_tracks(tracks: Vec<Track>) -> History {
        let mut history = History::new();
        for track in tracks.into_iter().rev() {
            history.record(track);
        }
        history
    }

    /// Moves the track to the front, dropping any previous entry with the
    /// same id, then truncates to the history limit.
    pub fn record(&mut self, track: Track) {
        self.tracks.retain(|existing| existing.id != track.id);
        self.tracks.insert(0, track);
        self.tracks.truncate(HISTORY_LIMIT);
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::{History, Playlist, Track, HISTORY_LIMIT};

    fn test_track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            media_id: id.to_string(),
            title: format!("Track {}", id),
            thumbnail_url: format!("https://thumbs.example.com/{}.jpg", id),
        }
    }

    #[test]
    fn test_playlist_add_rejects_duplicate_ids() {
        let mut playlist = Playlist::new();
        assert!(playlist.add_track(test_track("a")));
        assert!(playlist.add_track(test_track("b")));
        assert!(!playlist.add_track(test_track("a")));
        assert_eq!(playlist.num_tracks(), 2);
        assert_eq!(playlist.get_track(0).unwrap().id, "a");
        assert_eq!(playlist.get_track(1).unwrap().id, "b");
    }

    #[test]
    fn test_playlist_remove_by_id_preserves_order() {
        let mut playlist = Playlist::new();
        playlist.add_track(test_track("a"));
        playlist.add_track(test_track("b"));
        playlist.add_track(test_track("c"));

        assert!(playlist.remove_track("b"));
        assert!(!playlist.remove_track("b"));
        assert_eq!(playlist.num_tracks(), 2);
        assert_eq!(playlist.get_track(0).unwrap().id, "a");
        assert_eq!(playlist.get_track(1).unwrap().id, "c");
    }

    #[test]
    fn test_playlist_never_holds_duplicates_across_mutations() {
        let mut playlist = Playlist::new();
        for id in ["a", "b", "a", "c", "b", "a"] {
            playlist.add_track(test_track(id));
        }
        playlist.remove_track("a");
        playlist.add_track(test_track("a"));

        let mut seen = std::collections::HashSet::new();
        for track in playlist.tracks() {
            assert!(seen.insert(track.id.clone()), "duplicate id {}", track.id);
        }
        assert_eq!(playlist.num_tracks(), 3);
    }

    #[test]
    fn test_history_moves_reselected_track_to_front() {
        let mut history = History::new();
        history.record(test_track("a"));
        history.record(test_track("b"));
        history.record(test_track("a"));

        assert_eq!(history.num_tracks(), 2);
        assert_eq!(history.tracks()[0].id, "a");
        assert_eq!(history.tracks()[1].id, "b");
    }

    #[test]
    fn test_history_caps_at_limit() {
        let mut history = History::new();
        for index in 0..(HISTORY_LIMIT + 4) {
            history.record(test_track(&format!("t{}", index)));
        }

        assert_eq!(history.num_tracks(), HISTORY_LIMIT);
        assert_eq!(history.tracks()[0].id, format!("t{}", HISTORY_LIMIT + 3));
    }

    #[test]
    fn test_history_from_tracks_preserves_recency_order() {
        let restored = vec![test_track("newest"), test_track("older"), test_track("oldest")];
        let history = History::from_tracks(restored);

        assert_eq!(history.tracks()[0].id, "newest");
        assert_eq!(history.tracks()[2].id, "oldest");
    }
}
