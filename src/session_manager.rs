use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::{
    collections::Track,
    config::ViewportConfig,
    player::{PlaybackState, PlayerBinding, PlayerCreateRequest, PlayerHandle, PlayerRuntime},
    protocol::{
        CollectionMessage, Message, PlayerMessage, SessionMessage, SessionOrigin, SessionSnapshot,
    },
};

/// Maximum number of concurrently open manually started sessions.
/// Sequence-mode sessions are exempt.
pub const MAX_MANUAL_SESSIONS: usize = 5;

/// Duration placeholder until the backing instance reports the real value.
/// Keeps progress math away from a zero divisor.
pub const DURATION_SENTINEL_SECONDS: f64 = 1.0;

const MANUAL_CASCADE_ORIGIN: f32 = 100.0;
const MANUAL_CASCADE_STEP: f32 = 20.0;
const SEQUENCE_SPAWN_HALF_WIDTH: f32 = 150.0;
const SEQUENCE_SPAWN_HALF_HEIGHT: f32 = 80.0;
const CAPACITY_MESSAGE: &str = "Maximum of 5 simultaneous players";

/// One floating mini-player: a track, its screen position, and the
/// (eventually bound) backing player instance it exclusively owns.
struct FloatingSession {
    track: Track,
    x: f32,
    y: f32,
    binding: PlayerBinding,
    progress_percent: f32,
    duration_seconds: f64,
    volume_percent: f32,
    is_playing: bool,
    sequence_index: Option<usize>,
    autoplay_on_bind: bool,
    bind_requested: bool,
    last_state: Option<PlaybackState>,
}

impl FloatingSession {
    fn new(track: Track, x: f32, y: f32, sequence_index: Option<usize>) -> Self {
        Self {
            track,
            x,
            y,
            binding: PlayerBinding::unbound(),
            progress_percent: 0.0,
            duration_seconds: DURATION_SENTINEL_SECONDS,
            volume_percent: 100.0,
            is_playing: false,
            sequence_index,
            autoplay_on_bind: sequence_index.is_some(),
            bind_requested: false,
            last_state: None,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.track.id.clone(),
            title: self.track.title.clone(),
            x: self.x,
            y: self.y,
            progress_percent: self.progress_percent,
            duration_seconds: self.duration_seconds,
            volume_percent: self.volume_percent,
            is_playing: self.is_playing,
            sequence_index: self.sequence_index,
            playback_state: self.last_state,
        }
    }
}

/// The floating session registry plus the playback synchronizer sweep.
///
/// All session mutation happens inside this manager's bus loop; the two
/// timers and the player runtime reach it only through messages.
pub struct SessionManager {
    sessions: Vec<FloatingSession>,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    runtime: Arc<dyn PlayerRuntime>,
    viewport: ViewportConfig,
}

impl SessionManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        runtime: Arc<dyn PlayerRuntime>,
        viewport: ViewportConfig,
    ) -> Self {
        Self {
            sessions: Vec::new(),
            bus_consumer,
            bus_producer,
            runtime,
            viewport,
        }
    }

    fn manual_session_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|session| session.sequence_index.is_none())
            .count()
    }

    fn find_session_mut(&mut self, id: &str) -> Option<&mut FloatingSession> {
        self.sessions.iter_mut().find(|s| s.track.id == id)
    }

    /// Pauses every open session except `keep_id`. Starting a manual
    /// session or a new sequence run silences everything else first.
    fn pause_all_except(&mut self, keep_id: Option<&str>) {
        for session in &mut self.sessions {
            if Some(session.track.id.as_str()) == keep_id {
                continue;
            }
            if session.binding.pause() {
                session.is_playing = false;
            }
        }
    }

    fn record_selection(&self, track: &Track) {
        let _ = self.bus_producer.send(Message::Collection(
            CollectionMessage::RecordSelection(track.clone()),
        ));
    }

    fn request_bind(&mut self, id: &str) {
        if !self.runtime.is_loaded() {
            debug!(
                "SessionManager: Runtime not loaded, deferring bind for {}",
                id
            );
            self.runtime.request_load(self.bus_producer.clone());
            return;
        }
        let Some(session) = self.find_session_mut(id) else {
            return;
        };
        if session.bind_requested {
            return;
        }
        session.bind_requested = true;
        let request = PlayerCreateRequest {
            track_id: session.track.id.clone(),
            media_id: session.track.media_id.clone(),
            autoplay: session.autoplay_on_bind,
        };
        self.runtime.create(request, self.bus_producer.clone());
    }

    fn handle_open(&mut self, track: Track, origin: SessionOrigin) {
        let sequence_index = match origin {
            SessionOrigin::Manual => None,
            SessionOrigin::Sequence { index } => Some(index),
        };

        // A new sequence run replaces whatever sequence the previous run
        // left behind. No Closed notification: this is an internal clear,
        // not a user close.
        if sequence_index == Some(0) {
            self.sessions.retain(|s| s.sequence_index.is_none());
        }

        let silences_others = sequence_index.is_none() || sequence_index == Some(0);

        if self.sessions.iter().any(|s| s.track.id == track.id) {
            debug!("SessionManager: Reusing open session for {}", track.id);
            if silences_others {
                self.pause_all_except(Some(&track.id));
            }
            self.record_selection(&track);
            let session = self
                .find_session_mut(&track.id)
                .expect("session present above");
            if sequence_index.is_some() {
                session.sequence_index = sequence_index;
            }
            if session.binding.play() {
                session.is_playing = true;
            } else if !session.binding.is_bound() {
                session.autoplay_on_bind = true;
            }
            return;
        }

        if sequence_index.is_none() && self.manual_session_count() >= MAX_MANUAL_SESSIONS {
            warn!(
                "SessionManager: Rejecting session for {}: manual cap reached",
                track.id
            );
            let _ = self.bus_producer.send(Message::Session(
                SessionMessage::OpenRejected(CAPACITY_MESSAGE.to_string()),
            ));
            return;
        }

        if silences_others {
            self.pause_all_except(None);
        }
        self.record_selection(&track);

        let (x, y) = if sequence_index.is_some() {
            (
                self.viewport.width / 2.0 - SEQUENCE_SPAWN_HALF_WIDTH,
                self.viewport.height / 2.0 - SEQUENCE_SPAWN_HALF_HEIGHT,
            )
        } else {
            let cascade = self.sessions.len() as f32 * MANUAL_CASCADE_STEP;
            (
                MANUAL_CASCADE_ORIGIN + cascade,
                MANUAL_CASCADE_ORIGIN + cascade,
            )
        };

        let id = track.id.clone();
        info!("SessionManager: Opening session for {} at ({}, {})", id, x, y);
        self.sessions
            .push(FloatingSession::new(track, x, y, sequence_index));
        self.request_bind(&id);
    }

    fn handle_close(&mut self, id: &str) {
        let Some(position) = self.sessions.iter().position(|s| s.track.id == id) else {
            return;
        };
        let sequence_index = self.sessions[position].sequence_index;
        let _ = self
            .bus_producer
            .send(Message::Session(SessionMessage::Closed {
                id: id.to_string(),
                sequence_index,
            }));
        self.sessions.remove(position);
        debug!("SessionManager: Closed session {}", id);
    }

    fn handle_toggle_play(&mut self, id: &str) {
        let Some(session) = self.find_session_mut(id) else {
            return;
        };
        if !session.binding.is_bound() {
            return;
        }
        match session.binding.playback_state() {
            Some(PlaybackState::Playing) => {
                if session.binding.pause() {
                    session.is_playing = false;
                }
            }
            Some(_) => {
                if session.binding.play() {
                    session.is_playing = true;
                }
            }
            None => {}
        }
    }

    fn handle_seek_percent(&mut self, id: &str, percent: f32) {
        let Some(session) = self.find_session_mut(id) else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        let seconds = f64::from(percent) / 100.0 * session.duration_seconds;
        if session.binding.seek(seconds) {
            session.progress_percent = percent;
        }
    }

    fn handle_set_volume(&mut self, id: &str, percent: f32) {
        let Some(session) = self.find_session_mut(id) else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        if session.binding.set_volume(percent) {
            session.volume_percent = percent;
        }
    }

    fn handle_pause_sequence_sessions(&mut self) {
        for session in &mut self.sessions {
            if session.sequence_index.is_some() {
                session.binding.pause();
                session.is_playing = false;
                session.autoplay_on_bind = false;
            }
        }
    }

    fn handle_bound(
        &mut self,
        track_id: &str,
        handle: Arc<dyn PlayerHandle>,
        duration_seconds: f64,
    ) {
        let Some(session) = self.find_session_mut(track_id) else {
            debug!(
                "SessionManager: Bind resolved for closed session {}",
                track_id
            );
            return;
        };
        session.binding.bind(handle);
        if duration_seconds > 0.0 {
            session.duration_seconds = duration_seconds;
        }
        if session.autoplay_on_bind && session.binding.play() {
            session.is_playing = true;
        }
        debug!(
            "SessionManager: Session {} bound, duration {}s",
            track_id, session.duration_seconds
        );
    }

    fn handle_state_changed(&mut self, track_id: &str, state: PlaybackState) {
        let Some(session) = self.find_session_mut(track_id) else {
            return;
        };
        session.last_state = Some(state);
        if state == PlaybackState::Ended {
            session.is_playing = false;
        }
    }

    fn handle_runtime_ready(&mut self) {
        info!("SessionManager: Player runtime ready, binding pending sessions");
        let pending: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| !s.bind_requested)
            .map(|s| s.track.id.clone())
            .collect();
        for id in pending {
            self.request_bind(&id);
        }
    }

    /// One synchronizer sweep: reconcile every bound session with its
    /// backing instance, then publish the registry snapshot.
    fn handle_sync_tick(&mut self) {
        for session in &mut self.sessions {
            if !session.binding.is_bound() {
                continue;
            }
            let position = session.binding.position_seconds();
            let state = session.binding.playback_state();
            // Either read failing leaves the session's prior state intact.
            let (Some(position), Some(state)) = (position, state) else {
                continue;
            };
            session.progress_percent = if session.duration_seconds > 0.0 {
                ((position / session.duration_seconds) * 100.0).clamp(0.0, 100.0) as f32
            } else {
                0.0
            };
            session.is_playing = state == PlaybackState::Playing;
            session.last_state = Some(state);
        }

        let snapshots: Vec<SessionSnapshot> =
            self.sessions.iter().map(FloatingSession::snapshot).collect();
        let _ = self
            .bus_producer
            .send(Message::Session(SessionMessage::Synced(snapshots)));
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Session(SessionMessage::Open { track, origin }) => {
                self.handle_open(track, origin);
            }
            Message::Session(SessionMessage::Close(id)) => self.handle_close(&id),
            Message::Session(SessionMessage::Move { id, x, y }) => {
                if let Some(session) = self.find_session_mut(&id) {
                    session.x = x;
                    session.y = y;
                }
            }
            Message::Session(SessionMessage::SetVolume { id, percent }) => {
                self.handle_set_volume(&id, percent);
            }
            Message::Session(SessionMessage::SeekPercent { id, percent }) => {
                self.handle_seek_percent(&id, percent);
            }
            Message::Session(SessionMessage::TogglePlay(id)) => self.handle_toggle_play(&id),
            Message::Session(SessionMessage::PauseSequenceSessions) => {
                self.handle_pause_sequence_sessions();
            }
            Message::Session(SessionMessage::SyncTick) => self.handle_sync_tick(),
            Message::Player(PlayerMessage::RuntimeReady) => self.handle_runtime_ready(),
            Message::Player(PlayerMessage::Bound {
                track_id,
                handle,
                duration_seconds,
            }) => self.handle_bound(&track_id, handle, duration_seconds),
            Message::Player(PlayerMessage::StateChanged { track_id, state }) => {
                self.handle_state_changed(&track_id, state);
            }
            _ => {}
        }
    }

    /// Starts the blocking manager loop.
    pub fn run(&mut self) {
        info!("SessionManager: started");
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SessionManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionManager, DURATION_SENTINEL_SECONDS, MAX_MANUAL_SESSIONS};
    use crate::collections::Track;
    use crate::config::ViewportConfig;
    use crate::player::{
        PlaybackState, PlayerCallError, PlayerCreateRequest, PlayerHandle, PlayerRuntime,
    };
    use crate::protocol::{
        CollectionMessage, Message, PlayerMessage, SessionMessage, SessionOrigin, SessionSnapshot,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast::{self, Sender};

    #[derive(Debug)]
    struct ScriptedState {
        position_seconds: f64,
        duration_seconds: f64,
        playback_state: PlaybackState,
        fail_reads: bool,
    }

    #[derive(Debug)]
    struct ScriptedHandle {
        state: Mutex<ScriptedState>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedHandle {
        fn new(duration_seconds: f64) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(ScriptedState {
                    position_seconds: 0.0,
                    duration_seconds,
                    playback_state: PlaybackState::Other,
                    fail_reads: false,
                }),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn set_position(&self, seconds: f64) {
            self.state.lock().unwrap().position_seconds = seconds;
        }

        fn set_playback_state(&self, state: PlaybackState) {
            self.state.lock().unwrap().playback_state = state;
        }

        fn set_fail_reads(&self, fail: bool) {
            self.state.lock().unwrap().fail_reads = fail;
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    impl PlayerHandle for ScriptedHandle {
        fn position_seconds(&self) -> Result<f64, PlayerCallError> {
            let state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err(PlayerCallError("read failure".to_string()));
            }
            Ok(state.position_seconds)
        }

        fn duration_seconds(&self) -> Result<f64, PlayerCallError> {
            Ok(self.state.lock().unwrap().duration_seconds)
        }

        fn playback_state(&self) -> Result<PlaybackState, PlayerCallError> {
            let state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err(PlayerCallError("read failure".to_string()));
            }
            Ok(state.playback_state)
        }

        fn play(&self) -> Result<(), PlayerCallError> {
            self.record("play");
            self.set_playback_state(PlaybackState::Playing);
            Ok(())
        }

        fn pause(&self) -> Result<(), PlayerCallError> {
            self.record("pause");
            self.set_playback_state(PlaybackState::Other);
            Ok(())
        }

        fn seek(&self, seconds: f64) -> Result<(), PlayerCallError> {
            self.record(&format!("seek:{}", seconds));
            self.set_position(seconds);
            Ok(())
        }

        fn set_volume(&self, percent: f32) -> Result<(), PlayerCallError> {
            self.record(&format!("volume:{}", percent));
            Ok(())
        }
    }

    struct ScriptedRuntime {
        loaded: AtomicBool,
        load_requests: Mutex<usize>,
        duration_seconds: f64,
        handles: Mutex<HashMap<String, Arc<ScriptedHandle>>>,
    }

    impl ScriptedRuntime {
        fn new(duration_seconds: f64) -> Arc<Self> {
            Arc::new(Self {
                loaded: AtomicBool::new(true),
                load_requests: Mutex::new(0),
                duration_seconds,
                handles: Mutex::new(HashMap::new()),
            })
        }

        fn unloaded(duration_seconds: f64) -> Arc<Self> {
            let runtime = Self::new(duration_seconds);
            runtime.loaded.store(false, Ordering::SeqCst);
            runtime
        }

        fn handle(&self, track_id: &str) -> Arc<ScriptedHandle> {
            self.handles
                .lock()
                .unwrap()
                .get(track_id)
                .expect("handle should exist")
                .clone()
        }

        fn num_created(&self) -> usize {
            self.handles.lock().unwrap().len()
        }
    }

    impl PlayerRuntime for ScriptedRuntime {
        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        fn request_load(&self, _events: Sender<Message>) {
            *self.load_requests.lock().unwrap() += 1;
        }

        fn create(&self, request: PlayerCreateRequest, events: Sender<Message>) {
            let handle = ScriptedHandle::new(self.duration_seconds);
            self.handles
                .lock()
                .unwrap()
                .insert(request.track_id.clone(), handle.clone());
            let _ = events.send(Message::Player(PlayerMessage::Bound {
                track_id: request.track_id,
                handle,
                duration_seconds: self.duration_seconds,
            }));
        }
    }

    fn test_track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            media_id: id.to_string(),
            title: format!("Track {}", id),
            thumbnail_url: String::new(),
        }
    }

    struct Harness {
        manager: SessionManager,
        observer: broadcast::Receiver<Message>,
        runtime: Arc<ScriptedRuntime>,
    }

    impl Harness {
        fn new(runtime: Arc<ScriptedRuntime>) -> Self {
            let (bus_sender, _) = broadcast::channel(256);
            let manager = SessionManager::new(
                bus_sender.subscribe(),
                bus_sender.clone(),
                runtime.clone(),
                ViewportConfig::default(),
            );
            Self {
                manager,
                observer: bus_sender.subscribe(),
                runtime,
            }
        }

        /// Feeds messages the manager would receive from its own bus loop
        /// (player runtime events) back into it, returning everything else.
        fn pump(&mut self) -> Vec<Message> {
            let mut others = Vec::new();
            while let Ok(message) = self.observer.try_recv() {
                match message {
                    Message::Player(_) => self.manager.handle_message(message),
                    other => others.push(other),
                }
            }
            others
        }

        fn open_manual(&mut self, id: &str) {
            self.manager.handle_message(Message::Session(SessionMessage::Open {
                track: test_track(id),
                origin: SessionOrigin::Manual,
            }));
            self.pump();
        }

        fn open_sequence(&mut self, id: &str, index: usize) {
            self.manager.handle_message(Message::Session(SessionMessage::Open {
                track: test_track(id),
                origin: SessionOrigin::Sequence { index },
            }));
            self.pump();
        }

        fn synced_snapshot(&mut self) -> Vec<SessionSnapshot> {
            self.manager
                .handle_message(Message::Session(SessionMessage::SyncTick));
            let messages = self.pump();
            for message in messages.into_iter().rev() {
                if let Message::Session(SessionMessage::Synced(snapshots)) = message {
                    return snapshots;
                }
            }
            panic!("no Synced snapshot emitted");
        }
    }

    #[test]
    fn test_manual_open_cascades_positions_and_records_history() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.manager.handle_message(Message::Session(SessionMessage::Open {
            track: test_track("a"),
            origin: SessionOrigin::Manual,
        }));
        let others = harness.pump();
        assert!(others.iter().any(|message| matches!(
            message,
            Message::Collection(CollectionMessage::RecordSelection(track)) if track.id == "a"
        )));

        harness.open_manual("b");
        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 2);
        assert!((snapshots[0].x - 100.0).abs() < f32::EPSILON);
        assert!((snapshots[1].x - 120.0).abs() < f32::EPSILON);
        assert!((snapshots[1].volume_percent - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sixth_manual_open_is_rejected_and_registry_unchanged() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        for id in ["a", "b", "c", "d", "e"] {
            harness.open_manual(id);
        }
        assert_eq!(harness.runtime.num_created(), MAX_MANUAL_SESSIONS);

        harness.manager.handle_message(Message::Session(SessionMessage::Open {
            track: test_track("f"),
            origin: SessionOrigin::Manual,
        }));
        let others = harness.pump();
        assert!(others.iter().any(|message| matches!(
            message,
            Message::Session(SessionMessage::OpenRejected(_))
        )));
        assert!(
            !others.iter().any(|message| matches!(
                message,
                Message::Collection(CollectionMessage::RecordSelection(_))
            )),
            "rejected open must not touch history"
        );

        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), MAX_MANUAL_SESSIONS);
        assert!(snapshots.iter().all(|snapshot| snapshot.id != "f"));
    }

    #[test]
    fn test_sequence_sessions_are_exempt_from_manual_cap() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        for id in ["a", "b", "c", "d", "e"] {
            harness.open_manual(id);
        }

        harness.open_sequence("s", 0);
        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 6);
        let sequence = snapshots.iter().find(|s| s.id == "s").expect("sequence session");
        assert_eq!(sequence.sequence_index, Some(0));
        // Sequence sessions spawn centered in the viewport.
        assert!((sequence.x - (1280.0 / 2.0 - 150.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_close_removes_exactly_the_target_session() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_manual("a");
        harness.open_manual("b");
        harness.manager.handle_message(Message::Session(SessionMessage::Move {
            id: "b".to_string(),
            x: 640.0,
            y: 17.0,
        }));

        harness.manager.handle_message(Message::Session(SessionMessage::Close(
            "a".to_string(),
        )));
        let others = harness.pump();
        assert!(others.iter().any(|message| matches!(
            message,
            Message::Session(SessionMessage::Closed { id, sequence_index: None }) if id == "a"
        )));

        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, "b");
        assert!((snapshots[0].x - 640.0).abs() < f32::EPSILON);
        assert!((snapshots[0].y - 17.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sync_tick_derives_progress_from_polled_position() {
        let mut harness = Harness::new(ScriptedRuntime::new(200.0));
        harness.open_manual("a");
        let handle = harness.runtime.handle("a");
        handle.set_position(50.0);
        handle.set_playback_state(PlaybackState::Playing);

        let snapshots = harness.synced_snapshot();
        assert!((snapshots[0].progress_percent - 25.0).abs() < f32::EPSILON);
        assert!(snapshots[0].is_playing);
        assert_eq!(snapshots[0].playback_state, Some(PlaybackState::Playing));
    }

    #[test]
    fn test_poll_failure_retains_prior_session_state() {
        let mut harness = Harness::new(ScriptedRuntime::new(200.0));
        harness.open_manual("a");
        harness.open_manual("b");
        let failing = harness.runtime.handle("a");
        let healthy = harness.runtime.handle("b");
        failing.set_position(50.0);
        failing.set_playback_state(PlaybackState::Playing);
        harness.synced_snapshot();

        failing.set_fail_reads(true);
        failing.set_position(120.0);
        healthy.set_position(100.0);
        healthy.set_playback_state(PlaybackState::Playing);

        let snapshots = harness.synced_snapshot();
        let broken = snapshots.iter().find(|s| s.id == "a").unwrap();
        let fine = snapshots.iter().find(|s| s.id == "b").unwrap();
        assert!((broken.progress_percent - 25.0).abs() < f32::EPSILON);
        assert!(broken.is_playing);
        assert!((fine.progress_percent - 50.0).abs() < f32::EPSILON);
    }

    // Confirmed original behavior: starting a sequence silences every
    // other open session, manual ones included.
    #[test]
    fn test_sequence_start_pauses_unrelated_manual_sessions() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_manual("a");
        harness.manager.handle_message(Message::Session(SessionMessage::TogglePlay(
            "a".to_string(),
        )));
        harness.pump();

        harness.open_sequence("s", 0);

        let handle = harness.runtime.handle("a");
        assert!(handle.calls().contains(&"pause".to_string()));
        let snapshots = harness.synced_snapshot();
        let manual = snapshots.iter().find(|s| s.id == "a").unwrap();
        assert!(!manual.is_playing);
    }

    #[test]
    fn test_new_sequence_run_clears_previous_sequence_sessions() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_sequence("old", 0);
        harness.open_sequence("new", 0);

        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, "new");
    }

    #[test]
    fn test_reopening_open_session_resumes_instead_of_duplicating() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_manual("a");
        harness.open_manual("a");

        assert_eq!(harness.runtime.num_created(), 1);
        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].is_playing);
        assert!(harness.runtime.handle("a").calls().contains(&"play".to_string()));
    }

    #[test]
    fn test_sequence_advancement_reuses_open_session_for_next_track() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_manual("b");
        harness.open_sequence("a", 0);
        harness.open_sequence("b", 1);

        assert_eq!(harness.runtime.num_created(), 2);
        let snapshots = harness.synced_snapshot();
        let reused = snapshots.iter().find(|s| s.id == "b").unwrap();
        assert_eq!(reused.sequence_index, Some(1));
        assert!(reused.is_playing);
    }

    #[test]
    fn test_toggle_play_flips_backing_state() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_manual("a");
        let handle = harness.runtime.handle("a");

        harness.manager.handle_message(Message::Session(SessionMessage::TogglePlay(
            "a".to_string(),
        )));
        assert!(handle.calls().contains(&"play".to_string()));
        harness.manager.handle_message(Message::Session(SessionMessage::TogglePlay(
            "a".to_string(),
        )));
        assert!(handle.calls().contains(&"pause".to_string()));

        let snapshots = harness.synced_snapshot();
        assert!(!snapshots[0].is_playing);
    }

    #[test]
    fn test_controls_on_unknown_or_unbound_sessions_are_ignored() {
        let mut harness = Harness::new(ScriptedRuntime::unloaded(180.0));
        harness.open_manual("a");

        // Unbound: the runtime is not loaded, so no handle exists yet.
        harness.manager.handle_message(Message::Session(SessionMessage::TogglePlay(
            "a".to_string(),
        )));
        harness.manager.handle_message(Message::Session(SessionMessage::SeekPercent {
            id: "a".to_string(),
            percent: 50.0,
        }));
        // Unknown id: no-op.
        harness.manager.handle_message(Message::Session(SessionMessage::SetVolume {
            id: "ghost".to_string(),
            percent: 10.0,
        }));

        let snapshots = harness.synced_snapshot();
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].is_playing);
        assert!((snapshots[0].progress_percent - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_bind_defers_until_runtime_ready() {
        let mut harness = Harness::new(ScriptedRuntime::unloaded(240.0));
        harness.open_manual("a");
        assert_eq!(harness.runtime.num_created(), 0);
        assert_eq!(*harness.runtime.load_requests.lock().unwrap(), 1);

        harness.runtime.loaded.store(true, Ordering::SeqCst);
        harness
            .manager
            .handle_message(Message::Player(PlayerMessage::RuntimeReady));
        harness.pump();

        assert_eq!(harness.runtime.num_created(), 1);
        let snapshots = harness.synced_snapshot();
        assert!((snapshots[0].duration_seconds - 240.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bound_sequence_session_autoplays() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_sequence("s", 0);
        let snapshots = harness.synced_snapshot();
        assert!(snapshots[0].is_playing);
        assert!(harness.runtime.handle("s").calls().contains(&"play".to_string()));
    }

    #[test]
    fn test_seek_percent_maps_to_seconds_of_known_duration() {
        let mut harness = Harness::new(ScriptedRuntime::new(200.0));
        harness.open_manual("a");

        harness.manager.handle_message(Message::Session(SessionMessage::SeekPercent {
            id: "a".to_string(),
            percent: 25.0,
        }));

        let handle = harness.runtime.handle("a");
        assert!(handle.calls().contains(&"seek:50".to_string()));
        let snapshots = harness.synced_snapshot();
        assert!((snapshots[0].progress_percent - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_volume_applies_and_clamps() {
        let mut harness = Harness::new(ScriptedRuntime::new(200.0));
        harness.open_manual("a");

        harness.manager.handle_message(Message::Session(SessionMessage::SetVolume {
            id: "a".to_string(),
            percent: 140.0,
        }));

        let snapshots = harness.synced_snapshot();
        assert!((snapshots[0].volume_percent - 100.0).abs() < f32::EPSILON);
        assert!(harness
            .runtime
            .handle("a")
            .calls()
            .contains(&"volume:100".to_string()));
    }

    #[test]
    fn test_ended_state_change_clears_is_playing() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_sequence("s", 0);
        assert!(harness.manager.sessions[0].is_playing);

        harness.manager.handle_message(Message::Player(PlayerMessage::StateChanged {
            track_id: "s".to_string(),
            state: PlaybackState::Ended,
        }));

        assert!(!harness.manager.sessions[0].is_playing);
        assert_eq!(
            harness.manager.sessions[0].last_state,
            Some(PlaybackState::Ended)
        );
    }

    #[test]
    fn test_pause_sequence_sessions_leaves_them_open() {
        let mut harness = Harness::new(ScriptedRuntime::new(180.0));
        harness.open_sequence("s", 0);
        harness.open_manual("m");
        harness.manager.handle_message(Message::Session(SessionMessage::TogglePlay(
            "m".to_string(),
        )));

        harness
            .manager
            .handle_message(Message::Session(SessionMessage::PauseSequenceSessions));

        let snapshots = harness.synced_snapshot();
        let sequence = snapshots.iter().find(|s| s.id == "s").unwrap();
        assert!(!sequence.is_playing);
        assert!(snapshots.iter().any(|s| s.id == "m"));
        assert!(harness.runtime.handle("s").calls().contains(&"pause".to_string()));
    }

    #[test]
    fn test_duration_sentinel_guards_progress_before_bind() {
        let mut harness = Harness::new(ScriptedRuntime::unloaded(180.0));
        harness.open_manual("a");
        let snapshots = harness.synced_snapshot();
        assert!((snapshots[0].duration_seconds - DURATION_SENTINEL_SECONDS).abs() < f64::EPSILON);
        assert!((snapshots[0].progress_percent - 0.0).abs() < f32::EPSILON);
    }
}
