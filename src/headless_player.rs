//! Clock-driven stand-in for the embeddable player runtime.
//!
//! Used when no real embeddable runtime is wired into the process: binds
//! resolve after a short delay, playback position advances on the wall
//! clock, and `Ended` is reported once the simulated duration elapses.
//! Decode and render do not happen here or anywhere else in the process.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::broadcast::Sender;

use crate::player::{
    PlaybackState, PlayerCallError, PlayerCreateRequest, PlayerHandle, PlayerRuntime,
};
use crate::protocol::{Message, PlayerMessage};

const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(300);
const DEFAULT_BIND_DELAY: Duration = Duration::from_millis(200);
const ENDED_WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Deterministic pseudo-duration so repeated binds of the same media id
/// agree with each other.
fn simulated_duration_seconds(media_id: &str) -> f64 {
    let mut acc: u64 = 0;
    for byte in media_id.bytes() {
        acc = acc.wrapping_mul(31).wrapping_add(u64::from(byte));
    }
    (60 + acc % 240) as f64
}

pub struct HeadlessPlayerRuntime {
    loaded: Arc<AtomicBool>,
    load_requested: AtomicBool,
    load_delay: Duration,
    bind_delay: Duration,
}

impl HeadlessPlayerRuntime {
    pub fn new() -> Self {
        Self::with_delays(DEFAULT_LOAD_DELAY, DEFAULT_BIND_DELAY)
    }

    pub fn with_delays(load_delay: Duration, bind_delay: Duration) -> Self {
        Self {
            loaded: Arc::new(AtomicBool::new(false)),
            load_requested: AtomicBool::new(false),
            load_delay,
            bind_delay,
        }
    }
}

impl Default for HeadlessPlayerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerRuntime for HeadlessPlayerRuntime {
    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    fn request_load(&self, events: Sender<Message>) {
        if self.load_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let loaded = Arc::clone(&self.loaded);
        let load_delay = self.load_delay;
        thread::spawn(move || {
            thread::sleep(load_delay);
            loaded.store(true, Ordering::SeqCst);
            info!("HeadlessPlayerRuntime: runtime loaded");
            let _ = events.send(Message::Player(PlayerMessage::RuntimeReady));
        });
    }

    fn create(&self, request: PlayerCreateRequest, events: Sender<Message>) {
        if !self.is_loaded() {
            debug!(
                "HeadlessPlayerRuntime: not loaded, ignoring create for {}",
                request.track_id
            );
            return;
        }
        let bind_delay = self.bind_delay;
        thread::spawn(move || {
            thread::sleep(bind_delay);
            let duration_seconds = simulated_duration_seconds(&request.media_id);
            let handle = Arc::new(HeadlessPlayerHandle::new(duration_seconds, request.autoplay));
            debug!(
                "HeadlessPlayerRuntime: bound {} ({}s)",
                request.track_id, duration_seconds
            );
            if events
                .send(Message::Player(PlayerMessage::Bound {
                    track_id: request.track_id.clone(),
                    handle: Arc::clone(&handle) as Arc<dyn PlayerHandle>,
                    duration_seconds,
                }))
                .is_err()
            {
                return;
            }

            // Report the Ended transition once, the way a real runtime
            // pushes state-change events alongside polling.
            loop {
                thread::sleep(ENDED_WATCH_INTERVAL);
                match handle.playback_state() {
                    Ok(PlaybackState::Ended) => {
                        let _ = events.send(Message::Player(PlayerMessage::StateChanged {
                            track_id: request.track_id,
                            state: PlaybackState::Ended,
                        }));
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
                if events.receiver_count() == 0 {
                    return;
                }
            }
        });
    }
}

struct ClockState {
    playing_since: Option<Instant>,
    accumulated_seconds: f64,
    volume_percent: f32,
}

/// Backing instance whose position is pure clock arithmetic.
pub struct HeadlessPlayerHandle {
    duration_seconds: f64,
    state: Mutex<ClockState>,
}

impl std::fmt::Debug for HeadlessPlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessPlayerHandle")
            .field("duration_seconds", &self.duration_seconds)
            .finish()
    }
}

impl HeadlessPlayerHandle {
    fn new(duration_seconds: f64, autoplay: bool) -> Self {
        Self {
            duration_seconds,
            state: Mutex::new(ClockState {
                playing_since: autoplay.then(Instant::now),
                accumulated_seconds: 0.0,
                volume_percent: 100.0,
            }),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, ClockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn position_of(&self, state: &ClockState) -> f64 {
        let elapsed = state
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (state.accumulated_seconds + elapsed).min(self.duration_seconds)
    }
}

impl PlayerHandle for HeadlessPlayerHandle {
    fn position_seconds(&self) -> Result<f64, PlayerCallError> {
        let state = self.locked();
        Ok(self.position_of(&state))
    }

    fn duration_seconds(&self) -> Result<f64, PlayerCallError> {
        Ok(self.duration_seconds)
    }

    fn playback_state(&self) -> Result<PlaybackState, PlayerCallError> {
        let state = self.locked();
        if self.position_of(&state) >= self.duration_seconds {
            Ok(PlaybackState::Ended)
        } else if state.playing_since.is_some() {
            Ok(PlaybackState::Playing)
        } else {
            Ok(PlaybackState::Other)
        }
    }

    fn play(&self) -> Result<(), PlayerCallError> {
        let mut state = self.locked();
        if self.position_of(&state) >= self.duration_seconds {
            state.accumulated_seconds = 0.0;
        }
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerCallError> {
        let mut state = self.locked();
        state.accumulated_seconds = self.position_of(&state);
        state.playing_since = None;
        Ok(())
    }

    fn seek(&self, seconds: f64) -> Result<(), PlayerCallError> {
        let mut state = self.locked();
        state.accumulated_seconds = seconds.clamp(0.0, self.duration_seconds);
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn set_volume(&self, percent: f32) -> Result<(), PlayerCallError> {
        self.locked().volume_percent = percent.clamp(0.0, 100.0);
        Ok(())
    }
}
