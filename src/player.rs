//! Capability traits over the external embeddable player runtime.
//!
//! The runtime itself lives outside the process (it owns all media decode
//! and render work); this module defines the contract the session registry
//! programs against, plus the guarded `PlayerBinding` wrapper that keeps
//! backing-instance failures away from session state.

use std::fmt;
use std::sync::Arc;

use log::warn;
use tokio::sync::broadcast::Sender;

use crate::protocol::Message;

/// Playback status reported by a backing player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Ended,
    Other, // buffering, paused, cued - anything the core does not act on
}

/// A call into a backing instance failed. Caught and logged at the binding
/// layer; never surfaced to the user.
#[derive(Debug, Clone, thiserror::Error)]
#[error("player call failed: {0}")]
pub struct PlayerCallError(pub String);

/// Parameters for creating one backing instance.
#[derive(Debug, Clone)]
pub struct PlayerCreateRequest {
    /// Session/track id the resulting events are keyed by.
    pub track_id: String,
    /// Catalog media identifier the runtime loads.
    pub media_id: String,
    /// Whether playback should start as soon as the instance is ready.
    pub autoplay: bool,
}

/// Control surface of one backing player instance.
pub trait PlayerHandle: Send + Sync + fmt::Debug {
    fn position_seconds(&self) -> Result<f64, PlayerCallError>;
    fn duration_seconds(&self) -> Result<f64, PlayerCallError>;
    fn playback_state(&self) -> Result<PlaybackState, PlayerCallError>;
    fn play(&self) -> Result<(), PlayerCallError>;
    fn pause(&self) -> Result<(), PlayerCallError>;
    fn seek(&self, seconds: f64) -> Result<(), PlayerCallError>;
    fn set_volume(&self, percent: f32) -> Result<(), PlayerCallError>;
}

/// Factory capability for backing player instances.
///
/// The runtime loads on demand: `request_load` is idempotent and emits
/// `PlayerMessage::RuntimeReady` on the bus exactly once when the runtime
/// becomes usable. `create` is asynchronous; the instance arrives later as
/// `PlayerMessage::Bound` and state transitions as
/// `PlayerMessage::StateChanged`.
pub trait PlayerRuntime: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn request_load(&self, events: Sender<Message>);
    fn create(&self, request: PlayerCreateRequest, events: Sender<Message>);
}

/// Session-owned wrapper around an optional backing instance.
///
/// Every control call is guarded: an unbound binding is a silent no-op, a
/// failing backing call is logged and reported only as "not applied", so
/// callers leave their own state untouched.
#[derive(Debug, Default)]
pub struct PlayerBinding {
    handle: Option<Arc<dyn PlayerHandle>>,
}

impl PlayerBinding {
    pub fn unbound() -> PlayerBinding {
        PlayerBinding { handle: None }
    }

    pub fn bind(&mut self, handle: Arc<dyn PlayerHandle>) {
        self.handle = Some(handle);
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    pub fn position_seconds(&self) -> Option<f64> {
        self.read("position_seconds", |handle| handle.position_seconds())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.read("duration_seconds", |handle| handle.duration_seconds())
    }

    pub fn playback_state(&self) -> Option<PlaybackState> {
        self.read("playback_state", |handle| handle.playback_state())
    }

    pub fn play(&self) -> bool {
        self.apply("play", |handle| handle.play())
    }

    pub fn pause(&self) -> bool {
        self.apply("pause", |handle| handle.pause())
    }

    pub fn seek(&self, seconds: f64) -> bool {
        self.apply("seek", |handle| handle.seek(seconds))
    }

    pub fn set_volume(&self, percent: f32) -> bool {
        self.apply("set_volume", |handle| handle.set_volume(percent))
    }

    fn read<T>(
        &self,
        call: &str,
        operation: impl FnOnce(&Arc<dyn PlayerHandle>) -> Result<T, PlayerCallError>,
    ) -> Option<T> {
        let handle = self.handle.as_ref()?;
        match operation(handle) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!("PlayerBinding: {} failed: {}", call, error);
                None
            }
        }
    }

    fn apply(
        &self,
        call: &str,
        operation: impl FnOnce(&Arc<dyn PlayerHandle>) -> Result<(), PlayerCallError>,
    ) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            return false;
        };
        match operation(handle) {
            Ok(()) => true,
            Err(error) => {
                warn!("PlayerBinding: {} failed: {}", call, error);
                false
            }
        }
    }
}
