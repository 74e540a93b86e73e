//! Playable-media abstraction consumed by the controller.

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod sim;

/// Identity of a media element. The audio graph binds to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaElementId(pub u64);

/// Notifications raised by a media element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaEvent {
    /// Enough data is buffered to start playback.
    CanPlay,
    TimeUpdate,
    MetadataLoaded,
    Ended,
    /// Network or decode failure for the current source.
    Error(String),
}

/// A playable media element provided by the host platform.
///
/// Start and stop are asynchronous and may be refused; every other call is
/// immediate. Events are queued by the element and drained by the owner.
#[allow(async_fn_in_trait)]
pub trait MediaElement {
    fn id(&self) -> MediaElementId;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    /// Replaces the source and starts loading it. Pending events for the
    /// previous source are discarded.
    fn set_source(&mut self, url: &str);

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    /// `None` until metadata has been loaded.
    fn duration(&self) -> Option<f64>;

    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn poll_event(&mut self) -> Option<MediaEvent>;
}
