//! Core library for the music widget.
//!
//! The crate owns the widget's playback state machine and its audio
//! visualisation pipeline. Each module covers one subsystem (transport,
//! audio graph, analysis, rendering, view state, scheduling) and talks to the
//! host only through the traits in [`media`], [`audio`] and [`render`], so
//! the same code runs against a real platform or the simulated one in
//! [`media::sim`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod input;
pub mod media;
pub mod playback;
pub mod player;
pub mod playlist;
pub mod record;
pub mod render;
pub mod timeline;
pub mod view;

pub use analysis::{Analyser, AnalyserSettings};
pub use audio::{AudioContext, AudioGraphHandle, AudioGraphManager, AudioPlatform, SourceNode};
pub use config::{AppConfig, PlayerConfig, ViewConfig, VisualizerConfig};
pub use error::{PlayerError, Result};
pub use input::{Key, KeyListenerGuard, KeyboardHub, Shortcut};
pub use media::{MediaElement, MediaElementId, MediaEvent};
pub use playback::{format_time, PlayMode, PlaybackController, PlaybackState};
pub use player::{MusicPlayer, PlayerSnapshot, UserAction};
pub use playlist::{Playlist, Song};
pub use record::{RecordedFrame, RecordingCanvas};
pub use render::{Canvas, FrameOutcome, Hsla, Rect, VisualizationRenderer};
pub use timeline::{FiredTask, Scheduler, TaskHandle, TaskKind};
pub use view::{ViewState, ViewStateCoordinator};
