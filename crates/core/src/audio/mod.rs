use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    analysis::{Analyser, AnalyserSettings},
    media::MediaElementId,
    PlayerError, Result,
};

/// Capability probe for the host's audio-analysis support.
pub trait AudioPlatform {
    /// Opens an audio context. `Ok(None)` means the host has no analysis
    /// capability at all; an error means it exists but refused right now
    /// (for example before the first user gesture).
    fn create_context(&mut self) -> Result<Option<Box<dyn AudioContext>>>;

    /// Called for every user interaction so autoplay policies can unlock.
    fn notify_user_gesture(&mut self) {}
}

/// A live audio-processing context.
pub trait AudioContext {
    fn sample_rate(&self) -> u32;

    /// Routes the element's audio through this context. Binding the same
    /// element twice is a platform error.
    fn create_media_source(&mut self, element: MediaElementId) -> Result<Box<dyn SourceNode>>;

    fn close(&mut self);
}

/// The element's audio as seen from inside the context.
pub trait SourceNode {
    /// Fills `out` with the most recent time-domain samples.
    fn read_time_domain(&mut self, out: &mut [f32]);

    /// Sends the audio on to the speakers as well as to the analyser.
    fn connect_to_output(&mut self);

    fn disconnect(&mut self);
}

/// Context, bound source and analyser for one media element.
pub struct AudioGraph {
    element: MediaElementId,
    context: Box<dyn AudioContext>,
    source: Box<dyn SourceNode>,
    analyser: Analyser,
    window: Vec<f32>,
    closed: bool,
}

impl AudioGraph {
    fn frequency_snapshot(&mut self) -> Option<Vec<u8>> {
        if self.closed {
            return None;
        }

        self.source.read_time_domain(&mut self.window);
        match self.analyser.byte_frequency_data(&self.window) {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                tracing::warn!(error = %err, "frequency analysis failed");
                None
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.source.disconnect();
        self.context.close();
        self.closed = true;
        tracing::info!(element = self.element.0, "audio graph closed");
    }
}

impl fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraph")
            .field("element", &self.element)
            .field("sample_rate", &self.context.sample_rate())
            .field("analyser", &self.analyser)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Shared view over the session's audio graph. Clones refer to the same
/// graph; handing one to a component does not create a new binding.
#[derive(Clone)]
pub struct AudioGraphHandle {
    shared: Rc<RefCell<AudioGraph>>,
}

impl AudioGraphHandle {
    pub fn element(&self) -> MediaElementId {
        self.shared.borrow().element
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.shared.borrow().analyser.frequency_bin_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.borrow().context.sample_rate()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.borrow().closed
    }

    /// Current per-bin magnitudes, or `None` once the graph is closed.
    pub fn frequency_snapshot(&self) -> Option<Vec<u8>> {
        self.shared.borrow_mut().frequency_snapshot()
    }

    pub fn same_graph(&self, other: &AudioGraphHandle) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for AudioGraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraphHandle").finish()
    }
}

/// Owner of the session-wide audio graph.
///
/// The graph is built on first demand and reused by every later caller. It is
/// torn down by [`AudioGraphManager::cleanup`] or when the manager is dropped.
#[derive(Debug)]
pub struct AudioGraphManager {
    settings: AnalyserSettings,
    graph: Option<AudioGraphHandle>,
}

impl AudioGraphManager {
    pub fn new(settings: AnalyserSettings) -> Self {
        Self {
            settings,
            graph: None,
        }
    }

    /// Returns the existing graph, or builds context, source and analyser
    /// for `element`.
    ///
    /// Nothing is bound when this fails, so it may be retried later, for
    /// instance after a user gesture.
    pub fn initialize(
        &mut self,
        element: MediaElementId,
        platform: &mut dyn AudioPlatform,
    ) -> Result<AudioGraphHandle> {
        if let Some(graph) = &self.graph {
            let bound = graph.element();
            if bound == element {
                return Ok(graph.clone());
            }
            return Err(PlayerError::GraphInitFailed(format!(
                "graph already bound to element {}, refusing element {}",
                bound.0, element.0
            )));
        }

        let analyser = Analyser::new(self.settings).map_err(into_graph_error)?;
        let mut context = platform
            .create_context()
            .map_err(into_graph_error)?
            .ok_or_else(|| {
                PlayerError::GraphInitFailed("host has no audio analysis capability".into())
            })?;

        let mut source = match context.create_media_source(element) {
            Ok(source) => source,
            Err(err) => {
                context.close();
                return Err(into_graph_error(err));
            }
        };
        source.connect_to_output();

        let window = vec![0.0; analyser.fft_size()];
        let graph = AudioGraphHandle {
            shared: Rc::new(RefCell::new(AudioGraph {
                element,
                context,
                source,
                analyser,
                window,
                closed: false,
            })),
        };
        tracing::info!(
            element = element.0,
            bins = graph.frequency_bin_count(),
            sample_rate = graph.sample_rate(),
            "audio graph initialised"
        );

        self.graph = Some(graph.clone());
        Ok(graph)
    }

    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        self.graph.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    pub fn frequency_snapshot(&self) -> Option<Vec<u8>> {
        self.graph.as_ref().and_then(AudioGraphHandle::frequency_snapshot)
    }

    /// Disconnects the source and closes the context. Outstanding handles
    /// observe the graph as closed.
    pub fn cleanup(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.shared.borrow_mut().close();
        }
    }
}

impl Drop for AudioGraphManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn into_graph_error(err: PlayerError) -> PlayerError {
    match err {
        PlayerError::GraphInitFailed(_) => err,
        other => PlayerError::GraphInitFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::sim::{SimulatedMedia, SimulatedPlatform};
    use crate::media::MediaElement;

    fn setup() -> (SimulatedMedia, SimulatedPlatform) {
        let media = SimulatedMedia::new(MediaElementId(1));
        let mut platform = SimulatedPlatform::new();
        platform.attach(&media);
        platform.notify_user_gesture();
        (media, platform)
    }

    #[test]
    fn initialise_is_idempotent() {
        let (media, mut platform) = setup();
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());

        let first = manager.initialize(media.id(), &mut platform).unwrap();
        let second = manager.initialize(media.id(), &mut platform).unwrap();

        assert!(first.same_graph(&second));
        assert_eq!(platform.contexts_created(), 1);
        assert_eq!(platform.bind_count(media.id()), 1);
        assert_eq!(first.frequency_bin_count(), 128);
    }

    #[test]
    fn refuses_a_second_element() {
        let (media, mut platform) = setup();
        let other = SimulatedMedia::new(MediaElementId(2));
        platform.attach(&other);
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());

        manager.initialize(media.id(), &mut platform).unwrap();
        let err = manager.initialize(other.id(), &mut platform).unwrap_err();

        assert!(matches!(err, PlayerError::GraphInitFailed(_)));
        assert_eq!(platform.bind_count(other.id()), 0);
    }

    #[test]
    fn waits_for_user_gesture() {
        let media = SimulatedMedia::new(MediaElementId(1));
        let mut platform = SimulatedPlatform::new().with_gesture_policy(true);
        platform.attach(&media);
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());

        let err = manager.initialize(media.id(), &mut platform).unwrap_err();
        assert!(matches!(err, PlayerError::GraphInitFailed(_)));
        assert!(manager.frequency_snapshot().is_none());
        assert_eq!(platform.bind_count(media.id()), 0);

        platform.notify_user_gesture();
        assert!(manager.initialize(media.id(), &mut platform).is_ok());
        assert_eq!(platform.bind_count(media.id()), 1);
    }

    #[test]
    fn unsupported_platform_degrades() {
        let media = SimulatedMedia::new(MediaElementId(1));
        let mut platform = SimulatedPlatform::unsupported();
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());

        let err = manager.initialize(media.id(), &mut platform).unwrap_err();
        assert!(format!("{err}").contains("capability"));
        assert!(!manager.is_initialized());
    }

    #[tokio::test]
    async fn snapshot_reflects_playback_and_cleanup() {
        let (mut media, mut platform) = setup();
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());
        let graph = manager.initialize(media.id(), &mut platform).unwrap();

        let silent = manager.frequency_snapshot().unwrap();
        assert_eq!(silent.len(), 128);
        assert!(silent.iter().all(|b| *b == 0));

        media.set_source("/music/song1.mp3");
        media.advance(0.0);
        media.play().await.unwrap();
        media.advance(0.1);
        let playing = manager.frequency_snapshot().unwrap();
        assert!(playing.iter().any(|b| *b > 0));

        manager.cleanup();
        manager.cleanup();
        assert!(graph.is_closed());
        assert!(graph.frequency_snapshot().is_none());
        assert!(manager.frequency_snapshot().is_none());
        assert!(platform.all_contexts_closed());
    }

    #[test]
    fn dropping_the_manager_closes_the_graph() {
        let (media, mut platform) = setup();
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());
        let graph = manager.initialize(media.id(), &mut platform).unwrap();

        drop(manager);
        assert!(graph.is_closed());
        assert!(graph.frequency_snapshot().is_none());
        assert!(platform.all_contexts_closed());
    }
}
