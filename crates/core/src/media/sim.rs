//! Deterministic stand-ins for the host media element and audio platform.
//!
//! Time only moves when [`SimulatedMedia::advance`] is called, which makes
//! the pair usable from tests and from the command line session runner.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    f32::consts::PI,
    rc::Rc,
};

use crate::{
    audio::{AudioContext, AudioPlatform, SourceNode},
    media::{MediaElement, MediaElementId, MediaEvent},
    PlayerError, Result,
};

const SAMPLE_RATE: u32 = 48_000;
const DEFAULT_DURATION: f64 = 180.0;

#[derive(Debug)]
struct Deck {
    source: Option<String>,
    playing: bool,
    current_time: f64,
    duration: Option<f64>,
    volume: f32,
    pending_load: bool,
    errored: bool,
    events: VecDeque<MediaEvent>,
    durations: HashMap<String, f64>,
    failing_sources: HashSet<String>,
    play_rejection: Option<String>,
    play_calls: usize,
}

impl Default for Deck {
    fn default() -> Self {
        Self {
            source: None,
            playing: false,
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            pending_load: false,
            errored: false,
            events: VecDeque::new(),
            durations: HashMap::new(),
            failing_sources: HashSet::new(),
            play_rejection: None,
            play_calls: 0,
        }
    }
}

impl Deck {
    fn finish_load(&mut self) {
        self.pending_load = false;
        let Some(source) = self.source.clone() else {
            return;
        };

        if self.failing_sources.contains(&source) {
            self.errored = true;
            self.events
                .push_back(MediaEvent::Error(format!("cannot decode `{source}`")));
            return;
        }

        self.duration = Some(
            self.durations
                .get(&source)
                .copied()
                .unwrap_or(DEFAULT_DURATION),
        );
        self.events.push_back(MediaEvent::MetadataLoaded);
        self.events.push_back(MediaEvent::CanPlay);
    }

    /// Base pitch derived from the source name so tracks sound different.
    fn base_frequency(&self) -> f32 {
        let seed = self
            .source
            .as_deref()
            .map(|s| s.bytes().map(u32::from).sum::<u32>())
            .unwrap_or(0);
        110.0 + (seed % 8) as f32 * 55.0
    }
}

/// Simulated media element. Clones share the same element.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    id: MediaElementId,
    deck: Rc<RefCell<Deck>>,
}

impl SimulatedMedia {
    pub fn new(id: MediaElementId) -> Self {
        Self {
            id,
            deck: Rc::new(RefCell::new(Deck::default())),
        }
    }

    /// Sets the duration reported for `url` once it loads.
    pub fn with_duration(self, url: &str, seconds: f64) -> Self {
        self.deck
            .borrow_mut()
            .durations
            .insert(url.to_string(), seconds);
        self
    }

    /// Makes every load of `url` end in an error event.
    pub fn fail_source(&self, url: &str) {
        self.deck
            .borrow_mut()
            .failing_sources
            .insert(url.to_string());
    }

    /// Makes `play` fail with `reason` until cleared with `None`.
    pub fn reject_play(&self, reason: Option<&str>) {
        self.deck.borrow_mut().play_rejection = reason.map(str::to_string);
    }

    pub fn is_playing(&self) -> bool {
        self.deck.borrow().playing
    }

    pub fn source(&self) -> Option<String> {
        self.deck.borrow().source.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.deck.borrow().play_calls
    }

    /// Moves element time forward by `seconds`, finishing any pending load
    /// first and queuing the resulting events.
    pub fn advance(&self, seconds: f64) {
        let mut deck = self.deck.borrow_mut();
        if deck.pending_load {
            deck.finish_load();
        }

        if !deck.playing || seconds <= 0.0 {
            return;
        }

        let end = deck.duration.unwrap_or(f64::INFINITY);
        deck.current_time = (deck.current_time + seconds).min(end);
        deck.events.push_back(MediaEvent::TimeUpdate);
        if deck.current_time >= end {
            deck.playing = false;
            deck.events.push_back(MediaEvent::Ended);
        }
    }
}

impl MediaElement for SimulatedMedia {
    fn id(&self) -> MediaElementId {
        self.id
    }

    async fn play(&mut self) -> Result<()> {
        let mut deck = self.deck.borrow_mut();
        deck.play_calls += 1;

        if let Some(reason) = &deck.play_rejection {
            return Err(PlayerError::PlaybackRejected(reason.clone()));
        }
        if deck.source.is_none() {
            return Err(PlayerError::PlaybackRejected("no source assigned".into()));
        }
        if deck.errored {
            return Err(PlayerError::PlaybackRejected(
                "source is not decodable".into(),
            ));
        }

        deck.playing = true;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.deck.borrow_mut().playing = false;
        Ok(())
    }

    fn set_source(&mut self, url: &str) {
        let mut deck = self.deck.borrow_mut();
        deck.source = Some(url.to_string());
        deck.playing = false;
        deck.current_time = 0.0;
        deck.duration = None;
        deck.errored = false;
        deck.pending_load = true;
        deck.events.clear();
    }

    fn current_time(&self) -> f64 {
        self.deck.borrow().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.deck.borrow_mut().current_time = seconds;
    }

    fn duration(&self) -> Option<f64> {
        self.deck.borrow().duration
    }

    fn volume(&self) -> f32 {
        self.deck.borrow().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.deck.borrow_mut().volume = volume;
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.deck.borrow_mut().events.pop_front()
    }
}

#[derive(Debug, Default)]
struct PlatformLog {
    contexts_created: usize,
    contexts_closed: usize,
    binds: HashMap<MediaElementId, usize>,
}

/// Simulated audio platform with an optional autoplay gesture policy.
///
/// Clones share the record of created contexts and bindings, so a test can
/// keep one to inspect after handing the other to a player.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    supported: bool,
    gesture_required: bool,
    gesture_seen: bool,
    decks: HashMap<MediaElementId, Rc<RefCell<Deck>>>,
    log: Rc<RefCell<PlatformLog>>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            supported: true,
            gesture_required: false,
            gesture_seen: false,
            decks: HashMap::new(),
            log: Rc::new(RefCell::new(PlatformLog::default())),
        }
    }

    /// A host without any audio analysis capability.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn with_gesture_policy(mut self, required: bool) -> Self {
        self.gesture_required = required;
        self
    }

    /// Makes `media` reachable from contexts created by this platform.
    pub fn attach(&mut self, media: &SimulatedMedia) {
        self.decks.insert(media.id, media.deck.clone());
    }

    pub fn contexts_created(&self) -> usize {
        self.log.borrow().contexts_created
    }

    pub fn all_contexts_closed(&self) -> bool {
        let log = self.log.borrow();
        log.contexts_created == log.contexts_closed
    }

    pub fn bind_count(&self, element: MediaElementId) -> usize {
        self.log.borrow().binds.get(&element).copied().unwrap_or(0)
    }
}

impl AudioPlatform for SimulatedPlatform {
    fn create_context(&mut self) -> Result<Option<Box<dyn AudioContext>>> {
        if !self.supported {
            return Ok(None);
        }
        if self.gesture_required && !self.gesture_seen {
            return Err(PlayerError::GraphInitFailed(
                "audio context is blocked until a user gesture".into(),
            ));
        }

        self.log.borrow_mut().contexts_created += 1;
        Ok(Some(Box::new(SimulatedContext {
            decks: self.decks.clone(),
            log: self.log.clone(),
            closed: false,
        })))
    }

    fn notify_user_gesture(&mut self) {
        self.gesture_seen = true;
    }
}

struct SimulatedContext {
    decks: HashMap<MediaElementId, Rc<RefCell<Deck>>>,
    log: Rc<RefCell<PlatformLog>>,
    closed: bool,
}

impl AudioContext for SimulatedContext {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn create_media_source(&mut self, element: MediaElementId) -> Result<Box<dyn SourceNode>> {
        let deck = self.decks.get(&element).cloned().ok_or_else(|| {
            PlayerError::GraphInitFailed(format!("unknown media element {}", element.0))
        })?;

        let mut log = self.log.borrow_mut();
        let binds = log.binds.entry(element).or_insert(0);
        if *binds > 0 {
            return Err(PlayerError::GraphInitFailed(format!(
                "media element {} is already connected to a source node",
                element.0
            )));
        }
        *binds += 1;

        Ok(Box::new(SimulatedSource {
            deck,
            connected: true,
        }))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.borrow_mut().contexts_closed += 1;
        }
    }
}

struct SimulatedSource {
    deck: Rc<RefCell<Deck>>,
    connected: bool,
}

impl SourceNode for SimulatedSource {
    fn read_time_domain(&mut self, out: &mut [f32]) {
        let deck = self.deck.borrow();
        if !self.connected || !deck.playing {
            out.fill(0.0);
            return;
        }

        let base = deck.base_frequency();
        let start = deck.current_time as f32;
        let step = 1.0 / SAMPLE_RATE as f32;
        let gain = deck.volume.max(0.05);
        for (i, sample) in out.iter_mut().enumerate() {
            let t = start + i as f32 * step;
            *sample = gain
                * (0.5 * (2.0 * PI * base * t).sin()
                    + 0.3 * (2.0 * PI * base * 3.0 * t).sin()
                    + 0.2 * (2.0 * PI * base * 7.0 * t).sin());
        }
    }

    fn connect_to_output(&mut self) {
        self.connected = true;
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
