use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::PlayerConfig,
    media::{MediaElement, MediaEvent},
    playlist::{Playlist, Song},
    PlayerError, Result,
};

/// Policy for choosing the next track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    #[default]
    Sequential,
    Random,
    Single,
}

impl PlayMode {
    /// Sequential → random → single → sequential.
    pub fn cycle(self) -> Self {
        match self {
            PlayMode::Sequential => PlayMode::Random,
            PlayMode::Random => PlayMode::Single,
            PlayMode::Single => PlayMode::Sequential,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayMode::Sequential => "Sequential",
            PlayMode::Random => "Shuffle",
            PlayMode::Single => "Repeat one",
        }
    }

    /// Index that follows `current` in a playlist of `len` songs.
    ///
    /// Random mode draws uniformly from every index except `current`.
    pub fn next_index<R: Rng + ?Sized>(self, current: usize, len: usize, rng: &mut R) -> usize {
        if len == 0 {
            return 0;
        }
        match self {
            PlayMode::Sequential => (current + 1) % len,
            PlayMode::Random if len > 1 => {
                let pick = rng.gen_range(0..len - 1);
                if pick >= current {
                    pick + 1
                } else {
                    pick
                }
            }
            PlayMode::Random | PlayMode::Single => current,
        }
    }

    /// Index before `current`. Always sequential, whatever the mode.
    pub fn prev_index(current: usize, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (current + len - 1) % len
    }
}

/// Snapshot of the transport, suitable for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_playing: bool,
    pub volume: f32,
    pub current_time: f64,
    /// Zero while unknown.
    pub duration: f64,
    pub play_mode: PlayMode,
    pub is_loading: bool,
}

impl PlaybackState {
    /// Position as a fraction of the duration, 0 while the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Formats seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Owns the playlist and transport state and drives the media element.
///
/// Start and stop requests are awaited here and never escape: a refusal
/// rolls `is_playing` back to `false` and is kept in [`last_error`].
///
/// [`last_error`]: PlaybackController::last_error
pub struct PlaybackController<M: MediaElement> {
    playlist: Playlist,
    media: M,
    state: PlaybackState,
    /// Whether the track being loaded should start once it can play.
    resume_when_ready: bool,
    last_error: Option<PlayerError>,
    volume_step: f32,
    rng: StdRng,
}

impl<M: MediaElement> PlaybackController<M> {
    /// Mounts the controller on `media` and starts loading the first song.
    pub fn new(playlist: Playlist, media: M, config: &PlayerConfig) -> Self {
        let mut controller = Self {
            playlist,
            media,
            state: PlaybackState {
                current_index: 0,
                is_playing: false,
                volume: clamp_volume(config.initial_volume).unwrap_or(0.0),
                current_time: 0.0,
                duration: 0.0,
                play_mode: PlayMode::default(),
                is_loading: true,
            },
            resume_when_ready: false,
            last_error: None,
            volume_step: config.volume_step,
            rng: StdRng::from_entropy(),
        };
        controller.load_current();
        controller
    }

    /// Replaces the random source, mostly for reproducible shuffles.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn current_song(&self) -> &Song {
        &self.playlist.songs()[self.state.current_index]
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn last_error(&self) -> Option<&PlayerError> {
        self.last_error.as_ref()
    }

    pub fn volume_step(&self) -> f32 {
        self.volume_step
    }

    /// Starts or stops the element and returns the resulting `is_playing`.
    pub async fn toggle_play(&mut self) -> bool {
        if self.state.is_playing {
            self.resume_when_ready = false;
            match self.media.pause().await {
                Ok(()) => {
                    self.state.is_playing = false;
                    tracing::debug!(index = self.state.current_index, "paused");
                }
                Err(err) => self.report_failure(err),
            }
        } else {
            self.start().await;
        }
        self.state.is_playing
    }

    /// Moves to the next track according to the play mode.
    pub fn play_next(&mut self) -> usize {
        let next = self.state.play_mode.next_index(
            self.state.current_index,
            self.playlist.len(),
            &mut self.rng,
        );
        self.change_track(next);
        next
    }

    /// Moves to the previous track. Ignores the play mode.
    pub fn play_prev(&mut self) -> usize {
        let prev = PlayMode::prev_index(self.state.current_index, self.playlist.len());
        self.change_track(prev);
        prev
    }

    /// Selects a playlist entry and asks for it to play.
    pub async fn select_track(&mut self, index: usize) -> Result<()> {
        if index >= self.playlist.len() {
            return Err(PlayerError::InvalidInput("track index out of range"));
        }

        if index == self.state.current_index {
            if !self.state.is_playing {
                self.start().await;
            }
            return Ok(());
        }

        self.state.is_playing = true;
        self.change_track(index);
        Ok(())
    }

    /// Advances the play mode without touching the transport.
    pub fn cycle_play_mode(&mut self) -> PlayMode {
        self.state.play_mode = self.state.play_mode.cycle();
        tracing::info!(mode = self.state.play_mode.label(), "play mode changed");
        self.state.play_mode
    }

    /// Seeks within the current track; the target is clamped to the duration.
    pub fn seek(&mut self, seconds: f64) -> f64 {
        let target = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.state.duration)
        };
        self.media.set_current_time(target);
        self.state.current_time = target;
        target
    }

    /// Stores and applies a volume clamped into `[0, 1]`. NaN is ignored.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if let Some(volume) = clamp_volume(volume) {
            self.state.volume = volume;
            self.media.set_volume(volume);
        }
        self.state.volume
    }

    pub fn adjust_volume(&mut self, delta: f32) -> f32 {
        self.set_volume(self.state.volume + delta)
    }

    /// Drains and handles every queued media event.
    pub async fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.media.poll_event() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::CanPlay => {
                self.state.is_loading = false;
                if std::mem::take(&mut self.resume_when_ready) && self.state.is_playing {
                    if let Err(err) = self.media.play().await {
                        self.report_failure(err);
                    }
                }
            }
            MediaEvent::MetadataLoaded => {
                self.state.duration = self
                    .media
                    .duration()
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .unwrap_or(0.0);
                self.sync_time();
            }
            MediaEvent::TimeUpdate => self.sync_time(),
            MediaEvent::Ended => {
                tracing::debug!(index = self.state.current_index, "track ended");
                self.play_next();
            }
            MediaEvent::Error(reason) => {
                let err = PlayerError::LoadError {
                    source_url: self.current_song().source_url.clone(),
                    reason,
                };
                tracing::error!(error = %err, "media element error");
                self.state.is_loading = false;
                self.state.is_playing = false;
                self.resume_when_ready = false;
                self.last_error = Some(err);
            }
        }
    }

    /// Stops the element on unmount.
    pub async fn teardown(&mut self) {
        self.resume_when_ready = false;
        if let Err(err) = self.media.pause().await {
            tracing::warn!(error = %err, "pause on teardown failed");
        }
        self.state.is_playing = false;
    }

    async fn start(&mut self) {
        match self.media.play().await {
            Ok(()) => {
                self.state.is_playing = true;
                self.last_error = None;
                tracing::debug!(index = self.state.current_index, "playing");
            }
            Err(err) => self.report_failure(err),
        }
    }

    fn change_track(&mut self, index: usize) {
        self.state.current_index = index;
        self.resume_when_ready = self.state.is_playing;
        self.load_current();
    }

    fn load_current(&mut self) {
        let song = &self.playlist.songs()[self.state.current_index];
        tracing::info!(
            index = self.state.current_index,
            title = %song.title,
            "loading track"
        );
        self.media.set_source(&song.source_url);
        self.media.set_volume(self.state.volume);
        self.state.is_loading = true;
        self.state.current_time = 0.0;
        self.state.duration = 0.0;
    }

    fn sync_time(&mut self) {
        let time = self.media.current_time().max(0.0);
        self.state.current_time = if self.state.duration > 0.0 {
            time.min(self.state.duration)
        } else {
            time
        };
    }

    fn report_failure(&mut self, err: PlayerError) {
        tracing::warn!(error = %err, index = self.state.current_index, "playback request failed");
        self.state.is_playing = false;
        self.resume_when_ready = false;
        self.last_error = Some(err);
    }
}

fn clamp_volume(volume: f32) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(0.0, 1.0))
    }
}
