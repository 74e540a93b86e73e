//! The mounted widget: controller, view state, audio graph and visualiser
//! wired to one media element.

use serde::{Deserialize, Serialize};

use crate::{
    analysis::AnalyserSettings,
    audio::{AudioGraphManager, AudioPlatform},
    config::AppConfig,
    input::{Key, KeyboardHub, Shortcut},
    media::MediaElement,
    playback::{PlaybackController, PlaybackState},
    playlist::Playlist,
    render::{Canvas, FrameOutcome, VisualizationRenderer},
    timeline::{Scheduler, TaskKind},
    view::{ViewState, ViewStateCoordinator},
    Result,
};

/// Everything a user can do to the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    TogglePlay,
    Next,
    Previous,
    CyclePlayMode,
    Seek { seconds: f64 },
    SetVolume { volume: f32 },
    SelectTrack { index: usize },
    ToggleExpanded,
    OpenFullscreen,
    CloseFullscreen,
    Shake,
    KeyDown { code: String },
}

/// Combined view of the widget for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub playback: PlaybackState,
    pub view: ViewState,
    pub title: String,
    pub artist: String,
    pub visualizing: bool,
}

/// The music widget, mounted on a media element.
pub struct MusicPlayer<M: MediaElement, C: Canvas> {
    config: AppConfig,
    controller: PlaybackController<M>,
    view: ViewStateCoordinator,
    graphs: AudioGraphManager,
    platform: Box<dyn AudioPlatform>,
    renderer: Option<VisualizationRenderer>,
    canvas: C,
    scheduler: Scheduler,
    keyboard: KeyboardHub,
    mounted: bool,
}

impl<M: MediaElement, C: Canvas> MusicPlayer<M, C> {
    pub fn mount(
        config: AppConfig,
        playlist: Playlist,
        media: M,
        platform: Box<dyn AudioPlatform>,
        canvas: C,
    ) -> Self {
        let controller = PlaybackController::new(playlist, media, &config.player);
        let view = ViewStateCoordinator::new(&config.view);
        let graphs = AudioGraphManager::new(AnalyserSettings::from(&config.visualizer));
        tracing::info!(songs = controller.playlist().len(), "player mounted");

        Self {
            config,
            controller,
            view,
            graphs,
            platform,
            renderer: None,
            canvas,
            scheduler: Scheduler::new(),
            keyboard: KeyboardHub::new(),
            mounted: true,
        }
    }

    pub fn controller(&self) -> &PlaybackController<M> {
        &self.controller
    }

    /// Gives access to the controller for hosts that drive it directly.
    pub fn controller_mut(&mut self) -> &mut PlaybackController<M> {
        &mut self.controller
    }

    pub fn view(&self) -> ViewState {
        self.view.state()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn keyboard(&self) -> &KeyboardHub {
        &self.keyboard
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn graphs(&self) -> &AudioGraphManager {
        &self.graphs
    }

    pub fn is_visualizing(&self) -> bool {
        self.renderer.as_ref().is_some_and(VisualizationRenderer::is_running)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let song = self.controller.current_song();
        PlayerSnapshot {
            playback: self.controller.state().clone(),
            view: self.view.state(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            visualizing: self.is_visualizing(),
        }
    }

    /// Applies a user action. Only invalid input is returned as an error;
    /// playback and graph failures are absorbed and logged.
    pub async fn dispatch(&mut self, action: UserAction) -> Result<()> {
        if !self.mounted {
            tracing::debug!(?action, "ignoring action after unmount");
            return Ok(());
        }
        self.platform.notify_user_gesture();

        match action {
            UserAction::TogglePlay => {
                self.controller.toggle_play().await;
            }
            UserAction::Next => {
                self.controller.play_next();
            }
            UserAction::Previous => {
                self.controller.play_prev();
            }
            UserAction::CyclePlayMode => {
                self.controller.cycle_play_mode();
            }
            UserAction::Seek { seconds } => {
                self.controller.seek(seconds);
            }
            UserAction::SetVolume { volume } => {
                self.controller.set_volume(volume);
            }
            UserAction::SelectTrack { index } => self.controller.select_track(index).await?,
            UserAction::ToggleExpanded => {
                self.view.toggle_expanded();
            }
            UserAction::OpenFullscreen => self.open_fullscreen(),
            UserAction::CloseFullscreen => self.close_fullscreen(),
            UserAction::Shake => self.view.trigger_shake(&self.scheduler),
            UserAction::KeyDown { code } => {
                self.key_down(&Key::from_code(&code)).await;
            }
        }
        Ok(())
    }

    /// Routes a global key press. Returns `true` when the host should
    /// suppress the key's default action.
    pub async fn key_down(&mut self, key: &Key) -> bool {
        if !self.view.shortcuts_enabled() {
            return false;
        }
        let Some(shortcut) = Shortcut::for_key(key) else {
            return false;
        };

        let step = self.controller.volume_step();
        match shortcut {
            Shortcut::TogglePlay => {
                self.controller.toggle_play().await;
            }
            Shortcut::Previous => {
                self.controller.play_prev();
            }
            Shortcut::Next => {
                self.controller.play_next();
            }
            Shortcut::VolumeUp => {
                self.controller.adjust_volume(step);
            }
            Shortcut::VolumeDown => {
                self.controller.adjust_volume(-step);
            }
        }
        shortcut.prevents_default()
    }

    /// Handles queued media events, then every task due at `now_ms`.
    pub async fn tick(&mut self, now_ms: f64) {
        if !self.mounted {
            return;
        }
        self.controller.pump_events().await;

        for fired in self.scheduler.advance_to(now_ms) {
            match fired.kind {
                TaskKind::Timeout => {
                    self.view.on_timer(&fired);
                }
                TaskKind::AnimationFrame => {
                    let Some(renderer) = self.renderer.as_mut() else {
                        continue;
                    };
                    let outcome = renderer.on_frame(&fired, &mut self.canvas, &self.scheduler);
                    if outcome == FrameOutcome::Stopped {
                        self.renderer = None;
                    }
                }
            }
        }
    }

    /// Tears everything down: listeners, timers, frames, the element and,
    /// once, the audio graph.
    pub async fn unmount(&mut self) {
        if !std::mem::replace(&mut self.mounted, false) {
            return;
        }
        self.view.unmount();
        if let Some(mut renderer) = self.renderer.take() {
            renderer.stop();
        }
        self.controller.teardown().await;
        self.graphs.cleanup();
        tracing::info!("player unmounted");
    }

    fn open_fullscreen(&mut self) {
        if !self.view.open_fullscreen(&self.keyboard) {
            return;
        }

        let element = self.controller.media().id();
        match self.graphs.initialize(element, self.platform.as_mut()) {
            Ok(graph) => {
                self.renderer = Some(VisualizationRenderer::start(
                    graph,
                    &self.config.visualizer,
                    &self.scheduler,
                ));
            }
            Err(err) => {
                tracing::warn!(error = %err, "visualisation disabled");
            }
        }
    }

    fn close_fullscreen(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.stop();
        }
        self.view.close_fullscreen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        media::{sim::SimulatedMedia, sim::SimulatedPlatform, MediaElementId},
        record::RecordingCanvas,
    };

    type TestPlayer = MusicPlayer<SimulatedMedia, RecordingCanvas>;

    fn mount_with(platform: SimulatedPlatform, media: SimulatedMedia) -> TestPlayer {
        let mut platform = platform;
        platform.attach(&media);
        MusicPlayer::mount(
            AppConfig::default(),
            Playlist::catalog(),
            media,
            Box::new(platform),
            RecordingCanvas::new(400.0, 200.0),
        )
    }

    async fn mounted() -> (TestPlayer, SimulatedMedia) {
        let media = SimulatedMedia::new(MediaElementId(1));
        let platform = SimulatedPlatform::new().with_gesture_policy(true);
        let mut player = mount_with(platform, media.clone());
        media.advance(0.0);
        player.tick(0.0).await;
        (player, media)
    }

    fn key(code: &str) -> UserAction {
        UserAction::KeyDown { code: code.into() }
    }

    #[tokio::test]
    async fn shortcuts_need_fullscreen() {
        let (mut player, _media) = mounted().await;

        player.dispatch(key("ArrowRight")).await.unwrap();
        assert_eq!(player.controller().state().current_index, 0);
        assert!(!player.key_down(&Key::Space).await);

        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        player.dispatch(key("ArrowRight")).await.unwrap();
        assert_eq!(player.controller().state().current_index, 1);
        player.dispatch(key("ArrowLeft")).await.unwrap();
        player.dispatch(key("ArrowLeft")).await.unwrap();
        assert_eq!(player.controller().state().current_index, 7);

        player.dispatch(UserAction::CloseFullscreen).await.unwrap();
        player.dispatch(key("ArrowRight")).await.unwrap();
        assert_eq!(player.controller().state().current_index, 7);
    }

    #[tokio::test]
    async fn volume_keys_step_and_clamp() {
        let (mut player, _media) = mounted().await;
        player.dispatch(UserAction::OpenFullscreen).await.unwrap();

        player.dispatch(key("ArrowDown")).await.unwrap();
        player.dispatch(key("ArrowDown")).await.unwrap();
        assert_eq!(player.controller().state().volume, 0.0);

        for _ in 0..15 {
            player.dispatch(key("ArrowUp")).await.unwrap();
        }
        assert_eq!(player.controller().state().volume, 1.0);
    }

    #[tokio::test]
    async fn space_toggles_and_suppresses_default() {
        let (mut player, media) = mounted().await;
        player.dispatch(UserAction::OpenFullscreen).await.unwrap();

        assert!(player.key_down(&Key::Space).await);
        assert!(media.is_playing());
        assert!(player.key_down(&Key::Space).await);
        assert!(!media.is_playing());
        assert!(!player.key_down(&Key::ArrowRight).await);
    }

    #[tokio::test]
    async fn fullscreen_round_trip_keeps_one_listener() {
        let (mut player, _media) = mounted().await;

        for _ in 0..3 {
            player.dispatch(UserAction::OpenFullscreen).await.unwrap();
            player.dispatch(UserAction::OpenFullscreen).await.unwrap();
            assert_eq!(player.keyboard().listener_count(), 1);
            player.dispatch(UserAction::CloseFullscreen).await.unwrap();
            assert_eq!(player.keyboard().listener_count(), 0);
            assert!(!player.view().is_expanded);
        }
    }

    #[tokio::test]
    async fn fullscreen_starts_visualisation_once() {
        let (mut player, media) = mounted().await;

        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        assert!(player.is_visualizing());
        player.dispatch(UserAction::TogglePlay).await.unwrap();

        for step in 1..=10 {
            media.advance(0.016);
            player.tick(step as f64 * 16.0).await;
        }
        let frames = player.canvas().frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.last().unwrap().bars.iter().any(|bar| bar.rect.height > 0.0));

        player.dispatch(UserAction::CloseFullscreen).await.unwrap();
        assert!(!player.is_visualizing());
        assert_eq!(player.scheduler().pending_count(), 0);

        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        assert!(player.is_visualizing());
        assert!(player.graphs().is_initialized());
        assert!(player.controller().state().is_playing);
    }

    #[tokio::test]
    async fn unsupported_platform_keeps_playback_working() {
        let media = SimulatedMedia::new(MediaElementId(1));
        let mut player = mount_with(SimulatedPlatform::unsupported(), media.clone());
        media.advance(0.0);
        player.tick(0.0).await;

        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        assert!(!player.is_visualizing());
        assert!(player.view().is_fully_expanded);

        player.dispatch(key("Space")).await.unwrap();
        assert!(player.controller().state().is_playing);
    }

    #[tokio::test]
    async fn shake_is_independent_of_playback() {
        let (mut player, _media) = mounted().await;
        player.dispatch(UserAction::Shake).await.unwrap();
        assert!(player.view().is_shaking);

        player.tick(150.0).await;
        player.dispatch(UserAction::Shake).await.unwrap();
        player.tick(400.0).await;
        assert!(player.view().is_shaking);
        player.tick(450.0).await;
        assert!(!player.view().is_shaking);
        assert!(!player.controller().state().is_playing);
    }

    #[tokio::test]
    async fn select_track_reports_bad_indices() {
        let (mut player, _media) = mounted().await;
        assert!(player
            .dispatch(UserAction::SelectTrack { index: 99 })
            .await
            .is_err());
        player
            .dispatch(UserAction::SelectTrack { index: 4 })
            .await
            .unwrap();
        assert_eq!(player.snapshot().title, "I Really Want to Stay at Your House");
    }

    #[tokio::test]
    async fn unmount_releases_every_subscription() {
        let media = SimulatedMedia::new(MediaElementId(1));
        let mut player = mount_with(SimulatedPlatform::new(), media.clone());
        media.advance(0.0);
        player.tick(0.0).await;

        player.dispatch(UserAction::TogglePlay).await.unwrap();
        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        player.dispatch(UserAction::Shake).await.unwrap();
        let graph = player.graphs().graph().cloned().unwrap();
        assert_eq!(player.scheduler().pending_count(), 2);

        player.unmount().await;
        player.unmount().await;

        assert_eq!(player.scheduler().pending_count(), 0);
        assert_eq!(player.keyboard().listener_count(), 0);
        assert!(graph.is_closed());
        assert!(!media.is_playing());
        assert!(!player.is_mounted());

        player.dispatch(UserAction::TogglePlay).await.unwrap();
        assert!(!media.is_playing());
    }

    #[tokio::test]
    async fn dropping_a_fullscreen_player_releases_the_graph() {
        let media = SimulatedMedia::new(MediaElementId(1));
        let platform = SimulatedPlatform::new();
        let log = platform.clone();
        let mut player = mount_with(platform, media.clone());
        media.advance(0.0);
        player.tick(0.0).await;

        player.dispatch(UserAction::OpenFullscreen).await.unwrap();
        let graph = player.graphs().graph().cloned().unwrap();
        let scheduler = player.scheduler().clone();
        let keyboard = player.keyboard().clone();
        assert_eq!(log.contexts_created(), 1);

        drop(player);
        assert!(graph.is_closed());
        assert!(log.all_contexts_closed());
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(keyboard.listener_count(), 0);
    }

    #[test]
    fn actions_deserialize_from_json() {
        let actions: Vec<UserAction> = serde_json::from_str(
            r#"[
                { "action": "toggle_play" },
                { "action": "seek", "seconds": 12.5 },
                { "action": "key_down", "code": "ArrowUp" }
            ]"#,
        )
        .unwrap();

        assert_eq!(actions[0], UserAction::TogglePlay);
        assert_eq!(actions[1], UserAction::Seek { seconds: 12.5 });
        assert_eq!(actions[2], UserAction::KeyDown { code: "ArrowUp".into() });
    }
}
