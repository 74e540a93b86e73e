use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    audio::AudioGraphHandle,
    config::VisualizerConfig,
    timeline::{FiredTask, Scheduler, TaskHandle},
};

/// Share of the canvas height a full-scale bin reaches.
const BAR_HEIGHT_RATIO: f32 = 0.8;
/// Bars are wider than `width / bins`, so the spectrum overflows the canvas.
const BAR_WIDTH_FACTOR: f32 = 2.5;
const BAR_GAP: f32 = 2.0;
/// Milliseconds per degree of hue drift.
const HUE_DRIFT_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsla {
    /// Degrees in `[0, 360)`.
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub alpha: f32,
}

impl fmt::Display for Hsla {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsla({:.1}, {}%, {}%, {})",
            self.hue, self.saturation, self.lightness, self.alpha
        )
    }
}

/// 2D drawing surface the spectrum is painted on.
pub trait Canvas {
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    fn clear(&mut self);
    fn fill_rect(&mut self, rect: Rect, color: Hsla);
    /// Marks the end of a frame.
    fn present(&mut self) {}
}

/// Lays out one bar per bin for a canvas of `width` × `height`.
///
/// `clock_ms` is the host's wall-clock time in milliseconds; it only drives
/// the hue drift.
pub fn spectrum_bars(snapshot: &[u8], width: f32, height: f32, clock_ms: f64) -> Vec<(Rect, Hsla)> {
    if snapshot.is_empty() {
        return Vec::new();
    }

    let bins = snapshot.len() as f32;
    let bar_width = width / bins * BAR_WIDTH_FACTOR;
    let drift = ((clock_ms / HUE_DRIFT_MS) % 360.0) as f32;

    snapshot
        .iter()
        .enumerate()
        .map(|(index, magnitude)| {
            let bar_height = f32::from(*magnitude) / 255.0 * height * BAR_HEIGHT_RATIO;
            let rect = Rect {
                x: index as f32 * bar_width,
                y: height - bar_height,
                width: (bar_width - BAR_GAP).max(0.0),
                height: bar_height,
            };
            let color = Hsla {
                hue: (index as f32 / bins * 360.0 + drift).rem_euclid(360.0),
                saturation: 80.0,
                lightness: 60.0,
                alpha: 0.5,
            };
            (rect, color)
        })
        .collect()
}

/// Result of dispatching an animation frame to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not this renderer's frame.
    Ignored,
    /// Too soon after the previous draw; another frame was requested.
    Throttled,
    Drawn,
    /// The analyser is gone; no further frame was requested.
    Stopped,
}

/// Throttled, self-rescheduling spectrum painter.
///
/// Every frame it handles requests the next one, so at most one frame is
/// pending at any time. Dropping or stopping the renderer cancels it.
#[derive(Debug)]
pub struct VisualizationRenderer {
    graph: AudioGraphHandle,
    interval_ms: f64,
    last_draw_ms: Option<f64>,
    pending: Option<TaskHandle>,
}

impl VisualizationRenderer {
    /// Starts the draw loop on `graph`.
    pub fn start(
        graph: AudioGraphHandle,
        config: &VisualizerConfig,
        scheduler: &Scheduler,
    ) -> Self {
        tracing::debug!(interval_ms = config.frame_interval_ms, "visualisation started");
        Self {
            graph,
            interval_ms: config.frame_interval().as_secs_f64() * 1000.0,
            last_draw_ms: None,
            pending: Some(scheduler.request_frame()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    pub fn on_frame(
        &mut self,
        fired: &FiredTask,
        canvas: &mut dyn Canvas,
        scheduler: &Scheduler,
    ) -> FrameOutcome {
        if !self.pending.as_ref().is_some_and(|p| p.matches(fired)) {
            return FrameOutcome::Ignored;
        }
        self.pending = None;

        if let Some(last) = self.last_draw_ms {
            if fired.timestamp_ms - last < self.interval_ms {
                self.pending = Some(scheduler.request_frame());
                return FrameOutcome::Throttled;
            }
        }

        let Some(snapshot) = self.graph.frequency_snapshot() else {
            tracing::debug!("analyser unavailable, visualisation stopped");
            return FrameOutcome::Stopped;
        };
        self.last_draw_ms = Some(fired.timestamp_ms);

        canvas.clear();
        let bars = spectrum_bars(&snapshot, canvas.width(), canvas.height(), fired.timestamp_ms);
        for (rect, color) in bars {
            canvas.fill_rect(rect, color);
        }
        canvas.present();

        self.pending = Some(scheduler.request_frame());
        FrameOutcome::Drawn
    }

    /// Cancels the pending frame.
    pub fn stop(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("visualisation stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyserSettings;
    use crate::audio::{AudioGraphManager, AudioPlatform};
    use crate::media::sim::{SimulatedMedia, SimulatedPlatform};
    use crate::media::{MediaElement, MediaElementId};
    use crate::record::RecordingCanvas;

    fn graph() -> (AudioGraphManager, AudioGraphHandle) {
        let media = SimulatedMedia::new(MediaElementId(3));
        let mut platform = SimulatedPlatform::new();
        platform.attach(&media);
        platform.notify_user_gesture();
        let mut manager = AudioGraphManager::new(AnalyserSettings::default());
        let graph = manager.initialize(media.id(), &mut platform).unwrap();
        (manager, graph)
    }

    #[test]
    fn bar_geometry() {
        let bars = spectrum_bars(&[255, 0, 51, 102], 400.0, 200.0, 0.0);

        assert_eq!(bars.len(), 4);
        let (full, _) = bars[0];
        assert_eq!(full.height, 160.0);
        assert_eq!(full.y, 40.0);
        assert_eq!(full.width, 248.0);
        assert_eq!(bars[1].0.height, 0.0);
        assert_eq!(bars[2].0.x, 500.0);
        assert!((bars[3].0.height - 64.0).abs() < 1e-4);
    }

    #[test]
    fn hue_drifts_with_time() {
        let early = spectrum_bars(&[10, 10], 100.0, 100.0, 0.0);
        let later = spectrum_bars(&[10, 10], 100.0, 100.0, 1_000.0);

        assert_eq!(early[0].1.hue, 0.0);
        assert_eq!(early[1].1.hue, 180.0);
        assert_eq!(later[0].1.hue, 10.0);
        assert_eq!(later[0].1.to_string(), "hsla(10.0, 80%, 60%, 0.5)");

        let wrapped = spectrum_bars(&[10, 10], 100.0, 100.0, 36_500.0);
        assert_eq!(wrapped[0].1.hue, 5.0);
    }

    #[test]
    fn throttles_to_the_frame_interval() {
        let (_manager, graph) = graph();
        let scheduler = Scheduler::new();
        let mut canvas = RecordingCanvas::new(400.0, 200.0);
        let mut renderer =
            VisualizationRenderer::start(graph, &VisualizerConfig::default(), &scheduler);

        let mut outcomes = Vec::new();
        for step in 0..=10 {
            for fired in scheduler.advance_to(step as f64 * 16.0) {
                outcomes.push(renderer.on_frame(&fired, &mut canvas, &scheduler));
            }
        }

        let drawn = outcomes.iter().filter(|o| **o == FrameOutcome::Drawn).count();
        assert_eq!(drawn, 3);
        assert_eq!(canvas.frames().len(), 3);
        assert_eq!(canvas.frames()[0].bars.len(), 128);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn stops_when_the_graph_is_cleaned_up() {
        let (mut manager, graph) = graph();
        let scheduler = Scheduler::new();
        let mut canvas = RecordingCanvas::new(400.0, 200.0);
        let mut renderer =
            VisualizationRenderer::start(graph, &VisualizerConfig::default(), &scheduler);

        let fired = scheduler.advance_to(0.0);
        assert_eq!(renderer.on_frame(&fired[0], &mut canvas, &scheduler), FrameOutcome::Drawn);

        manager.cleanup();
        let fired = scheduler.advance_to(100.0);
        assert_eq!(renderer.on_frame(&fired[0], &mut canvas, &scheduler), FrameOutcome::Stopped);
        assert!(!renderer.is_running());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn stop_cancels_the_pending_frame() {
        let (_manager, graph) = graph();
        let scheduler = Scheduler::new();
        let mut renderer =
            VisualizationRenderer::start(graph, &VisualizerConfig::default(), &scheduler);
        assert_eq!(scheduler.pending_count(), 1);

        renderer.stop();
        assert_eq!(scheduler.pending_count(), 0);
        assert!(scheduler.advance_to(50.0).is_empty());
    }
}
