use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    render::{Canvas, Hsla, Rect},
    Result,
};

/// One filled bar as drawn on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBar {
    pub rect: Rect,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub index: usize,
    pub bars: Vec<RecordedBar>,
}

/// Canvas that keeps the draw commands of every presented frame.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    width: f32,
    height: f32,
    current: Vec<RecordedBar>,
    frames: Vec<RecordedFrame>,
    presented: usize,
    max_frames: Option<usize>,
}

impl RecordingCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Keeps only the most recent `max_frames` frames. A limit of zero keeps
    /// none; frames are still counted.
    pub fn with_capacity_limit(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Number of frames presented so far, including any no longer kept.
    pub fn frame_count(&self) -> usize {
        self.presented
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.frames)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn clear(&mut self) {
        self.current.clear();
    }

    fn fill_rect(&mut self, rect: Rect, color: Hsla) {
        self.current.push(RecordedBar {
            rect,
            color: color.to_string(),
        });
    }

    fn present(&mut self) {
        let index = self.presented;
        self.presented += 1;
        self.frames.push(RecordedFrame {
            index,
            bars: std::mem::take(&mut self.current),
        });
        if let Some(max) = self.max_frames {
            if self.frames.len() > max {
                let overflow = self.frames.len() - max;
                self.frames.drain(0..overflow);
            }
        }
    }
}
