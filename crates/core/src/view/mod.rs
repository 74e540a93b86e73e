use std::time::Duration;

use serde::Serialize;

use crate::{
    config::ViewConfig,
    input::{KeyListenerGuard, KeyboardHub},
    timeline::{FiredTask, Scheduler, TaskHandle},
};

/// Presentation flags rendered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewState {
    pub is_expanded: bool,
    /// Fullscreen; implies `is_expanded`.
    pub is_fully_expanded: bool,
    pub is_shaking: bool,
}

/// Compact / expanded / fullscreen state machine.
///
/// The key listener is held exactly while fullscreen is open, and the shake
/// flag is cleared by a timer owned here.
#[derive(Debug)]
pub struct ViewStateCoordinator {
    state: ViewState,
    expanded_before_fullscreen: bool,
    key_listener: Option<KeyListenerGuard>,
    shake_timer: Option<TaskHandle>,
    shake_duration: Duration,
}

impl ViewStateCoordinator {
    pub fn new(config: &ViewConfig) -> Self {
        Self {
            state: ViewState::default(),
            expanded_before_fullscreen: false,
            key_listener: None,
            shake_timer: None,
            shake_duration: config.shake_duration(),
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn shortcuts_enabled(&self) -> bool {
        self.key_listener.is_some()
    }

    /// Cover click in the compact view. Ignored while fullscreen.
    pub fn toggle_expanded(&mut self) -> bool {
        if !self.state.is_fully_expanded {
            self.state.is_expanded = !self.state.is_expanded;
        }
        self.state.is_expanded
    }

    /// Opens fullscreen and attaches the key listener. Returns `false` if it
    /// was already open.
    pub fn open_fullscreen(&mut self, keyboard: &KeyboardHub) -> bool {
        if self.state.is_fully_expanded {
            return false;
        }
        self.expanded_before_fullscreen = self.state.is_expanded;
        self.state.is_fully_expanded = true;
        self.state.is_expanded = true;
        self.key_listener = Some(keyboard.add_listener());
        tracing::debug!("fullscreen opened");
        true
    }

    /// Closes fullscreen, detaches the key listener and restores the
    /// expanded flag held before fullscreen was opened.
    pub fn close_fullscreen(&mut self) -> bool {
        if !self.state.is_fully_expanded {
            return false;
        }
        self.key_listener = None;
        self.state.is_fully_expanded = false;
        self.state.is_expanded = self.expanded_before_fullscreen;
        tracing::debug!(expanded = self.state.is_expanded, "fullscreen closed");
        true
    }

    /// Turns the shake flag on, restarting the clear timer.
    pub fn trigger_shake(&mut self, scheduler: &Scheduler) {
        self.shake_timer = None;
        self.state.is_shaking = true;
        self.shake_timer = Some(scheduler.set_timeout(self.shake_duration));
    }

    /// Handles a fired task. Returns `true` if it was the shake timer.
    pub fn on_timer(&mut self, fired: &FiredTask) -> bool {
        if !self.shake_timer.as_ref().is_some_and(|t| t.matches(fired)) {
            return false;
        }
        self.shake_timer = None;
        self.state.is_shaking = false;
        true
    }

    /// Releases the listener and timer and resets every flag.
    pub fn unmount(&mut self) {
        self.key_listener = None;
        self.shake_timer = None;
        self.state = ViewState::default();
        self.expanded_before_fullscreen = false;
    }
}
