use std::{
    cell::Cell,
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};

/// Keys the widget understands, named after DOM key codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Other(String),
}

impl Key {
    pub fn from_code(code: &str) -> Self {
        match code {
            "Space" => Key::Space,
            "ArrowLeft" => Key::ArrowLeft,
            "ArrowRight" => Key::ArrowRight,
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            other => Key::Other(other.to_string()),
        }
    }
}

/// Transport command bound to a key in the fullscreen view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    TogglePlay,
    Previous,
    Next,
    VolumeUp,
    VolumeDown,
}

impl Shortcut {
    pub fn for_key(key: &Key) -> Option<Self> {
        match key {
            Key::Space => Some(Shortcut::TogglePlay),
            Key::ArrowLeft => Some(Shortcut::Previous),
            Key::ArrowRight => Some(Shortcut::Next),
            Key::ArrowUp => Some(Shortcut::VolumeUp),
            Key::ArrowDown => Some(Shortcut::VolumeDown),
            Key::Other(_) => None,
        }
    }

    /// Whether the host should suppress the key's default action (page
    /// scrolling for space).
    pub fn prevents_default(self) -> bool {
        matches!(self, Shortcut::TogglePlay)
    }
}

/// Registry of global key listeners, standing in for the window.
#[derive(Debug, Clone, Default)]
pub struct KeyboardHub {
    listeners: Rc<Cell<usize>>,
}

impl KeyboardHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self) -> KeyListenerGuard {
        self.listeners.set(self.listeners.get() + 1);
        tracing::debug!(listeners = self.listeners.get(), "key listener attached");
        KeyListenerGuard {
            listeners: Rc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.get()
    }
}

/// A registered key listener; dropping it detaches the listener.
#[derive(Debug)]
#[must_use = "dropping the guard detaches the listener"]
pub struct KeyListenerGuard {
    listeners: Weak<Cell<usize>>,
}

impl Drop for KeyListenerGuard {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.set(listeners.get().saturating_sub(1));
            tracing::debug!(listeners = listeners.get(), "key listener detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dom_codes() {
        assert_eq!(Key::from_code("Space"), Key::Space);
        assert_eq!(Key::from_code("ArrowDown"), Key::ArrowDown);
        assert_eq!(Key::from_code("KeyA"), Key::Other("KeyA".into()));
        assert_eq!(Shortcut::for_key(&Key::Other("KeyA".into())), None);
        assert!(Shortcut::for_key(&Key::Space).unwrap().prevents_default());
        assert!(!Shortcut::Next.prevents_default());
    }

    #[test]
    fn guards_track_registrations() {
        let hub = KeyboardHub::new();
        let first = hub.add_listener();
        let second = hub.add_listener();
        assert_eq!(hub.listener_count(), 2);

        drop(first);
        assert_eq!(hub.listener_count(), 1);
        drop(second);
        assert_eq!(hub.listener_count(), 0);
    }
}
