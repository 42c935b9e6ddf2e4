//! Keyboard controls.
//!
//! `Controls` tracks both instantaneous events (key just pressed) and
//! continuous state (key held down), and owns the simulation's pause flag.
//! The flag is not read by the engine directly; each frame the caller takes
//! an explicit [`FrameInput`] snapshot and passes it to
//! [`Engine::update`](crate::engine::Engine::update).
//!
//! | Key | Effect |
//! |-----|--------|
//! | Space | toggle pause |
//! | Escape | request exit |
//! | Q / E | zoom the camera in / out while held |
//! | T | reset the camera |

use std::collections::HashSet;

/// Keys the simulation reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Space,
    Escape,
    Q,
    E,
    T,
    Other(u32),
}

impl KeyCode {
    /// Map a character or ASCII key code.
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            ' ' => KeyCode::Space,
            '\u{1b}' => KeyCode::Escape,
            'q' => KeyCode::Q,
            'e' => KeyCode::E,
            't' => KeyCode::T,
            other => KeyCode::Other(other as u32),
        }
    }
}

/// Per-frame input the engine is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInput {
    /// When false the update leaves every boid untouched.
    pub run: bool,
}

impl Default for FrameInput {
    fn default() -> Self {
        Self { run: true }
    }
}

/// Keyboard state plus the pause and exit flags it drives.
#[derive(Debug, Clone)]
pub struct Controls {
    keys_held: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
    run: bool,
    exit_requested: bool,
}

impl Controls {
    /// Running, nothing held.
    pub fn new() -> Self {
        Self {
            keys_held: HashSet::new(),
            keys_pressed: HashSet::new(),
            keys_released: HashSet::new(),
            run: true,
            exit_requested: false,
        }
    }

    /// Clear per-frame events. Held keys stay held.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    pub fn press(&mut self, key: KeyCode) {
        // auto-repeat while held does not count as a new press
        let fresh = self.keys_held.insert(key);
        if fresh {
            self.keys_pressed.insert(key);
        }

        match key {
            KeyCode::Space if fresh => {
                self.run = !self.run;
                let state = if self.run { "resumed" } else { "paused" };
                tracing::info!(run = self.run, "simulation {}", state);
            }
            KeyCode::Escape => self.exit_requested = true,
            _ => {}
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        if self.keys_held.remove(&key) {
            self.keys_released.insert(key);
        }
    }

    /// True only on the frame `key` went down.
    pub fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// True while `key` is down.
    pub fn key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// True only on the frame `key` came up.
    pub fn key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.run
    }

    #[inline]
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn frame_input(&self) -> FrameInput {
        FrameInput { run: self.run }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut controls = Controls::new();

        controls.press(KeyCode::Q);
        assert!(controls.key_pressed(KeyCode::Q));
        assert!(controls.key_held(KeyCode::Q));

        controls.begin_frame();
        assert!(!controls.key_pressed(KeyCode::Q));
        assert!(controls.key_held(KeyCode::Q));

        controls.release(KeyCode::Q);
        assert!(controls.key_released(KeyCode::Q));
        assert!(!controls.key_held(KeyCode::Q));
    }

    #[test]
    fn test_space_toggles_run() {
        let mut controls = Controls::new();
        assert!(controls.frame_input().run);

        controls.press(KeyCode::Space);
        assert!(!controls.frame_input().run);

        // repeat while held is ignored
        controls.press(KeyCode::Space);
        assert!(!controls.is_running());

        controls.release(KeyCode::Space);
        controls.begin_frame();
        controls.press(KeyCode::Space);
        assert!(controls.is_running());
    }

    #[test]
    fn test_escape_requests_exit() {
        let mut controls = Controls::new();
        assert!(!controls.exit_requested());
        controls.press(KeyCode::from_char('\u{1b}'));
        assert!(controls.exit_requested());
    }
}
