use std::collections::HashSet;

use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Accepts friendly names (`Space`, `ArrowUp`), DOM codes (`KeyW`,
    /// `Digit1`) and single characters, case-insensitively for letters.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let name = name
            .strip_prefix("Key")
            .or_else(|| name.strip_prefix("Digit"))
            .unwrap_or(name);
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Some(Self::Digit(ch as u8 - b'0')),
            (Some(' '), None) => Some(Self::Named(NamedKey::Space)),
            _ => None,
        }
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | "space" | "Spacebar" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        "Shift" | "ShiftLeft" | "ShiftRight" => Shift,
        "Control" | "ControlLeft" | "ControlRight" => Control,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Non-character keys scripts and controllers refer to by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Shift,
    Control,
}

/// Keyboard snapshot shared by the host, controllers and scripts.
///
/// Tracks held keys plus the keys pressed since the last
/// [`end_frame`](Self::end_frame), so edge-triggered actions fire once.
#[derive(Debug, Default)]
pub struct InputState {
    held: RwLock<HashSet<KeyCode>>,
    pressed: RwLock<HashSet<KeyCode>>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key: KeyCode) {
        if self.held.write().insert(key) {
            self.pressed.write().insert(key);
        }
    }

    pub fn release(&self, key: KeyCode) {
        self.held.write().remove(&key);
    }

    /// Host entry point taking a key name; unknown names are ignored.
    pub fn set_key(&self, name: &str, down: bool) -> bool {
        let Some(key) = KeyCode::from_name(name) else {
            return false;
        };
        if down {
            self.press(key);
        } else {
            self.release(key);
        }
        true
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.held.read().contains(&key)
    }

    pub fn is_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name)
            .map(|key| self.is_down(key))
            .unwrap_or(false)
    }

    /// True only during the frame the key went down.
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.read().contains(&key)
    }

    pub fn end_frame(&self) {
        self.pressed.write().clear();
    }

    /// Planar movement intent from WASD and the arrow keys, normalised.
    /// Forward is -Z.
    pub fn movement_vector(&self) -> Vec3 {
        let held = self.held.read();
        let any = |keys: [KeyCode; 2]| keys.iter().any(|key| held.contains(key));
        let mut direction = Vec3::ZERO;
        if any([KeyCode::Character('W'), KeyCode::Named(NamedKey::Up)]) {
            direction.z -= 1.0;
        }
        if any([KeyCode::Character('S'), KeyCode::Named(NamedKey::Down)]) {
            direction.z += 1.0;
        }
        if any([KeyCode::Character('A'), KeyCode::Named(NamedKey::Left)]) {
            direction.x -= 1.0;
        }
        if any([KeyCode::Character('D'), KeyCode::Named(NamedKey::Right)]) {
            direction.x += 1.0;
        }
        direction.normalize_or_zero()
    }
}
