#![forbid(unsafe_code)]

//! Canonical input events delivered by the host UI.
//!
//! The list never talks to a DOM or terminal directly. Hosts translate their
//! native input into [`Event`] values: keyboard presses, scroll offsets
//! reported by the scroll container, and container resizes.
//!
//! All pixel quantities are `u32` device-independent pixels.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key press.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const SUPER = 0b1000;
    }
}

/// Logical key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    Enter,
    Escape,
    Tab,
    Backspace,
    Char(char),
}

/// A key press with modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a key event with no modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
        }
    }

    /// Attach modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Whether this is a plain (unmodified) press of `c`.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        self.code == KeyCode::Char(c) && self.modifiers.is_empty()
    }

    /// Whether any of CTRL/ALT/SUPER is held.
    #[must_use]
    pub fn has_command_modifier(&self) -> bool {
        self.modifiers
            .intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::SUPER)
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::new(code)
    }
}

/// Host input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Keyboard input targeted at the list.
    Key(KeyEvent),
    /// The scroll container reported a new vertical offset.
    Scroll { offset: u32 },
    /// The scroll container changed height.
    Resize { height: u32 },
    /// Focus gained (`true`) or lost (`false`).
    Focus(bool),
}

impl Event {
    /// Key event payload, if any.
    #[must_use]
    pub fn as_key(&self) -> Option<&KeyEvent> {
        match self {
            Self::Key(k) => Some(k),
            _ => None,
        }
    }
}
