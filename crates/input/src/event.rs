use serde::{Deserialize, Serialize};

/// Keys the applications bind. Anything else is ignored by translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,
    Space,
    Enter,
    Escape,
    Tab,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    LeftShift,
    RightShift,
    LeftControl,
    RightControl,
    LeftAlt,
    RightAlt,
    Plus,
    Minus,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

/// What a callback is registered against. Each key and button has its own
/// down and up event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    MouseMove,
    WindowResize,
}

/// Modifier keys held when an event fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
    pub logo: bool,
}

/// Data delivered with an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPayload {
    /// Key and button events.
    Modifiers(Modifiers),
    /// Cursor position in physical pixels from the top-left corner.
    Cursor { x: f64, y: f64 },
    /// New inner size of the window in physical pixels.
    Size { width: u32, height: u32 },
}

impl InputPayload {
    pub fn modifiers(&self) -> Option<Modifiers> {
        match self {
            InputPayload::Modifiers(m) => Some(*m),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Option<(f64, f64)> {
        match self {
            InputPayload::Cursor { x, y } => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        match self {
            InputPayload::Size { width, height } => Some((*width, *height)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_and_up_are_distinct_events() {
        assert_ne!(InputEvent::KeyDown(Key::W), InputEvent::KeyUp(Key::W));
        assert_ne!(
            InputEvent::MouseDown(MouseButton::Left),
            InputEvent::MouseDown(MouseButton::Right)
        );
    }

    #[test]
    fn payload_accessors() {
        let p = InputPayload::Size {
            width: 800,
            height: 600,
        };
        assert_eq!(p.size(), Some((800, 600)));
        assert_eq!(p.cursor(), None);
        assert_eq!(InputPayload::Cursor { x: 1.0, y: 2.0 }.cursor(), Some((1.0, 2.0)));
        assert!(InputPayload::Modifiers(Modifiers::default()).modifiers().is_some());
    }

    #[test]
    fn events_serialize_by_name() {
        let json = serde_json::to_string(&InputEvent::KeyDown(Key::L)).unwrap();
        assert_eq!(json, r#"{"KeyDown":"L"}"#);
        let back: InputEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InputEvent::KeyDown(Key::L));
    }
}
