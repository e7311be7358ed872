//! winit events to [`InputEvent`]s.

use crate::{InputEvent, InputPayload, Key, Modifiers, MouseButton};
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

/// Modifier and cursor state carried between winit events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    pub modifiers: Modifiers,
    pub cursor: Option<(f64, f64)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one window event. Events nothing can bind to, and key
    /// repeats, give `None`; modifier changes only update the state.
    pub fn translate(&mut self, event: &WindowEvent) -> Option<(InputEvent, InputPayload)> {
        match event {
            WindowEvent::ModifiersChanged(m) => {
                self.modifiers = modifiers_from(m.state());
                None
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return None;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                self.key(code, event.state == ElementState::Pressed)
            }
            WindowEvent::MouseInput { state, button, .. } => {
                Some(self.button(mouse_button(*button), *state == ElementState::Pressed))
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some((position.x, position.y));
                Some((
                    InputEvent::MouseMove,
                    InputPayload::Cursor {
                        x: position.x,
                        y: position.y,
                    },
                ))
            }
            WindowEvent::Resized(size) => Some((
                InputEvent::WindowResize,
                InputPayload::Size {
                    width: size.width,
                    height: size.height,
                },
            )),
            _ => None,
        }
    }

    /// Key transition for a physical key code.
    pub fn key(&self, code: KeyCode, pressed: bool) -> Option<(InputEvent, InputPayload)> {
        let key = key_from_code(code)?;
        let event = if pressed {
            InputEvent::KeyDown(key)
        } else {
            InputEvent::KeyUp(key)
        };
        Some((event, InputPayload::Modifiers(self.modifiers)))
    }

    pub fn button(&self, button: MouseButton, pressed: bool) -> (InputEvent, InputPayload) {
        let event = if pressed {
            InputEvent::MouseDown(button)
        } else {
            InputEvent::MouseUp(button)
        };
        (event, InputPayload::Modifiers(self.modifiers))
    }
}

pub fn modifiers_from(state: ModifiersState) -> Modifiers {
    Modifiers {
        shift: state.shift_key(),
        control: state.control_key(),
        alt: state.alt_key(),
        logo: state.super_key(),
    }
}

pub fn mouse_button(button: winit::event::MouseButton) -> MouseButton {
    use winit::event::MouseButton as W;
    match button {
        W::Left => MouseButton::Left,
        W::Right => MouseButton::Right,
        W::Middle => MouseButton::Middle,
        W::Back => MouseButton::Back,
        W::Forward => MouseButton::Forward,
        W::Other(n) => MouseButton::Other(n),
    }
}

pub fn key_from_code(code: KeyCode) -> Option<Key> {
    let key = match code {
        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,
        KeyCode::Digit0 | KeyCode::Numpad0 => Key::Digit0,
        KeyCode::Digit1 | KeyCode::Numpad1 => Key::Digit1,
        KeyCode::Digit2 | KeyCode::Numpad2 => Key::Digit2,
        KeyCode::Digit3 | KeyCode::Numpad3 => Key::Digit3,
        KeyCode::Digit4 | KeyCode::Numpad4 => Key::Digit4,
        KeyCode::Digit5 | KeyCode::Numpad5 => Key::Digit5,
        KeyCode::Digit6 | KeyCode::Numpad6 => Key::Digit6,
        KeyCode::Digit7 | KeyCode::Numpad7 => Key::Digit7,
        KeyCode::Digit8 | KeyCode::Numpad8 => Key::Digit8,
        KeyCode::Digit9 | KeyCode::Numpad9 => Key::Digit9,
        KeyCode::Space => Key::Space,
        KeyCode::Enter | KeyCode::NumpadEnter => Key::Enter,
        KeyCode::Escape => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::ArrowUp => Key::Up,
        KeyCode::ArrowDown => Key::Down,
        KeyCode::ArrowLeft => Key::Left,
        KeyCode::ArrowRight => Key::Right,
        KeyCode::ShiftLeft => Key::LeftShift,
        KeyCode::ShiftRight => Key::RightShift,
        KeyCode::ControlLeft => Key::LeftControl,
        KeyCode::ControlRight => Key::RightControl,
        KeyCode::AltLeft => Key::LeftAlt,
        KeyCode::AltRight => Key::RightAlt,
        KeyCode::Equal | KeyCode::NumpadAdd => Key::Plus,
        KeyCode::Minus | KeyCode::NumpadSubtract => Key::Minus,
        KeyCode::F1 => Key::F1,
        KeyCode::F2 => Key::F2,
        KeyCode::F3 => Key::F3,
        KeyCode::F4 => Key::F4,
        KeyCode::F5 => Key::F5,
        KeyCode::F6 => Key::F6,
        KeyCode::F7 => Key::F7,
        KeyCode::F8 => Key::F8,
        KeyCode::F9 => Key::F9,
        KeyCode::F10 => Key::F10,
        KeyCode::F11 => Key::F11,
        KeyCode::F12 => Key::F12,
        _ => return None,
    };
    Some(key)
}
