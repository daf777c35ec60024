use winit::event::MouseButton;
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::input::{
    Device, DeviceId, DeviceTypes, InputRouter, Key, button, keycode,
};

pub const KEYBOARD_DEVICE: DeviceId = DeviceId(1);
pub const MOUSE_DEVICE: DeviceId = DeviceId(2);

/// Router with the desktop's keyboard and mouse registered.
pub fn desktop_router() -> InputRouter {
    let mut router = InputRouter::new();
    router.add_device(Device::new(
        KEYBOARD_DEVICE,
        "Keyboard",
        DeviceTypes::KEYBOARD,
    ));
    router.add_device(Device::new(MOUSE_DEVICE, "Mouse", DeviceTypes::MOUSE));
    router
}

pub fn key_from_physical(key: PhysicalKey) -> Key {
    match key {
        PhysicalKey::Code(code) => key_from_code(code),
        PhysicalKey::Unidentified(_) => keycode::UNKNOWN,
    }
}

pub fn key_from_code(code: KeyCode) -> Key {
    if let Some(offset) = letter_offset(code) {
        return keycode::A + offset;
    }
    if let Some(offset) = digit_offset(code) {
        return keycode::NUM_0 + offset;
    }
    if let Some(offset) = function_offset(code) {
        return keycode::F1 + offset;
    }

    match code {
        KeyCode::Escape => keycode::ESCAPE,
        KeyCode::BrowserBack => keycode::BACK,
        KeyCode::ContextMenu => keycode::MENU,
        KeyCode::Enter | KeyCode::NumpadEnter => keycode::ENTER,
        KeyCode::Space => keycode::SPACE,
        KeyCode::Backspace => keycode::BACKSPACE,
        KeyCode::Tab => keycode::TAB,
        KeyCode::ArrowUp => keycode::UP,
        KeyCode::ArrowDown => keycode::DOWN,
        KeyCode::ArrowLeft => keycode::LEFT,
        KeyCode::ArrowRight => keycode::RIGHT,
        KeyCode::ShiftLeft => keycode::LEFT_SHIFT,
        KeyCode::ShiftRight => keycode::RIGHT_SHIFT,
        KeyCode::ControlLeft => keycode::LEFT_CTRL,
        KeyCode::ControlRight => keycode::RIGHT_CTRL,
        KeyCode::AltLeft => keycode::LEFT_ALT,
        KeyCode::AltRight => keycode::RIGHT_ALT,
        _ => keycode::UNKNOWN,
    }
}

pub fn button_from_mouse(button: MouseButton) -> Option<Key> {
    match button {
        MouseButton::Left => Some(button::LEFT),
        MouseButton::Right => Some(button::RIGHT),
        MouseButton::Middle => Some(button::MIDDLE),
        _ => None,
    }
}

fn letter_offset(code: KeyCode) -> Option<Key> {
    const LETTERS: [KeyCode; 26] = [
        KeyCode::KeyA,
        KeyCode::KeyB,
        KeyCode::KeyC,
        KeyCode::KeyD,
        KeyCode::KeyE,
        KeyCode::KeyF,
        KeyCode::KeyG,
        KeyCode::KeyH,
        KeyCode::KeyI,
        KeyCode::KeyJ,
        KeyCode::KeyK,
        KeyCode::KeyL,
        KeyCode::KeyM,
        KeyCode::KeyN,
        KeyCode::KeyO,
        KeyCode::KeyP,
        KeyCode::KeyQ,
        KeyCode::KeyR,
        KeyCode::KeyS,
        KeyCode::KeyT,
        KeyCode::KeyU,
        KeyCode::KeyV,
        KeyCode::KeyW,
        KeyCode::KeyX,
        KeyCode::KeyY,
        KeyCode::KeyZ,
    ];
    position(&LETTERS, code)
}

fn digit_offset(code: KeyCode) -> Option<Key> {
    const DIGITS: [KeyCode; 10] = [
        KeyCode::Digit0,
        KeyCode::Digit1,
        KeyCode::Digit2,
        KeyCode::Digit3,
        KeyCode::Digit4,
        KeyCode::Digit5,
        KeyCode::Digit6,
        KeyCode::Digit7,
        KeyCode::Digit8,
        KeyCode::Digit9,
    ];
    position(&DIGITS, code)
}

fn function_offset(code: KeyCode) -> Option<Key> {
    const FUNCTION_KEYS: [KeyCode; 12] = [
        KeyCode::F1,
        KeyCode::F2,
        KeyCode::F3,
        KeyCode::F4,
        KeyCode::F5,
        KeyCode::F6,
        KeyCode::F7,
        KeyCode::F8,
        KeyCode::F9,
        KeyCode::F10,
        KeyCode::F11,
        KeyCode::F12,
    ];
    position(&FUNCTION_KEYS, code)
}

fn position(codes: &[KeyCode], code: KeyCode) -> Option<Key> {
    codes.iter().position(|c| *c == code).map(|i| i as Key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_ranges_map_by_offset() {
        assert_eq!(key_from_code(KeyCode::KeyA), keycode::A);
        assert_eq!(key_from_code(KeyCode::KeyZ), keycode::A + 25);
        assert_eq!(key_from_code(KeyCode::Digit7), keycode::NUM_0 + 7);
        assert_eq!(key_from_code(KeyCode::F1), keycode::F1);
        assert_eq!(key_from_code(KeyCode::F12), keycode::F12);
    }

    #[test]
    fn navigation_keys_and_unknowns() {
        assert_eq!(key_from_code(KeyCode::Escape), keycode::ESCAPE);
        assert_eq!(key_from_code(KeyCode::NumpadEnter), keycode::ENTER);
        assert_eq!(key_from_code(KeyCode::ArrowLeft), keycode::LEFT);
        assert_eq!(key_from_code(KeyCode::CapsLock), keycode::UNKNOWN);
        assert_eq!(button_from_mouse(MouseButton::Back), None);
    }

    #[test]
    fn desktop_router_knows_its_devices() {
        let router = desktop_router();
        assert!(router.devices().get(KEYBOARD_DEVICE).is_some());
        assert!(router.devices().get(MOUSE_DEVICE).is_some());
    }
}
