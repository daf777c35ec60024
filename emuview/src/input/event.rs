use std::time::Instant;

use super::device::DeviceId;

pub type Key = u16;

/// Normalized key codes shared by every input backend.
pub mod keycode {
    use super::Key;

    pub const UNKNOWN: Key = 0;
    pub const ESCAPE: Key = 1;
    pub const BACK: Key = 2;
    pub const MENU: Key = 3;
    pub const ENTER: Key = 4;
    pub const SPACE: Key = 5;
    pub const BACKSPACE: Key = 6;
    pub const TAB: Key = 7;
    pub const UP: Key = 8;
    pub const DOWN: Key = 9;
    pub const LEFT: Key = 10;
    pub const RIGHT: Key = 11;
    pub const LEFT_SHIFT: Key = 12;
    pub const RIGHT_SHIFT: Key = 13;
    pub const LEFT_CTRL: Key = 14;
    pub const RIGHT_CTRL: Key = 15;
    pub const LEFT_ALT: Key = 16;
    pub const RIGHT_ALT: Key = 17;
    pub const F1: Key = 0x20;
    pub const F2: Key = 0x21;
    pub const F3: Key = 0x22;
    pub const F4: Key = 0x23;
    pub const F5: Key = 0x24;
    pub const F6: Key = 0x25;
    pub const F7: Key = 0x26;
    pub const F8: Key = 0x27;
    pub const F9: Key = 0x28;
    pub const F10: Key = 0x29;
    pub const F11: Key = 0x2a;
    pub const F12: Key = 0x2b;
    /// `A`..=`Z` follow contiguously.
    pub const A: Key = 0x40;
    /// `0`..=`9` follow contiguously.
    pub const NUM_0: Key = 0x60;
}

/// Pointer button identifiers.
pub mod button {
    use super::Key;

    pub const LEFT: Key = 1;
    pub const RIGHT: Key = 2;
    pub const MIDDLE: Key = 3;
}

/// Which map a key or button identifier belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeviceClass {
    Pointer,
    RelativePointer,
    System,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    Pushed,
    Released,
    Moved,
    MovedRelative,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub class: DeviceClass,
    pub key: Key,
    pub action: Action,
    pub pos: [i32; 2],
    pub repeat: u32,
    pub shift: bool,
    pub time: Instant,
    pub device: Option<DeviceId>,
}

impl Event {
    pub fn key(
        device: Option<DeviceId>,
        key: Key,
        action: Action,
        repeat: u32,
        time: Instant,
    ) -> Self {
        Self {
            class: DeviceClass::System,
            key,
            action,
            pos: [0, 0],
            repeat,
            shift: false,
            time,
            device,
        }
    }

    pub fn pointer(
        device: Option<DeviceId>,
        button: Key,
        action: Action,
        pos: [i32; 2],
        time: Instant,
    ) -> Self {
        Self {
            class: DeviceClass::Pointer,
            key: button,
            action,
            pos,
            repeat: 0,
            shift: false,
            time,
            device,
        }
    }

    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift = shift;
        self
    }

    pub fn pushed(&self) -> bool {
        self.action == Action::Pushed
    }

    pub fn released(&self) -> bool {
        self.action == Action::Released
    }

    pub fn is_key(&self) -> bool {
        self.class == DeviceClass::System
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self.class,
            DeviceClass::Pointer | DeviceClass::RelativePointer
        )
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat != 0
    }

    /// Platform back gesture: Escape or Back on the system map.
    pub fn is_default_cancel_button(&self) -> bool {
        self.is_key() && matches!(self.key, keycode::ESCAPE | keycode::BACK)
    }

    pub fn is_menu_dismiss_key(&self) -> bool {
        self.is_key() && matches!(self.key, keycode::MENU | keycode::F1)
    }
}
