use std::time::Instant;

use log::{trace, warn};

use super::device::{Device, DeviceChange, DeviceId, DeviceRegistry};
use super::event::{Action, DeviceClass, Event, Key, keycode};

/// Key report as it arrives from a platform backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawKeyEvent {
    pub device: DeviceId,
    pub key: Key,
    pub pushed: bool,
    pub repeat: u32,
    pub shift: bool,
    pub time: Instant,
}

/// Pointer report as it arrives from a platform backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawPointerEvent {
    pub device: DeviceId,
    pub button: Key,
    pub action: Action,
    pub pos: [i32; 2],
    pub relative: bool,
    pub time: Instant,
}

/// Drops OS repeat counts that did not come from the device that sent
/// the previous key.
///
/// Some platforms report two devices pressing the same key as a repeat
/// of one press.
#[derive(Debug, Default)]
pub struct KeyRepeatFilter {
    most_recent: Option<DeviceId>,
}

impl KeyRepeatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn most_recent_device(&self) -> Option<DeviceId> {
        self.most_recent
    }

    /// Returns the repeat count to report for a key from `device`.
    pub fn filter(&mut self, device: DeviceId, repeat: u32) -> u32 {
        let really_repeated =
            repeat != 0 && self.most_recent == Some(device);
        self.most_recent = Some(device);

        if really_repeated {
            return repeat;
        }

        if repeat != 0 {
            trace!("ignoring repeat count:{} from device:{}", repeat, device.0);
        }
        0
    }
}

/// Turns raw backend reports into normalized [`Event`]s.
#[derive(Debug, Default)]
pub struct InputRouter {
    devices: DeviceRegistry,
    repeat_filter: KeyRepeatFilter,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn add_device(&mut self, device: Device) -> DeviceChange {
        self.devices.add(device)
    }

    pub fn remove_device(&mut self, id: DeviceId) -> Option<DeviceChange> {
        self.devices.remove(id).map(|_| DeviceChange::Removed)
    }

    pub fn most_recent_key_device(&self) -> Option<DeviceId> {
        self.repeat_filter.most_recent_device()
    }

    pub fn route_key(&mut self, raw: RawKeyEvent) -> Option<Event> {
        let repeat = self.repeat_filter.filter(raw.device, raw.repeat);

        let device = match self.devices.get(raw.device) {
            Some(device) => device,
            None => match self.devices.virtual_device() {
                Some(device) => device,
                None => {
                    warn!("key event from unknown device ID:{}", raw.device.0);
                    return None;
                }
            },
        };

        if raw.key == keycode::UNKNOWN {
            return None;
        }

        let action = if raw.pushed {
            Action::Pushed
        } else {
            Action::Released
        };

        let event =
            Event::key(Some(device.id()), raw.key, action, repeat, raw.time)
                .with_shift(raw.shift);
        Some(event)
    }

    pub fn route_pointer(&mut self, raw: RawPointerEvent) -> Option<Event> {
        if self.devices.get(raw.device).is_none() {
            warn!("pointer event from unknown device ID:{}", raw.device.0);
            return None;
        }

        let mut event = Event::pointer(
            Some(raw.device),
            raw.button,
            raw.action,
            raw.pos,
            raw.time,
        );
        if raw.relative {
            event.class = DeviceClass::RelativePointer;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::device::DeviceTypes;

    fn key(device: u32, key: Key, repeat: u32) -> RawKeyEvent {
        RawKeyEvent {
            device: DeviceId(device),
            key,
            pushed: true,
            repeat,
            shift: false,
            time: Instant::now(),
        }
    }

    fn router_with_pads() -> InputRouter {
        let mut router = InputRouter::new();
        for id in [1, 2] {
            let pad = Device::new(DeviceId(id), "Pad", DeviceTypes::GAMEPAD);
            router.add_device(pad);
        }
        router
    }

    #[test]
    fn repeat_from_another_device_is_reset() {
        let mut router = router_with_pads();

        let first = router.route_key(key(1, keycode::A, 0)).expect("event");
        assert_eq!(first.repeat, 0);

        let second = router.route_key(key(2, keycode::A, 1)).expect("event");
        assert_eq!(second.repeat, 0);

        let third = router.route_key(key(2, keycode::A, 2)).expect("event");
        assert_eq!(third.repeat, 2);
    }

    #[test]
    fn unknown_devices_are_dropped_but_still_tracked() {
        let mut router = router_with_pads();

        assert!(router.route_key(key(7, keycode::A, 0)).is_none());
        assert_eq!(router.most_recent_key_device(), Some(DeviceId(7)));
    }

    #[test]
    fn unknown_devices_map_to_the_virtual_device() {
        let mut router = router_with_pads();
        router.add_device(Device::new(
            DeviceId(99),
            "Virtual",
            DeviceTypes::VIRTUAL,
        ));

        let event = router.route_key(key(7, keycode::A, 0)).expect("event");
        assert_eq!(event.device, Some(DeviceId(99)));
    }

    #[test]
    fn unknown_key_codes_are_dropped() {
        let mut router = router_with_pads();
        assert!(router.route_key(key(1, keycode::UNKNOWN, 0)).is_none());
    }

    #[test]
    fn pointer_events_bypass_the_repeat_filter() {
        let mut router = router_with_pads();
        router.route_key(key(1, keycode::A, 0));

        let pointer = router
            .route_pointer(RawPointerEvent {
                device: DeviceId(2),
                button: 1,
                action: Action::Moved,
                pos: [3, 5],
                relative: true,
                time: Instant::now(),
            })
            .expect("event");
        assert_eq!(pointer.class, DeviceClass::RelativePointer);
        assert_eq!(router.most_recent_key_device(), Some(DeviceId(1)));
    }
}
