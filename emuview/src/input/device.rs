use log::info;

use crate::framework::util::HashMap;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceId(pub u32);

/// Capability bits describing what a device exposes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DeviceTypes(u32);

impl DeviceTypes {
    pub const NONE: Self = Self(0);
    pub const KEY_MISC: Self = Self(1 << 0);
    pub const KEYBOARD: Self = Self(1 << 1);
    pub const GAMEPAD: Self = Self(1 << 2);
    pub const JOYSTICK: Self = Self(1 << 3);
    pub const VIRTUAL: Self = Self(1 << 4);
    pub const MOUSE: Self = Self(1 << 5);
    pub const TOUCHSCREEN: Self = Self(1 << 6);
    pub const POWER_BUTTON: Self = Self(1 << 7);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceChange {
    Added,
    Removed,
    Changed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Device {
    id: DeviceId,
    name: String,
    types: DeviceTypes,
    enum_id: u32,
}

impl Device {
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        types: DeviceTypes,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            types,
            enum_id: 0,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> DeviceTypes {
        self.types
    }

    /// Distinguishes devices sharing a name, starting at 0.
    pub fn enum_id(&self) -> u32 {
        self.enum_id
    }

    pub fn has_keyboard(&self) -> bool {
        self.types.contains(DeviceTypes::KEYBOARD)
    }

    pub fn has_gamepad(&self) -> bool {
        self.types.contains(DeviceTypes::GAMEPAD)
    }

    pub fn has_joystick(&self) -> bool {
        self.types.contains(DeviceTypes::JOYSTICK)
    }

    pub fn is_virtual(&self) -> bool {
        self.types.contains(DeviceTypes::VIRTUAL)
    }

    pub fn has_keys(&self) -> bool {
        self.has_keyboard()
            || self.has_gamepad()
            || self.types.contains(DeviceTypes::KEY_MISC)
    }

    pub fn is_power_button(&self) -> bool {
        self.types.contains(DeviceTypes::POWER_BUTTON)
    }
}

/// Every input device the host has reported, keyed by its platform id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
    virtual_device: Option<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a device, assigning its enum id.
    pub fn add(&mut self, mut device: Device) -> DeviceChange {
        let id = device.id;
        let change = match self.devices.remove(&id) {
            Some(existing) if existing.name == device.name => {
                device.enum_id = existing.enum_id;
                DeviceChange::Changed
            }
            Some(_) => {
                device.enum_id = self.next_enum_id(&device.name);
                DeviceChange::Changed
            }
            None => {
                device.enum_id = self.next_enum_id(&device.name);
                DeviceChange::Added
            }
        };

        if device.is_virtual() && self.virtual_device.is_none() {
            self.virtual_device = Some(id);
        }

        info!(
            "input device {:?} {}: {} #{}",
            change, id.0, device.name, device.enum_id
        );
        self.devices.insert(id, device);
        change
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        let device = self.devices.remove(&id)?;
        if self.virtual_device == Some(id) {
            self.virtual_device = None;
        }
        info!("input device removed {}: {}", id.0, device.name);
        Some(device)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Stand-in for events whose device id is unknown.
    pub fn virtual_device(&self) -> Option<&Device> {
        self.virtual_device.and_then(|id| self.devices.get(&id))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices ordered by id.
    pub fn devices(&self) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self.devices.values().collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    fn next_enum_id(&self, name: &str) -> u32 {
        let mut enum_id = 0;
        while self
            .devices
            .values()
            .any(|d| d.name == name && d.enum_id == enum_id)
        {
            enum_id += 1;
        }
        enum_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_named_devices_get_distinct_enum_ids() {
        let mut registry = DeviceRegistry::new();
        registry.add(Device::new(DeviceId(4), "Pad", DeviceTypes::GAMEPAD));
        registry.add(Device::new(DeviceId(9), "Pad", DeviceTypes::GAMEPAD));
        registry.remove(DeviceId(4));
        registry.add(Device::new(DeviceId(12), "Pad", DeviceTypes::GAMEPAD));

        let ids: Vec<(u32, u32)> = registry
            .devices()
            .iter()
            .map(|d| (d.id().0, d.enum_id()))
            .collect();
        assert_eq!(ids, vec![(9, 1), (12, 0)]);
    }

    #[test]
    fn re_adding_a_device_reports_a_change() {
        let mut registry = DeviceRegistry::new();
        let keyboard =
            Device::new(DeviceId(1), "Keyboard", DeviceTypes::KEYBOARD);
        assert_eq!(registry.add(keyboard.clone()), DeviceChange::Added);
        assert_eq!(registry.add(keyboard), DeviceChange::Changed);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(DeviceId(1)).expect("device").has_keys());
    }

    #[test]
    fn first_virtual_device_is_the_fallback() {
        let mut registry = DeviceRegistry::new();
        let types = DeviceTypes::VIRTUAL.union(DeviceTypes::KEY_MISC);
        registry.add(Device::new(DeviceId(u32::MAX), "Virtual", types));
        assert_eq!(
            registry.virtual_device().expect("virtual").name(),
            "Virtual"
        );
        registry.remove(DeviceId(u32::MAX));
        assert!(registry.virtual_device().is_none());
    }
}
