pub mod device;
pub mod event;
pub mod router;

pub use device::{Device, DeviceChange, DeviceId, DeviceRegistry, DeviceTypes};
pub use event::{Action, DeviceClass, Event, Key, button, keycode};
pub use router::{InputRouter, KeyRepeatFilter, RawKeyEvent, RawPointerEvent};
