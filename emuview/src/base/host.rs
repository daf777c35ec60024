use std::path::PathBuf;

use super::orientation::{Orientation, OrientationMask};
use super::screen::ScreenId;
use super::window::WindowId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlatformKind {
    Android,
    Linux,
    MacOs,
    Windows,
    Other,
}

impl PlatformKind {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            PlatformKind::Android
        } else if cfg!(target_os = "linux") {
            PlatformKind::Linux
        } else if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else if cfg!(target_os = "windows") {
            PlatformKind::Windows
        } else {
            PlatformKind::Other
        }
    }
}

/// Operations the runtime needs from the environment hosting it.
///
/// One implementation exists per target; everything platform-specific
/// stays behind this trait. Calls come from the control thread only.
pub trait PlatformHost {
    fn platform(&self) -> PlatformKind;

    /// True when screen frame callbacks carry real vsync timestamps.
    fn screen_supports_timestamps(&self) -> bool;

    fn screen_count(&self) -> usize;

    fn open_window(&self, window: WindowId, screen: ScreenId, title: &str);

    fn close_window(&self, window: WindowId);

    fn set_window_title(&self, window: WindowId, title: &str);

    /// Arms the platform draw event for `window`.
    fn notify_draw(&self, window: WindowId);

    fn cancel_draw(&self, window: WindowId);

    fn set_intended_frame_rate(&self, _window: WindowId, _rate: f64) {}

    fn set_system_orientation(&self, _orientation: Orientation) {}

    fn configure_input_for_orientation(
        &self,
        _window: WindowId,
        _orientation: Orientation,
    ) {
    }

    fn set_orientation_sensor(&self, _on: bool) {}

    /// Orientations the platform can present at all.
    fn valid_orientations(&self) -> OrientationMask {
        OrientationMask::ALL
    }

    fn set_idle_display_power_save(&self, _on: bool) {}

    fn apply_os_nav_style(&self, _emulation_running: bool) {}

    fn set_cpu_needs_low_latency(&self, _on: bool) {}

    fn set_hint_key_repeat(&self, _on: bool) {}

    fn shared_storage_path(&self) -> Option<PathBuf>;

    /// OS API level on platforms that version their driver stack by it.
    fn os_api_level(&self) -> Option<u32> {
        None
    }

    fn exit(&self);
}
