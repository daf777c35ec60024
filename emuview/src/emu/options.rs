use serde::{Deserialize, Serialize};

use crate::base::orientation::OrientationMask;
use crate::gfx::ThreadMode;

pub const MAX_FRAME_INTERVAL: u32 = 4;

/// User-facing front-end settings, stored as JSON.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct FrontendOptions {
    pub frame_interval: u32,
    pub skip_late_frames: bool,
    pub fast_forward_speed: u32,
    pub frame_rate_ntsc: Option<f64>,
    pub frame_rate_pal: Option<f64>,
    pub sound_rate: u32,
    pub sound_volume: f32,
    pub sound_during_fast_forward: bool,
    pub add_sound_buffers_on_underrun: bool,
    pub pause_unfocused: bool,
    pub show_on_second_screen: bool,
    pub confirm_auto_load_state: bool,
    pub auto_save_state: bool,
    pub idle_display_power_save: bool,
    pub game_orientation: OrientationMask,
    pub menu_orientation: OrientationMask,
    pub title_bar: bool,
    pub thread_mode: ThreadMode,
}

impl Default for FrontendOptions {
    fn default() -> Self {
        Self {
            frame_interval: 1,
            skip_late_frames: true,
            fast_forward_speed: 4,
            frame_rate_ntsc: None,
            frame_rate_pal: None,
            sound_rate: 48_000,
            sound_volume: 1.0,
            sound_during_fast_forward: true,
            add_sound_buffers_on_underrun: false,
            pause_unfocused: true,
            show_on_second_screen: true,
            confirm_auto_load_state: true,
            auto_save_state: true,
            idle_display_power_save: false,
            game_orientation: OrientationMask::ALL,
            menu_orientation: OrientationMask::ALL,
            title_bar: true,
            thread_mode: ThreadMode::Auto,
        }
    }
}

impl FrontendOptions {
    /// Base frame interval, clamped to the supported range.
    pub fn frame_interval(&self) -> u32 {
        self.frame_interval.clamp(1, MAX_FRAME_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: FrontendOptions = serde_json::from_str(
            r#"{ "frame_interval": 9, "thread_mode": "single" }"#,
        )
        .expect("options");

        assert_eq!(options.frame_interval(), MAX_FRAME_INTERVAL);
        assert_eq!(options.thread_mode, ThreadMode::Single);
        assert!(options.skip_late_frames);
        assert_eq!(options.game_orientation, OrientationMask::ALL);
    }
}
