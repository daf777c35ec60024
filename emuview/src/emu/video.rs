use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::gfx::{Bounds, RendererCommands};

#[derive(Clone, Copy, Debug, PartialEq)]
struct FrameState {
    size: [u32; 2],
    color: [f32; 4],
    serial: u64,
}

/// Frame target the core writes into from the system task thread.
///
/// Cloning shares the same frame. The serial increases with every
/// finished frame.
#[derive(Clone, Debug)]
pub struct EmuVideo {
    frame: Arc<Mutex<FrameState>>,
}

impl Default for EmuVideo {
    fn default() -> Self {
        Self::new([0, 0])
    }
}

impl EmuVideo {
    pub fn new(size: [u32; 2]) -> Self {
        Self {
            frame: Arc::new(Mutex::new(FrameState {
                size,
                color: [0.0, 0.0, 0.0, 1.0],
                serial: 0,
            })),
        }
    }

    fn frame(&self) -> MutexGuard<'_, FrameState> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_format(&self, size: [u32; 2]) {
        self.frame().size = size;
    }

    pub fn size(&self) -> [u32; 2] {
        self.frame().size
    }

    /// Publishes a frame. Backends without texture upload show its
    /// average color.
    pub fn finish_frame(&self, color: [f32; 4]) {
        let mut frame = self.frame();
        frame.color = color;
        frame.serial += 1;
    }

    pub fn color(&self) -> [f32; 4] {
        self.frame().color
    }

    pub fn serial(&self) -> u64 {
        self.frame().serial
    }
}

/// Draws the emulated video with a brightness applied.
#[derive(Clone, Debug)]
pub struct EmuVideoLayer {
    video: EmuVideo,
    brightness: f32,
}

impl EmuVideoLayer {
    pub fn new(video: EmuVideo) -> Self {
        Self {
            video,
            brightness: 1.0,
        }
    }

    pub fn video(&self) -> &EmuVideo {
        &self.video
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    pub fn draw(&self, cmds: &mut RendererCommands, bounds: Bounds) {
        cmds.draw_video(
            bounds,
            self.video.color(),
            self.brightness,
            self.video.serial(),
        );
    }
}

/// Audio sink the core renders into.
pub trait AudioOutput: Send + Sync {
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    fn set_add_buffers_on_underrun(&self, on: bool);

    fn add_buffers_on_underrun(&self) -> bool;

    fn write_frames(&self, _frames: u32) {}
}

#[derive(Clone, Copy, Debug, Default)]
struct AudioState {
    volume: f32,
    add_buffers_on_underrun: bool,
    frames: u64,
}

/// [`AudioOutput`] that tracks its settings and discards samples.
#[derive(Debug, Default)]
pub struct SilentAudio {
    state: Mutex<AudioState>,
}

impl SilentAudio {
    pub fn new(volume: f32) -> Self {
        Self {
            state: Mutex::new(AudioState {
                volume,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn frames_written(&self) -> u64 {
        self.state().frames
    }
}

impl AudioOutput for SilentAudio {
    fn set_volume(&self, volume: f32) {
        self.state().volume = volume;
    }

    fn volume(&self) -> f32 {
        self.state().volume
    }

    fn set_add_buffers_on_underrun(&self, on: bool) {
        self.state().add_buffers_on_underrun = on;
    }

    fn add_buffers_on_underrun(&self) -> bool {
        self.state().add_buffers_on_underrun
    }

    fn write_frames(&self, frames: u32) {
        self.state().frames += frames as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{DrawCommand, Projection, Viewport};

    #[test]
    fn layer_draws_latest_frame_with_brightness() {
        let video = EmuVideo::new([320, 240]);
        let mut layer = EmuVideoLayer::new(video.clone());
        video.finish_frame([0.5, 0.5, 0.5, 1.0]);
        layer.set_brightness(0.25);

        let mut cmds =
            RendererCommands::new(Viewport::default(), Projection::default());
        layer.draw(&mut cmds, [0, 0, 320, 240]);

        assert_eq!(
            cmds.commands(),
            &[DrawCommand::Video {
                bounds: [0, 0, 320, 240],
                tint: [0.5, 0.5, 0.5, 1.0],
                brightness: 0.25,
                serial: 1,
            }]
        );
    }
}
