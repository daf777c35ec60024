use std::time::{Duration, Instant};

use crate::framework::delegates::DelegateSet;

const MM_PER_INCH: f32 = 25.4;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScreenId(pub u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScreenChange {
    Added,
    Removed,
}

/// Pixel density of a display, with an optional device-corrected metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelDensity {
    pub dpi: [f32; 2],
    pub scaled_dpi: Option<[f32; 2]>,
}

impl Default for PixelDensity {
    fn default() -> Self {
        Self {
            dpi: [96.0, 96.0],
            scaled_dpi: None,
        }
    }
}

impl PixelDensity {
    pub fn pixels_as_mm(&self, pixels: [i32; 2]) -> [f32; 2] {
        to_mm(pixels, self.dpi)
    }

    pub fn pixels_as_scaled_mm(&self, pixels: [i32; 2]) -> Option<[f32; 2]> {
        self.scaled_dpi.map(|dpi| to_mm(pixels, dpi))
    }
}

fn to_mm(pixels: [i32; 2], dpi: [f32; 2]) -> [f32; 2] {
    [
        pixels[0] as f32 / dpi[0].max(1.0) * MM_PER_INCH,
        pixels[1] as f32 / dpi[1].max(1.0) * MM_PER_INCH,
    ]
}

/// Timestamp snapshot shared by every callback in one frame dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameParams {
    timestamp: Instant,
    frame_time: Duration,
}

impl FrameParams {
    pub fn new(timestamp: Instant, frame_time: Duration) -> Self {
        Self {
            timestamp,
            frame_time,
        }
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    /// When a frame produced now is expected to reach the display.
    pub fn present_time(&self) -> Instant {
        self.timestamp + self.frame_time
    }
}

/// A physical display and the frame callbacks driven by its vsync.
#[derive(Debug)]
pub struct Screen<D> {
    id: ScreenId,
    frame_rate: f64,
    density: PixelDensity,
    on_frame: DelegateSet<D>,
}

impl<D: Clone + PartialEq> Screen<D> {
    pub fn new(id: ScreenId, frame_rate: f64, density: PixelDensity) -> Self {
        Self {
            id,
            frame_rate: sanitize_rate(frame_rate),
            density,
            on_frame: DelegateSet::new(),
        }
    }

    pub fn id(&self) -> ScreenId {
        self.id
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.frame_rate = sanitize_rate(frame_rate);
    }

    pub fn frame_time(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn density(&self) -> PixelDensity {
        self.density
    }

    pub fn add_on_frame(&mut self, delegate: D, priority: i32) -> bool {
        self.on_frame.add(delegate, priority)
    }

    pub fn remove_on_frame(&mut self, delegate: &D) -> bool {
        self.on_frame.remove(delegate)
    }

    pub fn on_frame(&self) -> &DelegateSet<D> {
        &self.on_frame
    }

    pub fn on_frame_mut(&mut self) -> &mut DelegateSet<D> {
        &mut self.on_frame
    }

    pub fn frame_params(&self, timestamp: Instant) -> FrameParams {
        FrameParams::new(timestamp, self.frame_time())
    }
}

fn sanitize_rate(frame_rate: f64) -> f64 {
    if frame_rate.is_finite() && frame_rate >= 1.0 {
        frame_rate
    } else {
        60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_params_present_one_frame_ahead() {
        let now = Instant::now();
        let screen =
            Screen::<u8>::new(ScreenId(0), 50.0, PixelDensity::default());
        let params = screen.frame_params(now);
        assert_eq!(params.frame_time(), Duration::from_millis(20));
        assert_eq!(params.present_time(), now + Duration::from_millis(20));
    }

    #[test]
    fn invalid_frame_rates_fall_back_to_sixty() {
        let screen =
            Screen::<u8>::new(ScreenId(1), f64::NAN, PixelDensity::default());
        assert_eq!(screen.frame_rate(), 60.0);
    }

    #[test]
    fn density_converts_pixels_to_mm() {
        let density = PixelDensity {
            dpi: [254.0, 127.0],
            scaled_dpi: None,
        };
        assert_eq!(density.pixels_as_mm([100, 100]), [10.0, 20.0]);
        assert_eq!(density.pixels_as_scaled_mm([100, 100]), None);
    }
}
