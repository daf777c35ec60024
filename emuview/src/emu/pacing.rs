/// Most frames emulated in one scheduling tick.
pub const MAX_FRAME_SKIP: u32 = 8;

/// Speed used while the core skips through a load on its own.
pub const FAST_FORWARD_LOAD_SPEED: u32 = 8;

/// Consecutive late ticks tolerated before the emulated clock re-syncs.
pub const LATE_FRAME_RESYNC_TICKS: u32 = 120;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpeedPlan {
    pub multiplier: u32,
    pub fast_forwarding: bool,
    /// Frames produced this tick need not all be shown.
    pub skip_forward: bool,
}

impl SpeedPlan {
    /// The core's own request wins over the user's target speed.
    pub fn new(system_fast_forward: bool, target_speed: u32) -> Self {
        if system_fast_forward {
            Self {
                multiplier: FAST_FORWARD_LOAD_SPEED,
                fast_forwarding: true,
                skip_forward: true,
            }
        } else if target_speed > 1 {
            Self {
                multiplier: target_speed,
                fast_forwarding: true,
                skip_forward: false,
            }
        } else {
            Self {
                multiplier: 1,
                fast_forwarding: false,
                skip_forward: false,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FramePlan {
    pub frames: u32,
    /// The emulated clock drifted too far behind and should re-sync.
    pub resync: bool,
}

/// Turns advanced frame counts into per-tick emulation work.
///
/// With late frames kept (`skip_late_frames` off) every tick runs exactly
/// the base interval. A run of ticks that were late by that measure
/// triggers a re-sync rather than drifting forever.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramePacer {
    late_ticks: u32,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn late_ticks(&self) -> u32 {
        self.late_ticks
    }

    pub fn reset(&mut self) {
        self.late_ticks = 0;
    }

    pub fn plan(
        &mut self,
        advanced: u32,
        speed: SpeedPlan,
        skip_late_frames: bool,
        interval: u32,
    ) -> FramePlan {
        let mut frames = advanced;
        let mut resync = false;

        if !skip_late_frames && !speed.fast_forwarding {
            if advanced > interval {
                self.late_ticks += 1;
            } else {
                self.late_ticks = 0;
            }
            if self.late_ticks >= LATE_FRAME_RESYNC_TICKS {
                resync = true;
                self.late_ticks = 0;
            }
            frames = interval;
        } else {
            self.late_ticks = 0;
        }

        FramePlan {
            frames: frames.min(MAX_FRAME_SKIP),
            resync,
        }
    }
}
