use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use emuview::emu::{
    AudioOutput, EmuSystem, EmuVideo, FrameRunner, VideoSystem,
};
use log::{debug, info};

pub const PATTERN_EXTENSION: &str = "pattern";

const NTSC_FRAME_TIME: Duration = Duration::from_nanos(16_666_667);
const PAL_FRAME_TIME: Duration = Duration::from_millis(20);
const SAMPLES_PER_SECOND: f64 = 48_000.0;

/// Stand-in machine whose "content" is any `.pattern` file. Keeps an
/// emulated clock so the frontend paces it like a real core.
pub struct TestPatternSystem {
    content: Option<PathBuf>,
    paused: bool,
    speed: u32,
    video_system: VideoSystem,
    ntsc_frame_time: Duration,
    pal_frame_time: Duration,
    last_frame: Option<Instant>,
}

impl TestPatternSystem {
    pub fn new() -> Self {
        Self {
            content: None,
            paused: true,
            speed: 1,
            video_system: VideoSystem::Ntsc,
            ntsc_frame_time: NTSC_FRAME_TIME,
            pal_frame_time: PAL_FRAME_TIME,
            last_frame: None,
        }
    }

    fn frame_time(&self) -> Duration {
        match self.video_system {
            VideoSystem::Ntsc => self.ntsc_frame_time,
            VideoSystem::Pal => self.pal_frame_time,
        }
    }
}

impl EmuSystem for TestPatternSystem {
    fn advance_frames_with_time(&mut self, timestamp: Instant) -> u32 {
        let Some(last) = self.last_frame else {
            self.last_frame = Some(timestamp);
            return 1;
        };

        let step = self.frame_time() / self.speed.max(1);
        let elapsed = timestamp.saturating_duration_since(last);
        let frames = (elapsed.as_nanos() / step.as_nanos().max(1)) as u32;
        self.last_frame = Some(last + step * frames);
        frames
    }

    fn set_speed_multiplier(&mut self, speed: u32) {
        self.speed = speed.max(1);
    }

    fn should_fast_forward(&self) -> bool {
        false
    }

    fn start(&mut self) {
        self.paused = false;
        self.last_frame = None;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_active(&self) -> bool {
        self.content.is_some() && !self.paused
    }

    fn has_content(&self) -> bool {
        self.content.is_some()
    }

    fn close_runtime_system(&mut self, allow_autosave: bool) {
        if let Some(path) = self.content.take() {
            info!(
                "closing {} (autosave:{})",
                path.display(),
                allow_autosave
            );
        }
        self.paused = true;
        self.last_frame = None;
    }

    fn reset_frame_time(&mut self) {
        self.last_frame = None;
    }

    fn set_frame_time(&mut self, system: VideoSystem, frame_time: Duration) {
        match system {
            VideoSystem::Ntsc => self.ntsc_frame_time = frame_time,
            VideoSystem::Pal => self.pal_frame_time = frame_time,
        }
    }

    fn config_frame_time(&mut self, sound_rate: u32) {
        debug!(
            "frame time {:?} at {}Hz audio",
            self.frame_time(),
            sound_rate
        );
    }

    fn frame_rate(&self) -> f64 {
        1.0 / self.frame_time().as_secs_f64()
    }

    fn auto_save_state_path(&self) -> Option<PathBuf> {
        None
    }

    fn accepts_file(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == PATTERN_EXTENSION)
    }

    fn load_content(&mut self, path: &Path) -> Result<(), String> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            format!("can't read {}: {}", path.display(), err)
        })?;
        self.video_system = if text.trim().eq_ignore_ascii_case("pal") {
            VideoSystem::Pal
        } else {
            VideoSystem::Ntsc
        };
        info!("loaded {} as {:?}", path.display(), self.video_system);
        self.content = Some(path.to_path_buf());
        self.last_frame = None;
        Ok(())
    }

    fn content_name(&self) -> String {
        self.content
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn content_path(&self) -> Option<PathBuf> {
        self.content.clone()
    }

    fn set_media_search_path(&mut self, path: &Path) {
        info!("media search path: {}", path.display());
    }
}

/// Cycles hues, one step per emulated frame.
#[derive(Debug, Default)]
pub struct PatternRunner {
    frame: u64,
}

impl PatternRunner {
    fn color(&self) -> [f32; 4] {
        let hue = (self.frame % 360) as f32;
        let x = 1.0 - ((hue / 60.0) % 2.0 - 1.0).abs();
        let [r, g, b] = match hue as u32 / 60 {
            0 => [1.0, x, 0.0],
            1 => [x, 1.0, 0.0],
            2 => [0.0, 1.0, x],
            3 => [0.0, x, 1.0],
            4 => [x, 0.0, 1.0],
            _ => [1.0, 0.0, x],
        };
        [r, g, b, 1.0]
    }
}

impl FrameRunner for PatternRunner {
    fn run_frames(
        &mut self,
        video: &EmuVideo,
        audio: Option<&dyn AudioOutput>,
        frames: u32,
        _skip_forward: bool,
    ) {
        self.frame += u64::from(frames);
        video.finish_frame(self.color());
        if let Some(audio) = audio {
            let samples = SAMPLES_PER_SECOND / 60.0 * f64::from(frames);
            audio.write_frames(samples as u32);
        }
    }
}
