#![allow(dead_code)]

use std::cell::RefCell;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use emuview::base::events::{
    ControlEvent, ControlEventSender, control_channel,
};
use emuview::base::host::{PlatformHost, PlatformKind};
use emuview::base::screen::{PixelDensity, Screen, ScreenId};
use emuview::base::window::WindowId;
use emuview::emu::{
    AudioOutput, ControllerParts, DefaultViewFactory, EmuFrame, EmuSystem,
    EmuVideo, EmuViewController, FrameRequest, FrontendOptions,
    RecentGameList, SilentAudio, SystemTask, VideoSystem,
};
use emuview::gfx::{
    ContextAttributes, DisplayError, Drawable, DriverQuery, GlApi,
    GpuDisplay, PixelFormat, ProcAddress, Renderer, RendererCommands,
    ThreadMode,
};
use emuview::input::{Action, Event, Key};

pub fn gpu_tests_enabled() -> bool {
    matches!(
        env::var("EMUVIEW_RUN_GPU_TESTS")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = env::temp_dir()
        .join(format!("emuview-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"test").expect("write scratch file");
    path
}

pub fn pushed(key: Key) -> Event {
    Event::key(None, key, Action::Pushed, 0, Instant::now())
}

// Host

#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    OpenWindow(WindowId, ScreenId),
    CloseWindow(WindowId),
    NotifyDraw(WindowId),
    CancelDraw(WindowId),
    LowLatency(bool),
    KeyRepeat(bool),
    Exit,
}

pub struct RecordingHost {
    platform: PlatformKind,
    timestamps: bool,
    storage: Option<PathBuf>,
    calls: RefCell<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new(
        platform: PlatformKind,
        timestamps: bool,
        storage: Option<PathBuf>,
    ) -> Self {
        Self {
            platform,
            timestamps,
            storage,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &HostCall) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn push(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl PlatformHost for RecordingHost {
    fn platform(&self) -> PlatformKind {
        self.platform
    }

    fn screen_supports_timestamps(&self) -> bool {
        self.timestamps
    }

    fn screen_count(&self) -> usize {
        1
    }

    fn open_window(&self, window: WindowId, screen: ScreenId, _: &str) {
        self.push(HostCall::OpenWindow(window, screen));
    }

    fn close_window(&self, window: WindowId) {
        self.push(HostCall::CloseWindow(window));
    }

    fn set_window_title(&self, _: WindowId, _: &str) {}

    fn notify_draw(&self, window: WindowId) {
        self.push(HostCall::NotifyDraw(window));
    }

    fn cancel_draw(&self, window: WindowId) {
        self.push(HostCall::CancelDraw(window));
    }

    fn set_cpu_needs_low_latency(&self, on: bool) {
        self.push(HostCall::LowLatency(on));
    }

    fn set_hint_key_repeat(&self, on: bool) {
        self.push(HostCall::KeyRepeat(on));
    }

    fn shared_storage_path(&self) -> Option<PathBuf> {
        self.storage.clone()
    }

    fn exit(&self) {
        self.push(HostCall::Exit);
    }
}

// Emulated system

/// State behind a [`ScriptedSystem`], shared with the test.
#[derive(Debug)]
pub struct SystemScript {
    pub frames_per_tick: u32,
    pub advance_calls: u32,
    pub speed_multipliers: Vec<u32>,
    pub fast_forward: bool,
    pub paused: bool,
    pub content: Option<PathBuf>,
    pub load_error: Option<String>,
    pub autosave: Option<PathBuf>,
    pub autosave_loads: u32,
    pub frame_time_resets: u32,
    pub frame_times: Vec<(VideoSystem, Duration)>,
    pub closes: Vec<bool>,
    pub search_path: Option<PathBuf>,
}

impl Default for SystemScript {
    fn default() -> Self {
        Self {
            frames_per_tick: 1,
            advance_calls: 0,
            speed_multipliers: Vec::new(),
            fast_forward: false,
            paused: true,
            content: None,
            load_error: None,
            autosave: None,
            autosave_loads: 0,
            frame_time_resets: 0,
            frame_times: Vec::new(),
            closes: Vec::new(),
            search_path: None,
        }
    }
}

pub struct ScriptedSystem {
    script: Rc<RefCell<SystemScript>>,
}

impl ScriptedSystem {
    pub fn new(script: Rc<RefCell<SystemScript>>) -> Self {
        Self { script }
    }
}

impl EmuSystem for ScriptedSystem {
    fn advance_frames_with_time(&mut self, _timestamp: Instant) -> u32 {
        let mut script = self.script.borrow_mut();
        script.advance_calls += 1;
        script.frames_per_tick
    }

    fn set_speed_multiplier(&mut self, speed: u32) {
        self.script.borrow_mut().speed_multipliers.push(speed);
    }

    fn should_fast_forward(&self) -> bool {
        self.script.borrow().fast_forward
    }

    fn start(&mut self) {
        self.script.borrow_mut().paused = false;
    }

    fn pause(&mut self) {
        self.script.borrow_mut().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.script.borrow().paused
    }

    fn is_active(&self) -> bool {
        let script = self.script.borrow();
        script.content.is_some() && !script.paused
    }

    fn has_content(&self) -> bool {
        self.script.borrow().content.is_some()
    }

    fn close_runtime_system(&mut self, allow_autosave: bool) {
        let mut script = self.script.borrow_mut();
        script.closes.push(allow_autosave);
        script.content = None;
        script.paused = true;
    }

    fn reset_frame_time(&mut self) {
        self.script.borrow_mut().frame_time_resets += 1;
    }

    fn set_frame_time(&mut self, system: VideoSystem, frame_time: Duration) {
        self.script.borrow_mut().frame_times.push((system, frame_time));
    }

    fn config_frame_time(&mut self, _sound_rate: u32) {}

    fn frame_rate(&self) -> f64 {
        60.0
    }

    fn auto_save_state_path(&self) -> Option<PathBuf> {
        self.script.borrow().autosave.clone()
    }

    fn accepts_file(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "rom")
    }

    fn load_content(&mut self, path: &Path) -> Result<(), String> {
        let mut script = self.script.borrow_mut();
        if let Some(err) = script.load_error.clone() {
            return Err(err);
        }
        script.content = Some(path.to_path_buf());
        Ok(())
    }

    fn content_name(&self) -> String {
        self.script
            .borrow()
            .content
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn content_path(&self) -> Option<PathBuf> {
        self.script.borrow().content.clone()
    }

    fn load_auto_save_state(&mut self) -> Result<(), String> {
        self.script.borrow_mut().autosave_loads += 1;
        Ok(())
    }

    fn set_media_search_path(&mut self, path: &Path) {
        self.script.borrow_mut().search_path = Some(path.to_path_buf());
    }
}

// System task

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskCall {
    Start,
    Pause,
    Stop,
    RunFrame { frames: u32, skip_forward: bool },
}

/// Logs requests without emulating. Tests post
/// [`ControlEvent::VideoFrameFinished`] themselves.
pub struct RecordingTask {
    log: Rc<RefCell<Vec<TaskCall>>>,
}

impl SystemTask for RecordingTask {
    fn start(&mut self) {
        self.log.borrow_mut().push(TaskCall::Start);
    }

    fn pause(&mut self) {
        self.log.borrow_mut().push(TaskCall::Pause);
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push(TaskCall::Stop);
    }

    fn run_frame(&mut self, request: FrameRequest) {
        self.log.borrow_mut().push(TaskCall::RunFrame {
            frames: request.frames,
            skip_forward: request.skip_forward,
        });
    }
}

// GPU

pub struct FakeDriver {
    version: String,
}

impl DriverQuery for FakeDriver {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn renderer_name(&self) -> String {
        "fake".to_string()
    }

    fn indexed_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn extension_string(&self) -> String {
        String::new()
    }

    fn display_extensions(&self) -> String {
        String::new()
    }

    fn max_texture_size(&self) -> u32 {
        2048
    }

    fn max_anisotropy(&self) -> f32 {
        0.0
    }

    fn proc_address(&self, _name: &str) -> Option<ProcAddress> {
        None
    }
}

#[derive(Debug, Default)]
struct DisplayLog {
    ops: Vec<&'static str>,
    drawables: Vec<(WindowId, Drawable)>,
    presents: Vec<(Drawable, RendererCommands)>,
}

/// In-memory [`GpuDisplay`] that records every call.
pub struct FakeDisplay {
    driver: FakeDriver,
    next_drawable: AtomicU64,
    fail_drawables: AtomicBool,
    log: Mutex<DisplayLog>,
}

impl FakeDisplay {
    pub fn new(version: &str) -> Self {
        Self {
            driver: FakeDriver {
                version: version.to_string(),
            },
            next_drawable: AtomicU64::new(1),
            fail_drawables: AtomicBool::new(false),
            log: Mutex::new(DisplayLog::default()),
        }
    }

    fn log(&self) -> MutexGuard<'_, DisplayLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_drawables(&self, fail: bool) {
        self.fail_drawables.store(fail, Ordering::SeqCst);
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.log().ops.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.log().ops.iter().filter(|o| **o == op).count()
    }

    /// Commands of every present that reached `window`'s drawables.
    pub fn presents_for(&self, window: WindowId) -> Vec<RendererCommands> {
        let log = self.log();
        log.presents
            .iter()
            .filter(|(drawable, _)| {
                log.drawables.contains(&(window, *drawable))
            })
            .map(|(_, commands)| commands.clone())
            .collect()
    }
}

impl GpuDisplay for FakeDisplay {
    fn driver(&self) -> &dyn DriverQuery {
        &self.driver
    }

    fn make_context(
        &self,
        _attrs: ContextAttributes,
        _format: PixelFormat,
    ) -> Result<(), DisplayError> {
        Ok(())
    }

    fn make_drawable(
        &self,
        window: WindowId,
        _format: PixelFormat,
        _size: [u32; 2],
    ) -> Result<Drawable, DisplayError> {
        if self.fail_drawables.load(Ordering::SeqCst) {
            return Err(DisplayError::Surface("lost".to_string()));
        }
        let raw = self.next_drawable.fetch_add(1, Ordering::SeqCst);
        let drawable =
            Drawable::new(raw).ok_or(DisplayError::UnknownDrawable(raw))?;
        let mut log = self.log();
        log.ops.push("make_drawable");
        log.drawables.push((window, drawable));
        Ok(drawable)
    }

    fn destroy_drawable(&self, _drawable: Drawable) {
        self.log().ops.push("destroy_drawable");
    }

    fn resize_drawable(&self, _drawable: Drawable, _size: [u32; 2]) {
        self.log().ops.push("resize_drawable");
    }

    fn free_caches(&self, _drawable: Drawable) {
        self.log().ops.push("free_caches");
    }

    fn restore_caches(&self, _drawable: Drawable) {
        self.log().ops.push("restore_caches");
    }

    fn present(
        &self,
        drawable: Drawable,
        commands: &RendererCommands,
        _present_time: Option<Instant>,
    ) {
        let mut log = self.log();
        log.ops.push("present");
        log.presents.push((drawable, commands.clone()));
    }

    fn finish(&self) {
        self.log().ops.push("finish");
    }

    fn release(&self) {
        self.log().ops.push("release");
    }
}

// Controller harness

pub struct HarnessBuilder {
    options: FrontendOptions,
    platform: PlatformKind,
    timestamps: bool,
    storage: Option<PathBuf>,
    content: Option<PathBuf>,
    with_surface: bool,
    fail_drawables: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            options: FrontendOptions::default(),
            platform: PlatformKind::Linux,
            timestamps: true,
            storage: None,
            content: None,
            with_surface: true,
            fail_drawables: false,
        }
    }
}

impl HarnessBuilder {
    pub fn options(mut self, f: impl FnOnce(&mut FrontendOptions)) -> Self {
        f(&mut self.options);
        self
    }

    pub fn platform(mut self, platform: PlatformKind) -> Self {
        self.platform = platform;
        self
    }

    /// Without screen timestamps, frames are driven by draw completion.
    pub fn renderer_time(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = Some(dir.into());
        self
    }

    pub fn content(mut self, path: impl Into<PathBuf>) -> Self {
        self.content = Some(path.into());
        self
    }

    pub fn without_surface(mut self) -> Self {
        self.with_surface = false;
        self
    }

    pub fn failing_drawables(mut self) -> Self {
        self.fail_drawables = true;
        self
    }

    pub fn build(self) -> Harness {
        let host = Rc::new(RecordingHost::new(
            self.platform,
            self.timestamps,
            self.storage,
        ));
        let display = Arc::new(FakeDisplay::new("3.3.0 FakeGL"));
        display.set_fail_drawables(self.fail_drawables);
        let (events, receiver) = control_channel();

        let renderer = Renderer::make_configured(
            display.clone(),
            GlApi::OpenGl,
            PixelFormat::Rgba8888,
            ThreadMode::Single,
            &*host,
            events.clone(),
        )
        .expect("configured renderer");

        let script = Rc::new(RefCell::new(SystemScript {
            content: self.content,
            ..Default::default()
        }));
        let tasks = Rc::new(RefCell::new(Vec::new()));
        let audio = Arc::new(SilentAudio::new(self.options.sound_volume));

        let platform_host: Rc<dyn PlatformHost> = host.clone();
        let audio_output: Arc<dyn AudioOutput> = audio.clone();
        let controller = EmuViewController::new(ControllerParts {
            host: platform_host,
            renderer,
            system: Box::new(ScriptedSystem::new(script.clone())),
            system_task: Box::new(RecordingTask { log: tasks.clone() }),
            video: EmuVideo::new([320, 240]),
            audio: Some(audio_output),
            options: self.options,
            recent: RecentGameList::new(),
            screens: vec![screen(0)],
            view_factory: Box::new(DefaultViewFactory),
            events: events.clone(),
            receiver,
            title: "EmuView Test".to_string(),
        });

        let mut harness = Harness {
            controller,
            host,
            system: script,
            tasks,
            display,
            audio,
            events,
            now: Instant::now(),
        };
        if self.with_surface {
            let main = harness.main();
            harness.controller.on_surface_created(main, [640, 480]);
        }
        harness
    }
}

pub fn screen(id: u32) -> Screen<EmuFrame> {
    Screen::new(ScreenId(id), 60.0, PixelDensity::default())
}

pub struct Harness {
    pub controller: EmuViewController,
    pub host: Rc<RecordingHost>,
    pub system: Rc<RefCell<SystemScript>>,
    pub tasks: Rc<RefCell<Vec<TaskCall>>>,
    pub display: Arc<FakeDisplay>,
    pub audio: Arc<SilentAudio>,
    pub events: ControlEventSender,
    now: Instant,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn main(&self) -> WindowId {
        self.controller.main_window()
    }

    /// One vsync on `screen`, a frame period after the previous one.
    pub fn tick_screen(&mut self, screen: ScreenId) {
        self.now += Duration::from_secs_f64(1.0 / 60.0);
        self.controller.dispatch_screen_frame(screen, self.now);
    }

    pub fn tick(&mut self) {
        self.tick_screen(ScreenId(0));
    }

    /// Ticks through the settling delay until the scheduling tick is
    /// installed.
    pub fn arm_frame_updates(&mut self) {
        for _ in 0..64 {
            if self.controller.state().frame_update_armed() {
                return;
            }
            self.tick();
        }
        panic!("frame updates never armed");
    }

    pub fn finish_video_frame(&mut self) {
        let serial = self.controller.state().frame_serial();
        self.finish_video_frame_with(serial);
    }

    pub fn finish_video_frame_with(&mut self, serial: u64) {
        self.events
            .send(ControlEvent::VideoFrameFinished(serial))
            .expect("send frame finished");
        self.controller.process_events();
    }

    pub fn task_calls(&self) -> Vec<TaskCall> {
        self.tasks.borrow().clone()
    }

    /// `(frames, skip_forward)` of every frame request so far.
    pub fn frame_requests(&self) -> Vec<(u32, bool)> {
        self.tasks
            .borrow()
            .iter()
            .filter_map(|call| match call {
                TaskCall::RunFrame {
                    frames,
                    skip_forward,
                } => Some((*frames, *skip_forward)),
                _ => None,
            })
            .collect()
    }

    pub fn await_render(&self) {
        self.controller.state().renderer().task().await_pending();
    }

    pub fn press(&mut self, window: WindowId, key: Key) -> bool {
        self.controller.dispatch_input_event(window, &pushed(key))
    }

    pub fn view_names(&self) -> Vec<String> {
        self.controller
            .state()
            .view_stack()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
