use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::emu_view::{EmuInputView, EmuView, ToastView};
use super::options::FrontendOptions;
use super::pacing::{FramePacer, SpeedPlan};
use super::recent::RecentGameList;
use super::storage;
use super::system::{EmuSystem, FrameRequest, SystemTask, VideoSystem};
use super::video::{AudioOutput, EmuVideo, EmuVideoLayer};
use super::view::{
    EXIT_CONFIRM_NAME, SYSTEM_ACTIONS_NAME, View, ViewFactory, ViewId,
    ViewStack,
};
use crate::base::events::{
    ControlEvent, ControlEventReceiver, ControlEventSender,
};
use crate::base::host::{PlatformHost, PlatformKind};
use crate::base::lifecycle::{
    Lifecycle, LifecycleHook, RENDERER_ON_EXIT_PRIORITY,
    VIEW_CONTROLLER_ON_EXIT_PRIORITY, VIEW_CONTROLLER_ON_RESUME_PRIORITY,
};
use crate::base::screen::{
    FrameParams, PixelDensity, Screen, ScreenChange, ScreenId,
};
use crate::base::window::{
    DrawParams, SurfaceChange, Window, WindowConfig, WindowContext,
    WindowId, WindowRegistry,
};
use crate::framework::delegates::DelegateSet;
use crate::framework::util::HashMap;
use crate::gfx::{
    DrawTarget, DrawableHolder, Projection, Renderer, RendererCommands,
    Viewport,
};
use crate::input::{DeviceClass, Event};
use crate::ternary;

pub const DEFAULT_FRAME_RATE: f64 = 60.0;

const PAUSED_BRIGHTNESS: f32 = 0.75;
const MENU_BRIGHTNESS: f32 = 0.25;

pub type EmuWindow = Window<ControllerState>;

fn default_frame_time() -> Duration {
    Duration::from_secs_f64(1.0 / DEFAULT_FRAME_RATE)
}

/// Per-frame callbacks registered with a screen or a drawable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EmuFrame {
    /// The scheduling tick. Stays registered while emulation runs.
    Update,
    /// Waits out this many more ticks before installing `Update`.
    Delayed(u8),
}

/// Controller-side state of one window.
#[derive(Debug)]
pub struct WindowData {
    pub drawable: DrawableHolder<EmuFrame>,
    pub screen: ScreenId,
    pub viewport: Viewport,
    pub projection: Projection,
    pub has_emu_view: bool,
    pub has_popup: bool,
    pub focused: bool,
}

impl WindowData {
    pub fn new(window: WindowId, screen: ScreenId) -> Self {
        Self {
            drawable: DrawableHolder::new(window),
            screen,
            viewport: Viewport::default(),
            projection: Projection::default(),
            has_emu_view: false,
            has_popup: false,
            focused: true,
        }
    }
}

/// Everything the controller is built from.
pub struct ControllerParts {
    pub host: Rc<dyn PlatformHost>,
    pub renderer: Renderer,
    pub system: Box<dyn EmuSystem>,
    pub system_task: Box<dyn SystemTask>,
    pub video: EmuVideo,
    pub audio: Option<Arc<dyn AudioOutput>>,
    pub options: FrontendOptions,
    pub recent: RecentGameList,
    pub screens: Vec<Screen<EmuFrame>>,
    pub view_factory: Box<dyn ViewFactory>,
    pub events: ControlEventSender,
    pub receiver: ControlEventReceiver,
    pub title: String,
}

/// State window handlers operate on. Work that needs every window at
/// once is posted back as a [`ControlEvent`].
pub struct ControllerState {
    lifecycle: Lifecycle,
    host: Rc<dyn PlatformHost>,
    events: ControlEventSender,
    title: String,
    options: FrontendOptions,
    system: Box<dyn EmuSystem>,
    system_task: Box<dyn SystemTask>,
    renderer: Renderer,
    audio: Option<Arc<dyn AudioOutput>>,
    emu_view: EmuView,
    emu_input_view: EmuInputView,
    popup: ToastView,
    view_stack: ViewStack,
    view_factory: Box<dyn ViewFactory>,
    recent: RecentGameList,
    recent_changed: bool,
    screens: Vec<Screen<EmuFrame>>,
    window_data: HashMap<WindowId, WindowData>,
    main_window: WindowId,
    extra_window: Option<WindowId>,
    showing_emulation: bool,
    emulation_started: bool,
    emu_video_in_progress: bool,
    frame_serial: u64,
    use_renderer_time: bool,
    target_fast_forward_speed: u32,
    pacer: FramePacer,
}

impl WindowContext for ControllerState {
    fn lifecycle(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }
}

impl ControllerState {
    pub fn lifecycle_hooks(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn host(&self) -> &Rc<dyn PlatformHost> {
        &self.host
    }

    pub fn events(&self) -> &ControlEventSender {
        &self.events
    }

    pub fn options(&self) -> &FrontendOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut FrontendOptions {
        &mut self.options
    }

    pub fn system(&self) -> &dyn EmuSystem {
        self.system.as_ref()
    }

    pub fn system_mut(&mut self) -> &mut dyn EmuSystem {
        self.system.as_mut()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn emu_view(&self) -> &EmuView {
        &self.emu_view
    }

    pub fn emu_input_view(&self) -> &EmuInputView {
        &self.emu_input_view
    }

    pub fn popup(&self) -> &ToastView {
        &self.popup
    }

    pub fn popup_mut(&mut self) -> &mut ToastView {
        &mut self.popup
    }

    pub fn view_stack(&self) -> &ViewStack {
        &self.view_stack
    }

    pub fn recent_games(&self) -> &RecentGameList {
        &self.recent
    }

    /// True once after the recent list changed.
    pub fn take_recent_games_changed(&mut self) -> bool {
        std::mem::take(&mut self.recent_changed)
    }

    pub fn screens(&self) -> &[Screen<EmuFrame>] {
        &self.screens
    }

    pub fn screen(&self, id: ScreenId) -> Option<&Screen<EmuFrame>> {
        self.screens.iter().find(|s| s.id() == id)
    }

    fn screen_mut(&mut self, id: ScreenId) -> Option<&mut Screen<EmuFrame>> {
        self.screens.iter_mut().find(|s| s.id() == id)
    }

    pub fn window_data(&self, id: WindowId) -> Option<&WindowData> {
        self.window_data.get(&id)
    }

    pub fn main_window(&self) -> WindowId {
        self.main_window
    }

    pub fn extra_window(&self) -> Option<WindowId> {
        self.extra_window
    }

    pub fn emu_window(&self) -> WindowId {
        self.emu_view.window()
    }

    pub fn showing_emulation(&self) -> bool {
        self.showing_emulation
    }

    pub fn emu_video_in_progress(&self) -> bool {
        self.emu_video_in_progress
    }

    /// Serial of the most recent frame request.
    pub fn frame_serial(&self) -> u64 {
        self.frame_serial
    }

    pub fn use_renderer_time(&self) -> bool {
        self.use_renderer_time
    }

    pub fn target_fast_forward_speed(&self) -> u32 {
        self.target_fast_forward_speed
    }

    fn post_draw(&self, window: WindowId) {
        let _ = self.events.send(ControlEvent::PostDraw(window));
    }

    fn post_draw_to_emu_window(&self) {
        self.post_draw(self.emu_window());
    }

    fn emu_window_screen(&self) -> Option<&Screen<EmuFrame>> {
        let data = self.window_data.get(&self.emu_window())?;
        self.screen(data.screen)
    }

    fn frame_params_for(&self, window: WindowId, now: Instant) -> FrameParams {
        self.window_data
            .get(&window)
            .and_then(|data| self.screen(data.screen))
            .map(|screen| screen.frame_params(now))
            .unwrap_or_else(|| {
                FrameParams::new(now, default_frame_time())
            })
    }

    // Frame scheduling

    /// Runs one frame delegate. Returns false to deregister it.
    fn on_frame(&mut self, delegate: EmuFrame, params: FrameParams) -> bool {
        match delegate {
            EmuFrame::Delayed(delay) => {
                if delay > 0 {
                    self.add_on_frame_delegate(EmuFrame::Delayed(delay - 1));
                } else if self.system.is_active() {
                    self.add_on_frame_delegate(EmuFrame::Update);
                }
                if self.use_renderer_time {
                    self.post_draw_to_emu_window();
                }
                false
            }
            EmuFrame::Update => {
                self.on_frame_update(params);
                true
            }
        }
    }

    fn on_frame_update(&mut self, params: FrameParams) {
        if self.emu_video_in_progress {
            // frame not ready yet, retry on the next tick
            if self.use_renderer_time {
                self.post_draw_to_emu_window();
            }
            return;
        }

        let speed = SpeedPlan::new(
            self.system.should_fast_forward(),
            self.target_fast_forward_speed,
        );
        self.system.set_speed_multiplier(speed.multiplier);

        let advanced = self.system.advance_frames_with_time(params.timestamp());
        if advanced == 0 {
            if self.use_renderer_time {
                self.post_draw_to_emu_window();
            }
            return;
        }

        let plan = self.pacer.plan(
            advanced,
            speed,
            self.options.skip_late_frames,
            self.options.frame_interval(),
        );
        if plan.resync {
            debug!("re-syncing frame time after a run of late frames");
            self.system.reset_frame_time();
        }

        trace!(
            "advanced:{} emulating:{} skip:{}",
            advanced, plan.frames, speed.skip_forward
        );
        self.emu_video_in_progress = true;
        self.frame_serial += 1;
        self.system_task.run_frame(FrameRequest {
            serial: self.frame_serial,
            video: self.emu_view.layer().video().clone(),
            audio: self.audio.clone(),
            frames: plan.frames,
            skip_forward: speed.skip_forward,
        });

        let emu_window = self.emu_window();
        if let Some(data) = self.window_data.get_mut(&emu_window) {
            data.drawable.set_presentation_time(params.present_time());
        }
    }

    fn add_on_frame_delegate(&mut self, delegate: EmuFrame) {
        let emu_window = self.emu_window();
        let use_renderer_time = self.use_renderer_time;
        let Some(data) = self.window_data.get_mut(&emu_window) else {
            return;
        };

        if use_renderer_time {
            data.drawable.add_on_frame(delegate, 0);
            data.drawable.notify_on_frame();
            self.post_draw(emu_window);
        } else {
            let screen = data.screen;
            if let Some(screen) = self.screen_mut(screen) {
                screen.add_on_frame(delegate, 0);
            }
        }
    }

    /// Installs `Update` after a settling delay of a quarter second of
    /// ticks, letting a fresh timestamp source stabilize.
    fn add_on_frame_delayed(&mut self) {
        let rate = self
            .emu_window_screen()
            .map(|screen| screen.frame_rate())
            .unwrap_or(DEFAULT_FRAME_RATE);
        let delay = (rate / 4.0).clamp(0.0, u8::MAX as f64) as u8;
        trace!("delaying frame updates by {} ticks", delay);
        self.add_on_frame_delegate(EmuFrame::Delayed(delay));
    }

    fn remove_on_frame(&mut self) {
        let emu_window = self.emu_window();
        let use_renderer_time = self.use_renderer_time;
        let Some(data) = self.window_data.get_mut(&emu_window) else {
            return;
        };

        if use_renderer_time {
            data.drawable.remove_on_frame(&EmuFrame::Update);
            if data.drawable.on_frame().is_empty() {
                data.drawable.cancel_notify_on_frame();
            }
        } else {
            let screen = data.screen;
            if let Some(screen) = self.screen_mut(screen) {
                screen.remove_on_frame(&EmuFrame::Update);
            }
        }
    }

    /// Drops the scheduling tick from `from`'s frame source and arms the
    /// emulation window's source through the settling delay.
    fn move_on_frame(&mut self, from: WindowId, to: WindowId) {
        if from == to {
            return;
        }

        let use_renderer_time = self.use_renderer_time;
        let mut from_screen = None;
        if let Some(data) = self.window_data.get_mut(&from) {
            if use_renderer_time {
                data.drawable.on_frame_mut().clear();
                data.drawable.cancel_notify_on_frame();
            } else {
                from_screen = Some(data.screen);
            }
        }
        if let Some(screen) = from_screen.and_then(|id| self.screen_mut(id)) {
            screen.on_frame_mut().clear();
        }

        if self.emu_window() == to {
            self.add_on_frame_delayed();
        }
    }

    /// Whether `Update` is registered with the emulation window's frame
    /// source.
    pub fn frame_update_armed(&self) -> bool {
        let Some(data) = self.window_data.get(&self.emu_window()) else {
            return false;
        };
        if self.use_renderer_time {
            data.drawable.on_frame().contains(&EmuFrame::Update)
        } else {
            self.screen(data.screen).is_some_and(|screen| {
                screen.on_frame().contains(&EmuFrame::Update)
            })
        }
    }

    /// Frame time per video system, from the option override or the
    /// emulation screen.
    pub fn apply_frame_rates(&mut self) {
        let screen_frame_time = self
            .emu_window_screen()
            .map(|screen| screen.frame_time())
            .unwrap_or_else(default_frame_time);
        let frame_time = |rate: Option<f64>| {
            rate.filter(|hz| *hz > 0.0)
                .map(|hz| Duration::from_secs_f64(1.0 / hz))
                .unwrap_or(screen_frame_time)
        };

        let ntsc = frame_time(self.options.frame_rate_ntsc);
        let pal = frame_time(self.options.frame_rate_pal);
        self.system.set_frame_time(VideoSystem::Ntsc, ntsc);
        self.system.set_frame_time(VideoSystem::Pal, pal);
        self.system.config_frame_time(self.options.sound_rate);
    }

    // Emulation state

    pub fn start_emulation(&mut self) {
        if self.emulation_started {
            return;
        }

        self.emulation_started = true;
        self.host.set_cpu_needs_low_latency(true);
        self.system_task.start();
        self.system.start();
        self.emu_view.layer_mut().set_brightness(1.0);
        self.pacer.reset();
        self.add_on_frame_delayed();
    }

    pub fn pause_emulation(&mut self) {
        self.emulation_started = false;
        self.host.set_cpu_needs_low_latency(false);
        self.system_task.pause();
        self.system.pause();
        let showing = self.showing_emulation;
        let brightness = ternary!(showing, PAUSED_BRIGHTNESS, MENU_BRIGHTNESS);
        self.emu_view.layer_mut().set_brightness(brightness);
        self.set_fast_forward_active(false);
        self.emu_video_in_progress = false;
        self.remove_on_frame();
    }

    pub fn set_fast_forward_active(&mut self, active: bool) {
        self.target_fast_forward_speed =
            ternary!(active, self.options.fast_forward_speed, 0);

        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        audio.set_add_buffers_on_underrun(
            active && self.options.add_sound_buffers_on_underrun,
        );
        let volume = if active && !self.options.sound_during_fast_forward {
            0.0
        } else {
            self.options.sound_volume
        };
        audio.set_volume(volume);
    }

    fn configure_app_for_emulation(&self, running: bool) {
        self.host.set_idle_display_power_save(ternary!(
            running,
            self.options.idle_display_power_save,
            true
        ));
        self.host.apply_os_nav_style(running);
        self.host.set_hint_key_repeat(!running);
    }

    fn all_windows_are_focused(&self) -> bool {
        self.window_data.values().all(|data| data.focused)
    }

    fn on_window_focus_change(&mut self, window: WindowId, focused: bool) {
        if let Some(data) = self.window_data.get_mut(&window) {
            data.focused = focused;
        }
        self.on_focus_change(focused);
    }

    fn on_focus_change(&mut self, focused: bool) {
        if !self.showing_emulation {
            return;
        }

        if focused && self.system.is_paused() {
            info!("resuming emulation due to window focus");
            self.emu_input_view.reset_input();
            self.start_emulation();
        } else if self.options.pause_unfocused
            && !self.system.is_paused()
            && !self.all_windows_are_focused()
        {
            info!("pausing emulation with all windows unfocused");
            self.pause_emulation();
            self.post_draw_to_emu_window();
        }
    }

    // Views and layout

    fn move_emu_view_to_window(&mut self, window: WindowId) {
        let orig = self.emu_view.window();
        if orig == window || !self.window_data.contains_key(&window) {
            return;
        }

        if let Some(data) = self.window_data.get_mut(&orig) {
            data.has_emu_view = false;
        }
        if let Some(data) = self.window_data.get_mut(&window) {
            data.has_emu_view = true;
            self.emu_view.set_window(window);
            self.emu_view.set_view_rect(data.viewport.bounds());
        }
    }

    fn move_popup_to_window(&mut self, window: WindowId) {
        let orig = self.popup.window();
        if orig == window || !self.window_data.contains_key(&window) {
            return;
        }

        if let Some(data) = self.window_data.get_mut(&orig) {
            data.has_popup = false;
        }
        if let Some(data) = self.window_data.get_mut(&window) {
            data.has_popup = true;
            self.popup.set_window(window);
        }
    }

    pub fn place_emu_views(&mut self) {
        self.emu_view.place();
        self.emu_input_view.place();
    }

    pub fn place_elements(&mut self) {
        if let Some(data) = self.window_data.get(&self.popup.window()) {
            self.popup.set_view_rect(data.viewport.bounds());
            self.popup.place();
        }
        self.place_emu_views();
        if let Some(data) = self.window_data.get(&self.main_window) {
            self.view_stack.place(data.viewport.bounds());
        }
    }

    fn show_exit_alert(&mut self) {
        if self.view_stack.contains(EXIT_CONFIRM_NAME) {
            return;
        }
        let view = self.view_factory.make_view(ViewId::ExitConfirm);
        self.view_stack.push_and_show(view, false, true);
    }

    fn should_exit_from_root_without_prompt(&self, event: &Event) -> bool {
        event.class == DeviceClass::System
            && matches!(
                self.host.platform(),
                PlatformKind::Android | PlatformKind::Linux
            )
    }

    /// Routes input to the emulation while it shows, else to the top
    /// view, with the cancel and menu gestures handled here.
    pub fn input_event(&mut self, event: &Event) -> bool {
        if self.showing_emulation {
            return self.emu_input_view.input_event(event, &self.events);
        }

        if self.view_stack.input_event(event, &self.events) {
            return true;
        }

        if event.pushed() && event.is_default_cancel_button() {
            if self.view_stack.len() <= 1 {
                if self.system.has_content()
                    || !self.should_exit_from_root_without_prompt(event)
                {
                    self.show_exit_alert();
                } else {
                    self.host.exit();
                }
            } else {
                self.view_stack.pop_and_show();
            }
            return true;
        }

        if event.pushed()
            && event.is_menu_dismiss_key()
            && !self.view_stack.has_modal_view()
        {
            if self.system.has_content() {
                let _ = self.events.send(ControlEvent::ShowEmulation);
            }
            return true;
        }

        false
    }

    // Window handlers

    fn update_drawable_for_surface_change(
        &self,
        win: &EmuWindow,
        change: SurfaceChange,
    ) {
        let drawable = self
            .window_data
            .get(&win.id())
            .and_then(|data| data.drawable.drawable());
        if let Some(drawable) = drawable {
            self.renderer.task().update_drawable_for_surface_change(
                drawable,
                change,
                win.real_size(),
            );
        }
    }

    fn update_window_viewport(&mut self, win: &EmuWindow) -> Option<[i32; 4]> {
        let data = self.window_data.get_mut(&win.id())?;
        data.viewport = Viewport::from_size(win.size());
        data.projection = Projection::for_viewport(&data.viewport);
        Some(data.viewport.bounds())
    }

    fn on_main_surface_change(
        &mut self,
        win: &EmuWindow,
        change: SurfaceChange,
    ) {
        self.update_drawable_for_surface_change(win, change);
        if !change.resized() {
            return;
        }

        let Some(bounds) = self.update_window_viewport(win) else {
            return;
        };
        let has_emu_view = self
            .window_data
            .get(&win.id())
            .is_some_and(|data| data.has_emu_view);
        if has_emu_view {
            self.emu_view.set_view_rect(bounds);
        }
        self.emu_input_view.set_view_rect(bounds);
        self.place_elements();
    }

    fn on_extra_surface_change(
        &mut self,
        win: &EmuWindow,
        change: SurfaceChange,
    ) {
        self.update_drawable_for_surface_change(win, change);
        if !change.resized() {
            return;
        }

        info!("view resize for extra window");
        let Some(bounds) = self.update_window_viewport(win) else {
            return;
        };
        if self.emu_view.window() == win.id() {
            self.emu_view.set_view_rect(bounds);
            self.emu_view.place();
        }
    }

    /// Returns true when the draw completed without going to the render
    /// task.
    fn draw_window(&mut self, win: &EmuWindow, params: DrawParams) -> bool {
        let id = win.id();
        let is_main = id == self.main_window;
        let in_progress = self.emu_video_in_progress;
        let Some(data) = self.window_data.get_mut(&id) else {
            return true;
        };

        if (data.has_emu_view || !is_main) && in_progress {
            trace!("waiting for emu video to signal draw");
            return true;
        }
        let Some(drawable) = data.drawable.drawable() else {
            return true;
        };

        let target = DrawTarget {
            drawable,
            window: id,
            present_time: data.drawable.take_presentation_time(),
        };
        let viewport = data.viewport;
        let projection = data.projection;
        let has_emu_view = data.has_emu_view;
        let has_popup = data.has_popup;

        let this = &*self;
        this.renderer
            .task()
            .draw(target, params, viewport, projection, |cmds| {
                cmds.clear();
                if is_main {
                    this.record_main_window(cmds, has_emu_view, has_popup);
                } else {
                    this.record_extra_window(cmds, has_popup);
                }
            });
        false
    }

    fn record_main_window(
        &self,
        cmds: &mut RendererCommands,
        has_emu_view: bool,
        has_popup: bool,
    ) {
        if has_emu_view {
            self.emu_view.draw(cmds);
        }
        if self.showing_emulation {
            self.emu_input_view.draw(cmds);
        } else {
            self.view_stack.draw(cmds);
        }
        if has_popup {
            self.popup.draw(cmds);
        }
        cmds.present();
    }

    fn record_extra_window(
        &self,
        cmds: &mut RendererCommands,
        has_popup: bool,
    ) {
        self.emu_view.draw(cmds);
        if has_popup {
            self.popup.draw(cmds);
        }
        cmds.present();
    }

    fn on_extra_window_dismiss(&mut self, window: WindowId) {
        self.system.reset_frame_time();
        info!("setting emu view on main window");
        let main = self.main_window;
        self.move_emu_view_to_window(main);
        self.move_popup_to_window(main);
        self.place_emu_views();
        self.post_draw(main);
        if self.system.is_active() {
            self.move_on_frame(window, main);
            self.apply_frame_rates();
        }
    }

    fn free_window(&mut self, window: WindowId) {
        if let Some(mut data) = self.window_data.remove(&window) {
            data.drawable
                .destroy_drawable(self.renderer.task(), &mut self.lifecycle);
        }
        self.renderer.task().await_pending();
        if self.extra_window == Some(window) {
            self.extra_window = None;
        }
        debug!("freed window:{}", window.0);
    }

    fn main_window_config(
        screen: ScreenId,
        title: &str,
        density: PixelDensity,
    ) -> WindowConfig<ControllerState> {
        WindowConfig::new(screen)
            .with_title(title)
            .with_density(density)
            .on_input_event(|st: &mut ControllerState, win, event| {
                let handled = st.input_event(event);
                if handled && !st.showing_emulation {
                    win.post_draw();
                }
                handled
            })
            .on_focus_change(|st: &mut ControllerState, win, focused| {
                st.on_window_focus_change(win.id(), focused);
            })
            .on_drag_drop(|st: &mut ControllerState, _win, path| {
                info!("got DnD: {}", path.display());
                let _ = st
                    .events
                    .send(ControlEvent::OpenFile(path.to_path_buf()));
            })
            .on_surface_change(|st: &mut ControllerState, win, change| {
                st.on_main_surface_change(win, change);
            })
            .on_draw(|st: &mut ControllerState, win, params| {
                st.draw_window(win, params)
            })
            .on_free(|st: &mut ControllerState, id| st.free_window(id))
    }

    fn extra_window_config(
        screen: ScreenId,
        title: &str,
        density: PixelDensity,
    ) -> WindowConfig<ControllerState> {
        WindowConfig::new(screen)
            .with_title(title)
            .with_density(density)
            .on_surface_change(|st: &mut ControllerState, win, change| {
                st.on_extra_surface_change(win, change);
            })
            .on_draw(|st: &mut ControllerState, win, params| {
                st.draw_window(win, params)
            })
            .on_input_event(|st: &mut ControllerState, _win, event| {
                if st.system.is_active() && event.is_key() {
                    return st.emu_input_view.input_event(event, &st.events);
                }
                false
            })
            .on_focus_change(|st: &mut ControllerState, win, focused| {
                st.on_window_focus_change(win.id(), focused);
            })
            .on_dismiss_request(|st: &mut ControllerState, win| {
                let _ = st.events.send(ControlEvent::DismissWindow(win.id()));
            })
            .on_dismiss(|st: &mut ControllerState, win| {
                st.on_extra_window_dismiss(win.id());
            })
            .on_free(|st: &mut ControllerState, id| st.free_window(id))
    }
}

/// Top-level orchestrator: switches between the menu UI and the running
/// emulation, drives the per-frame scheduling tick, and moves the
/// emulation between windows as screens come and go.
///
/// Every entry point drains the control event queue before returning.
pub struct EmuViewController {
    windows: WindowRegistry<ControllerState>,
    state: ControllerState,
    receiver: ControlEventReceiver,
}

impl EmuViewController {
    pub fn new(parts: ControllerParts) -> Self {
        let ControllerParts {
            host,
            renderer,
            system,
            system_task,
            video,
            audio,
            options,
            recent,
            mut screens,
            view_factory,
            events,
            receiver,
            title,
        } = parts;

        if screens.is_empty() {
            screens.push(Screen::new(
                ScreenId(0),
                DEFAULT_FRAME_RATE,
                PixelDensity::default(),
            ));
        }
        let main_screen = screens[0].id();
        let density = screens[0].density();

        // Views point at the main window once it exists.
        let unassigned = WindowId(0);
        let mut state = ControllerState {
            lifecycle: Lifecycle::new(),
            host: host.clone(),
            events,
            title,
            options,
            system,
            system_task,
            renderer,
            audio,
            emu_view: EmuView::new(EmuVideoLayer::new(video), unassigned),
            emu_input_view: EmuInputView::new(unassigned),
            popup: ToastView::new(unassigned),
            view_stack: ViewStack::new(),
            view_factory,
            recent,
            recent_changed: false,
            screens,
            window_data: HashMap::default(),
            main_window: unassigned,
            extra_window: None,
            showing_emulation: false,
            emulation_started: false,
            emu_video_in_progress: false,
            frame_serial: 0,
            use_renderer_time: false,
            target_fast_forward_speed: 0,
            pacer: FramePacer::new(),
        };

        let mut windows = WindowRegistry::new();
        let config = ControllerState::main_window_config(
            main_screen,
            &state.title,
            density,
        );
        let main = windows.create(config, host, &mut state);
        state.main_window = main;
        state.emu_view.set_window(main);
        state.emu_input_view.set_window(main);
        state.popup.set_window(main);

        let mut data = WindowData::new(main, main_screen);
        data.has_emu_view = true;
        data.has_popup = true;
        state.window_data.insert(main, data);

        let mut controller = Self {
            windows,
            state,
            receiver,
        };
        controller.init_views();
        controller
    }

    fn init_views(&mut self) {
        let st = &mut self.state;
        st.lifecycle.add_on_exit(
            LifecycleHook::ViewController,
            VIEW_CONTROLLER_ON_EXIT_PRIORITY,
        );
        st.lifecycle.add_on_resume(
            LifecycleHook::ViewController,
            VIEW_CONTROLLER_ON_RESUME_PRIORITY,
        );
        st.lifecycle
            .add_on_exit(LifecycleHook::Renderer, RENDERER_ON_EXIT_PRIORITY);

        let rate = st
            .emu_window_screen()
            .map(|screen| screen.frame_rate())
            .unwrap_or(DEFAULT_FRAME_RATE);
        st.use_renderer_time = !st.host.screen_supports_timestamps()
            && (st.host.platform() != PlatformKind::Linux || rate < 100.0);
        info!(
            "timestamp source:{}",
            if st.use_renderer_time {
                "renderer"
            } else {
                "screen"
            }
        );

        st.view_stack.set_nav_right_button(false);
        st.view_stack.show_nav_view(st.options.title_bar);
        st.place_elements();

        let main_menu = st.view_factory.make_view(ViewId::MainMenu);
        self.push_and_show(main_menu, true);
        self.state.apply_frame_rates();
        self.process_events();
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    pub fn windows(&self) -> &WindowRegistry<ControllerState> {
        &self.windows
    }

    pub fn window(&self, id: WindowId) -> Option<&EmuWindow> {
        self.windows.get(id)
    }

    pub fn main_window(&self) -> WindowId {
        self.state.main_window
    }

    fn post_draw(&mut self, id: WindowId) {
        if let Some(win) = self.windows.get_mut(id) {
            win.post_draw();
        }
    }

    // Control events

    /// Handles everything queued by handlers, views, and background
    /// tasks.
    pub fn process_events(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: ControlEvent) {
        trace!("control event {:?}", event);
        match event {
            ControlEvent::VideoFrameFinished(serial) => {
                if serial != self.state.frame_serial {
                    debug!("dropping stale finished frame {}", serial);
                    return;
                }
                self.state.emu_video_in_progress = false;
                let emu_window = self.state.emu_window();
                self.post_draw(emu_window);
            }
            ControlEvent::DrawFinished(id) => self.on_draw_finished(id),
            ControlEvent::PostDraw(id) => self.post_draw(id),
            ControlEvent::DismissWindow(id) => {
                self.windows.dismiss(id, &mut self.state);
            }
            ControlEvent::ShowEmulation => {
                if self.state.system.has_content() {
                    self.show_emulation();
                }
            }
            ControlEvent::ShowUi => self.show_ui(true),
            ControlEvent::ShowSystemActions => self.show_system_actions_view(),
            ControlEvent::CloseSystem { allow_autosave } => {
                self.close_system(allow_autosave);
            }
            ControlEvent::OpenFile(path) => {
                self.handle_open_file_command(&path);
            }
            ControlEvent::LaunchSystem {
                load_autosave,
                add_to_recent,
            } => self.launch_system(load_autosave, add_to_recent),
            ControlEvent::PopView => {
                self.state.view_stack.pop_and_show();
                let main = self.state.main_window;
                self.post_draw(main);
            }
            ControlEvent::Exit => self.state.host.exit(),
        }
    }

    fn on_draw_finished(&mut self, id: WindowId) {
        if let Some(win) = self.windows.get_mut(id) {
            win.deferred_draw_complete();
        }

        let notified = self
            .state
            .window_data
            .get_mut(&id)
            .is_some_and(|data| data.drawable.take_frame_notification());
        if notified {
            self.dispatch_drawable_frame(id, Instant::now());
        }
    }

    /// Runs the frame callbacks bound to `window`'s drawable against one
    /// timestamp snapshot, then re-arms the notification.
    pub fn dispatch_drawable_frame(&mut self, window: WindowId, now: Instant) {
        let params = self.state.frame_params_for(window, now);
        DelegateSet::run_all_in(
            &mut self.state,
            |st: &mut ControllerState| {
                st.window_data
                    .get_mut(&window)
                    .map(|data| data.drawable.on_frame_mut())
            },
            |st, delegate| st.on_frame(*delegate, params),
        );

        if let Some(data) = self.state.window_data.get_mut(&window) {
            data.drawable.notify_on_frame();
        }
        self.process_events();
    }

    /// Vsync from `screen`. Every callback sees the same timestamp.
    pub fn dispatch_screen_frame(&mut self, screen: ScreenId, now: Instant) {
        let Some(params) =
            self.state.screen(screen).map(|s| s.frame_params(now))
        else {
            return;
        };

        DelegateSet::run_all_in(
            &mut self.state,
            |st: &mut ControllerState| {
                st.screen_mut(screen).map(|s| s.on_frame_mut())
            },
            |st, delegate| st.on_frame(*delegate, params),
        );
        self.process_events();
    }

    // Mode transitions

    pub fn show_emulation(&mut self) {
        if self.state.showing_emulation {
            return;
        }

        info!("showing emulation");
        if let Some(top) = self.state.view_stack.top_mut() {
            top.on_hide();
        }
        self.state.showing_emulation = true;
        self.state.configure_app_for_emulation(true);
        let emu_window = self.state.emu_window();
        self.configure_window_for_emulation(emu_window, true);
        self.state.popup.clear();
        self.state.emu_input_view.reset_input();
        self.state.start_emulation();
        self.state.place_emu_views();
        self.post_draw(emu_window);
        let main = self.state.main_window;
        self.post_draw(main);
    }

    pub fn show_ui(&mut self, update_top_view: bool) {
        if !self.state.showing_emulation {
            return;
        }

        info!("showing UI");
        self.state.showing_emulation = false;
        self.state.pause_emulation();
        self.state.configure_app_for_emulation(false);
        let emu_window = self.state.emu_window();
        self.configure_window_for_emulation(emu_window, false);
        self.post_draw(emu_window);
        if update_top_view {
            self.state.view_stack.show();
            let main = self.state.main_window;
            self.post_draw(main);
        }
    }

    pub fn start_emulation(&mut self) {
        self.state.start_emulation();
        self.process_events();
    }

    pub fn pause_emulation(&mut self) {
        self.state.pause_emulation();
        self.process_events();
    }

    pub fn set_fast_forward_active(&mut self, active: bool) {
        self.state.set_fast_forward_active(active);
    }

    fn configure_window_for_emulation(
        &mut self,
        window: WindowId,
        running: bool,
    ) {
        let st = &mut self.state;
        let mask = if running {
            st.options.game_orientation
        } else {
            st.options.menu_orientation
        };
        let rate = ternary!(running, st.system.frame_rate(), 0.0);
        if let Some(win) = self.windows.get_mut(window) {
            st.renderer.set_window_valid_orientations(win, mask);
            win.set_intended_frame_rate(rate);
        }

        let popup_window = if running {
            st.emu_view.window()
        } else {
            st.emu_input_view.window()
        };
        st.move_popup_to_window(popup_window);
    }

    /// Back to the menu with the emulated system torn down.
    pub fn close_system(&mut self, allow_autosave: bool) {
        self.show_ui(true);
        self.state.system_task.stop();
        self.state.system.close_runtime_system(allow_autosave);
        self.state.view_stack.set_nav_right_button(false);
        if let Some(idx) = self.state.view_stack.view_idx(SYSTEM_ACTIONS_NAME)
        {
            if idx > 0 {
                // pop to the menu below System Actions
                self.state.view_stack.pop_to(idx - 1);
            }
        }
        let main = self.state.main_window;
        self.post_draw(main);
    }

    pub fn launch_system(&mut self, load_autosave: bool, add_to_recent: bool) {
        self.pop_modal_views();
        let st = &mut self.state;
        if load_autosave {
            if let Err(err) = st.system.load_auto_save_state() {
                warn!("error loading auto-save state: {}", err);
                st.popup.post(err);
            }
        }
        if add_to_recent {
            if let Some(path) = st.system.content_path() {
                st.recent.add_recent_game(path, st.system.content_name());
                st.recent_changed = true;
            }
        }
        self.show_emulation();
    }

    // View stack

    pub fn push_and_show(&mut self, view: Box<dyn View>, needs_nav: bool) {
        self.show_ui(false);
        self.state.view_stack.push_and_show(view, needs_nav, false);
        let main = self.state.main_window;
        self.post_draw(main);
    }

    pub fn push_and_show_modal(
        &mut self,
        view: Box<dyn View>,
        needs_nav: bool,
    ) {
        self.show_ui(false);
        self.state.view_stack.push_and_show(view, needs_nav, true);
        let main = self.state.main_window;
        self.post_draw(main);
    }

    pub fn pop(&mut self) {
        self.state.view_stack.pop();
    }

    pub fn pop_to(&mut self, idx: usize) {
        self.state.view_stack.pop_to(idx);
    }

    pub fn pop_to_root(&mut self) {
        self.state.view_stack.pop_to_root();
    }

    pub fn pop_modal_views(&mut self) {
        self.state.view_stack.pop_modal_views();
    }

    pub fn has_modal_view(&self) -> bool {
        self.state.view_stack.has_modal_view()
    }

    pub fn dismiss_view(&mut self, idx: usize, refresh_layout: bool) -> bool {
        let refresh = !self.state.showing_emulation && refresh_layout;
        self.state.view_stack.dismiss_view(idx, refresh)
    }

    pub fn show_system_actions_view(&mut self) {
        self.show_ui(true);
        if !self.state.view_stack.contains(SYSTEM_ACTIONS_NAME) {
            let view = self.state.view_factory.make_view(ViewId::SystemActions);
            self.push_and_show(view, true);
        }
    }

    pub fn pop_to_system_actions_menu(&mut self) {
        if let Some(idx) = self.state.view_stack.view_idx(SYSTEM_ACTIONS_NAME)
        {
            self.pop_to(idx);
        }
    }

    pub fn on_system_created(&mut self) {
        self.state.view_stack.set_nav_right_button(true);
    }

    pub fn show_nav_view(&mut self, show: bool) {
        self.state.view_stack.show_nav_view(show);
    }

    pub fn set_on_screen_controls(&mut self, on: bool) {
        self.state.emu_input_view.set_touch_controls_on(on);
        self.state.place_emu_views();
    }

    // Files

    pub fn handle_open_file_command(&mut self, path: &Path) {
        if path.is_dir() {
            info!("changing to dir {} from external command", path.display());
            self.show_ui(false);
            self.pop_to_root();
            self.state.system.set_media_search_path(path);
            let view = self
                .state
                .view_factory
                .make_view(ViewId::FilePicker(path.to_path_buf()));
            self.push_and_show(view, false);
            return;
        }

        if !path.is_file() || !self.state.system.accepts_file(path) {
            info!("unrecognized file type: {}", path.display());
            return;
        }

        info!("opening file {} from external command", path.display());
        self.show_ui(true);
        self.pop_to_root();
        self.open_content(path);
    }

    fn open_content(&mut self, path: &Path) {
        if self.state.system.has_content() {
            let autosave = self.state.options.auto_save_state;
            self.close_system(autosave);
        }

        if let Err(err) = self.state.system.load_content(path) {
            warn!("error loading {}: {}", path.display(), err);
            self.state.popup.post(err);
            let main = self.state.main_window;
            self.post_draw(main);
            return;
        }

        self.on_system_created();
        if !self.show_auto_state_confirm(true) {
            self.launch_system(false, true);
        }
    }

    /// Asks before resuming from an existing auto-save. Returns whether
    /// the prompt was shown.
    pub fn show_auto_state_confirm(&mut self, add_to_recent: bool) -> bool {
        let options = &self.state.options;
        if !(options.confirm_auto_load_state && options.auto_save_state) {
            return false;
        }
        let Some(path) = self.state.system.auto_save_state_path() else {
            return false;
        };
        let Some(modified) = storage::autosave_modified_time(&path) else {
            return false;
        };

        let view = self.state.view_factory.make_view(ViewId::AutoStateConfirm {
            modified,
            add_to_recent,
        });
        self.push_and_show_modal(view, false);
        true
    }

    // Screens and extra windows

    pub fn add_screen(&mut self, screen: Screen<EmuFrame>) {
        let id = screen.id();
        if self.state.screen(id).is_some() {
            return;
        }
        self.state.screens.push(screen);
        self.on_screen_change(id, ScreenChange::Added);
        self.process_events();
    }

    pub fn remove_screen(&mut self, id: ScreenId) {
        if self.state.screen(id).is_none() {
            return;
        }
        self.on_screen_change(id, ScreenChange::Removed);
        self.state.screens.retain(|s| s.id() != id);
        self.process_events();
    }

    pub fn on_screen_change(&mut self, screen: ScreenId, change: ScreenChange) {
        match change {
            ScreenChange::Added => {
                info!("screen added");
                if self.state.options.show_on_second_screen
                    && self.state.screens.len() > 1
                {
                    self.set_emu_view_on_extra_window(true, screen);
                }
            }
            ScreenChange::Removed => {
                info!("screen removed");
                let on_screen = self
                    .state
                    .extra_window
                    .and_then(|id| self.state.window_data.get(&id))
                    .is_some_and(|data| data.screen == screen);
                if on_screen {
                    self.set_emu_view_on_extra_window(false, screen);
                }
            }
        }
    }

    pub fn set_emu_view_on_extra_window(&mut self, on: bool, screen: ScreenId) {
        if !on {
            if let Some(id) = self.state.extra_window {
                self.windows.dismiss(id, &mut self.state);
            }
            return;
        }
        if self.state.extra_window.is_some() {
            return;
        }

        info!("setting emu view on extra window");
        let density = self
            .state
            .screen(screen)
            .map(|s| s.density())
            .unwrap_or_default();
        let config = ControllerState::extra_window_config(
            screen,
            &self.state.title,
            density,
        );
        let host = self.state.host.clone();
        let id = self.windows.create(config, host, &mut self.state);
        self.state.window_data.insert(id, WindowData::new(id, screen));
        self.state.extra_window = Some(id);

        let main = self.state.main_window;
        self.state.move_emu_view_to_window(id);
        if self.state.system.is_active() {
            self.state.move_on_frame(main, id);
            self.state.apply_frame_rates();
        }
        self.state.place_emu_views();
        self.post_draw(main);
    }

    // Platform window events

    /// The platform surface for `window` exists with `size` physical
    /// pixels.
    pub fn on_surface_created(&mut self, window: WindowId, size: [i32; 2]) {
        let Some(win) = self.windows.get_mut(window) else {
            warn!("surface for unknown window:{}", window.0);
            return;
        };
        win.set_has_surface(true);
        win.update_size(size);

        let st = &mut self.state;
        if let Some(data) = st.window_data.get_mut(&window) {
            let bound = data.drawable.make_drawable(
                &st.renderer,
                win.real_size(),
                &mut st.lifecycle,
            );
            if bound && !data.drawable.on_frame().is_empty() {
                data.drawable.notify_on_frame();
            }
        }
        win.post_draw();
        self.process_events();
    }

    pub fn on_surface_resized(&mut self, window: WindowId, size: [i32; 2]) {
        if let Some(win) = self.windows.get_mut(window) {
            if win.update_size(size) {
                win.post_draw();
            }
        }
        self.process_events();
    }

    pub fn on_surface_destroyed(&mut self, window: WindowId) {
        if let Some(win) = self.windows.get_mut(window) {
            win.set_has_surface(false);
        }
        let st = &mut self.state;
        if let Some(data) = st.window_data.get_mut(&window) {
            data.drawable
                .destroy_drawable(st.renderer.task(), &mut st.lifecycle);
        }
        self.process_events();
    }

    /// Draws `window` if a draw was posted. Returns whether it drew.
    pub fn dispatch_draw(
        &mut self,
        window: WindowId,
        needs_sync: bool,
    ) -> bool {
        let drew = match self.windows.get_mut(window) {
            Some(win) => win.dispatch_on_draw(&mut self.state, needs_sync),
            None => false,
        };
        self.process_events();
        drew
    }

    pub fn dispatch_input_event(
        &mut self,
        window: WindowId,
        event: &Event,
    ) -> bool {
        let handled = match self.windows.get_mut(window) {
            Some(win) => win.dispatch_input_event(&mut self.state, event),
            None => false,
        };
        self.process_events();
        handled
    }

    pub fn dispatch_focus_change(&mut self, window: WindowId, focused: bool) {
        if let Some(win) = self.windows.get_mut(window) {
            win.dispatch_focus_change(&mut self.state, focused);
        }
        self.process_events();
    }

    pub fn dispatch_drag_drop(&mut self, window: WindowId, path: &Path) {
        if let Some(win) = self.windows.get_mut(window) {
            win.dispatch_drag_drop(&mut self.state, path);
        }
        self.process_events();
    }

    pub fn dispatch_dismiss_request(&mut self, window: WindowId) {
        if let Some(win) = self.windows.get_mut(window) {
            win.dispatch_dismiss_request(&mut self.state);
        }
        self.process_events();
    }

    // App lifecycle

    /// Runs the exit hooks. Backgrounding keeps GPU resources around with
    /// their caches freed; a full exit releases everything.
    pub fn on_app_exit(&mut self, backgrounded: bool) {
        info!("app exit, backgrounded:{}", backgrounded);
        DelegateSet::run_all_in(
            self,
            |c: &mut EmuViewController| {
                Some(c.state.lifecycle.on_exit_hooks())
            },
            |c, hook| {
                c.run_exit_hook(*hook, backgrounded);
                true
            },
        );
    }

    pub fn on_app_resume(&mut self, focused: bool) {
        info!("app resume, focused:{}", focused);
        DelegateSet::run_all_in(
            self,
            |c: &mut EmuViewController| {
                Some(c.state.lifecycle.on_resume_hooks())
            },
            |c, hook| {
                c.run_resume_hook(*hook, focused);
                true
            },
        );
        self.process_events();
    }

    fn run_exit_hook(&mut self, hook: LifecycleHook, backgrounded: bool) {
        let st = &mut self.state;
        match hook {
            LifecycleHook::ViewController => {
                if backgrounded {
                    if let Some(top) = st.view_stack.top_mut() {
                        top.on_hide();
                    }
                } else {
                    st.system_task.stop();
                }
            }
            LifecycleHook::Window(id) => {
                if let Some(win) = self.windows.get_mut(id) {
                    win.on_app_exit();
                }
            }
            LifecycleHook::Drawable(id) => {
                if let Some(data) = st.window_data.get_mut(&id) {
                    data.drawable.on_exit(
                        backgrounded,
                        st.renderer.task(),
                        &mut st.lifecycle,
                    );
                }
            }
            LifecycleHook::Renderer => st.renderer.on_exit(backgrounded),
        }
    }

    fn run_resume_hook(&mut self, hook: LifecycleHook, focused: bool) {
        let st = &mut self.state;
        match hook {
            LifecycleHook::ViewController => {
                if st.showing_emulation && focused && st.system.is_paused() {
                    info!("resuming emulation due to app resume");
                    st.emu_input_view.reset_input();
                    st.start_emulation();
                }
            }
            LifecycleHook::Window(id) => {
                if let Some(win) = self.windows.get_mut(id) {
                    win.on_app_resume();
                }
            }
            LifecycleHook::Drawable(id) => {
                if let Some(data) = st.window_data.get_mut(&id) {
                    data.drawable.on_resume(st.renderer.task());
                }
            }
            LifecycleHook::Renderer => {}
        }
    }
}
