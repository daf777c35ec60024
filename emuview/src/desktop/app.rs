use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::ModifiersState;
use winit::monitor::MonitorHandle;
use winit::window::{
    Fullscreen, Window as PlatformWindow, WindowAttributes,
    WindowId as PlatformWindowId,
};

use super::host::{DesktopHost, HostRequest};
use super::input::{
    KEYBOARD_DEVICE, MOUSE_DEVICE, button_from_mouse, desktop_router,
    key_from_physical,
};
use crate::base::events::control_channel;
use crate::base::frame_clock::VsyncClock;
use crate::base::screen::{PixelDensity, Screen, ScreenId};
use crate::base::window::{FIRST_WINDOW_ID, WindowId};
use crate::emu::controller::{ControllerParts, EmuFrame, EmuViewController};
use crate::emu::options::FrontendOptions;
use crate::emu::recent::RecentGameList;
use crate::emu::storage;
use crate::emu::system::{EmuSystem, FrameRunner, ThreadedSystemTask};
use crate::emu::video::{AudioOutput, EmuVideo};
use crate::emu::view::{DefaultViewFactory, ViewFactory};
use crate::framework::logging;
use crate::framework::util::HashMap;
use crate::gfx::{GlApi, PixelFormat, Renderer, WgpuDisplay};
use crate::input::{Action, Event, InputRouter, RawKeyEvent, RawPointerEvent};

const DEFAULT_WINDOW_SIZE: [u32; 2] = [960, 720];
const BASE_DPI: f32 = 96.0;
const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the desktop runtime is built around.
pub struct DesktopSetup {
    pub title: String,
    pub system: Box<dyn EmuSystem>,
    pub runner: Box<dyn FrameRunner>,
    pub video: EmuVideo,
    pub audio: Option<Arc<dyn AudioOutput>>,
    pub view_factory: Box<dyn ViewFactory>,
    /// Content or directory to open once the window is up.
    pub open_path: Option<PathBuf>,
}

impl DesktopSetup {
    pub fn new(
        title: impl Into<String>,
        system: Box<dyn EmuSystem>,
        runner: Box<dyn FrameRunner>,
        video: EmuVideo,
    ) -> Self {
        Self {
            title: title.into(),
            system,
            runner,
            video,
            audio: None,
            view_factory: Box::new(DefaultViewFactory),
            open_path: None,
        }
    }
}

struct MonitorEntry {
    screen: ScreenId,
    handle: MonitorHandle,
    clock: VsyncClock,
}

/// Runs the controller on a winit event loop with wgpu surfaces.
pub struct DesktopApp {
    setup: Option<DesktopSetup>,
    host: Rc<DesktopHost>,
    config_dir: Option<PathBuf>,
    controller: Option<EmuViewController>,
    display: Option<Arc<WgpuDisplay>>,
    windows: HashMap<WindowId, Arc<PlatformWindow>>,
    window_ids: HashMap<PlatformWindowId, WindowId>,
    monitors: Vec<MonitorEntry>,
    next_screen: u32,
    last_monitor_poll: Instant,
    router: InputRouter,
    cursor: [i32; 2],
    modifiers: ModifiersState,
    suspended: bool,
}

impl DesktopApp {
    pub fn new(setup: DesktopSetup) -> Self {
        let config_dir = storage::config_dir();
        Self {
            setup: Some(setup),
            host: Rc::new(DesktopHost::new(config_dir.clone())),
            config_dir,
            controller: None,
            display: None,
            windows: HashMap::default(),
            window_ids: HashMap::default(),
            monitors: Vec::new(),
            next_screen: 0,
            last_monitor_poll: Instant::now(),
            router: desktop_router(),
            cursor: [0, 0],
            modifiers: ModifiersState::empty(),
            suspended: false,
        }
    }

    pub fn controller(&self) -> Option<&EmuViewController> {
        self.controller.as_ref()
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), String> {
        let Some(setup) = self.setup.take() else {
            return Err("desktop app already initialized".to_string());
        };

        let screens = self.init_screens(event_loop);
        let window = create_platform_window(event_loop, &setup.title, None)?;
        let display = Arc::new(
            WgpuDisplay::new(FIRST_WINDOW_ID, window.clone())
                .map_err(|err| err.to_string())?,
        );
        self.track_window(FIRST_WINDOW_ID, window);

        let options = self.load_options();
        let recent = self.load_recent_games();
        let (events, receiver) = control_channel();
        let renderer = Renderer::make_configured(
            display.clone(),
            GlApi::OpenGl,
            PixelFormat::Bgra8888,
            options.thread_mode,
            self.host.as_ref(),
            events.clone(),
        )
        .map_err(|err| err.to_string())?;

        let system_task = ThreadedSystemTask::new(setup.runner, events.clone());
        let controller = EmuViewController::new(ControllerParts {
            host: self.host.clone(),
            renderer,
            system: setup.system,
            system_task: Box::new(system_task),
            video: setup.video,
            audio: setup.audio,
            options,
            recent,
            screens,
            view_factory: setup.view_factory,
            events,
            receiver,
            title: setup.title,
        });

        self.display = Some(display);
        self.controller = Some(controller);
        self.handle_host_requests(event_loop);

        if let Some(path) = setup.open_path {
            if let Some(controller) = self.controller.as_mut() {
                controller.handle_open_file_command(&path);
            }
            self.handle_host_requests(event_loop);
        }
        Ok(())
    }

    fn load_options(&self) -> FrontendOptions {
        let Some(dir) = self.config_dir.as_deref() else {
            return FrontendOptions::default();
        };
        match storage::load_options_if_exists(dir) {
            Ok(options) => options.unwrap_or_default(),
            Err(err) => {
                warn!("error reading options, using defaults: {}", err);
                FrontendOptions::default()
            }
        }
    }

    fn load_recent_games(&self) -> RecentGameList {
        let Some(dir) = self.config_dir.as_deref() else {
            return RecentGameList::new();
        };
        match storage::load_recent_games_if_exists(dir) {
            Ok(list) => list.unwrap_or_default(),
            Err(err) => {
                warn!("error reading recent games: {}", err);
                RecentGameList::new()
            }
        }
    }

    fn save_recent_games_if_changed(&mut self) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        if !controller.state_mut().take_recent_games_changed() {
            return;
        }
        let Some(dir) = self.config_dir.as_deref() else {
            return;
        };
        let list = controller.state().recent_games();
        if let Err(err) = storage::save_recent_games(dir, list) {
            warn!("error saving recent games: {}", err);
        }
    }

    // Screens

    fn init_screens(
        &mut self,
        event_loop: &ActiveEventLoop,
    ) -> Vec<Screen<EmuFrame>> {
        let mut handles: Vec<MonitorHandle> =
            event_loop.primary_monitor().into_iter().collect();
        for handle in event_loop.available_monitors() {
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }

        let screens: Vec<_> = handles
            .into_iter()
            .map(|handle| self.add_monitor(handle))
            .collect();
        self.host.set_screen_count(screens.len().max(1));
        info!("found {} screen(s)", screens.len());
        screens
    }

    fn add_monitor(&mut self, handle: MonitorHandle) -> Screen<EmuFrame> {
        let id = ScreenId(self.next_screen);
        self.next_screen += 1;

        let rate = handle
            .refresh_rate_millihertz()
            .map(|mhz| mhz as f64 / 1000.0)
            .unwrap_or(60.0);
        let dpi = BASE_DPI * handle.scale_factor() as f32;
        let density = PixelDensity {
            dpi: [dpi, dpi],
            scaled_dpi: None,
        };
        debug!(
            "screen:{} {:?} at {:.2}Hz",
            id.0,
            handle.name(),
            rate
        );

        self.monitors.push(MonitorEntry {
            screen: id,
            handle,
            clock: VsyncClock::new(rate),
        });
        Screen::new(id, rate, density)
    }

    fn poll_monitors(&mut self, event_loop: &ActiveEventLoop) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        let handles: Vec<MonitorHandle> =
            event_loop.available_monitors().collect();

        let removed: Vec<ScreenId> = self
            .monitors
            .iter()
            .filter(|m| !handles.contains(&m.handle))
            .map(|m| m.screen)
            .collect();
        for screen in removed {
            self.monitors.retain(|m| m.screen != screen);
            controller.remove_screen(screen);
        }

        for handle in handles {
            if self.monitors.iter().any(|m| m.handle == handle) {
                continue;
            }
            let screen = self.add_monitor(handle);
            if let Some(controller) = self.controller.as_mut() {
                controller.add_screen(screen);
            }
        }
        self.host.set_screen_count(self.monitors.len().max(1));
    }

    /// Ticks each monitor's clock and returns the earliest next deadline
    /// among clocks that have frame callbacks.
    fn tick_screens(&mut self, now: Instant) -> Option<Instant> {
        let controller = self.controller.as_mut()?;
        let mut deadline: Option<Instant> = None;

        for entry in self.monitors.iter_mut() {
            let active = controller
                .state()
                .screen(entry.screen)
                .is_some_and(|s| !s.on_frame().is_empty());
            entry.clock.set_paused(!active);

            if let Some(tick) = entry.clock.tick(now) {
                trace!(
                    "vsync screen:{} frames:{}",
                    entry.screen.0,
                    tick.frames_elapsed
                );
                controller.dispatch_screen_frame(entry.screen, tick.timestamp);
            }

            if active {
                let next = entry.clock.next_deadline();
                deadline = Some(deadline.map_or(next, |d| d.min(next)));
            }
        }
        deadline
    }

    // Windows

    fn track_window(&mut self, id: WindowId, window: Arc<PlatformWindow>) {
        self.window_ids.insert(window.id(), id);
        self.windows.insert(id, window);
    }

    fn untrack_window(&mut self, id: WindowId) {
        if let Some(window) = self.windows.remove(&id) {
            self.window_ids.remove(&window.id());
        }
        if let Some(display) = self.display.as_ref() {
            display.unregister_window(id);
        }
    }

    fn open_window(
        &mut self,
        event_loop: &ActiveEventLoop,
        id: WindowId,
        screen: ScreenId,
        title: &str,
    ) -> Result<(), String> {
        if !self.windows.contains_key(&id) {
            let monitor = self
                .monitors
                .iter()
                .find(|m| m.screen == screen)
                .map(|m| m.handle.clone());
            let window = create_platform_window(event_loop, title, monitor)?;
            if let Some(display) = self.display.as_ref() {
                display
                    .register_window(id, window.clone())
                    .map_err(|err| err.to_string())?;
            }
            self.track_window(id, window);
        }

        let Some(window) = self.windows.get(&id) else {
            return Ok(());
        };
        let size = window.inner_size();
        let size = [size.width as i32, size.height as i32];
        if let Some(controller) = self.controller.as_mut() {
            controller.on_surface_created(id, size);
        }
        Ok(())
    }

    fn handle_host_requests(&mut self, event_loop: &ActiveEventLoop) {
        while self.host.has_requests() {
            for request in self.host.take_requests() {
                self.handle_host_request(event_loop, request);
            }
        }
    }

    fn handle_host_request(
        &mut self,
        event_loop: &ActiveEventLoop,
        request: HostRequest,
    ) {
        match request {
            HostRequest::OpenWindow {
                window,
                screen,
                title,
            } => {
                if let Err(err) =
                    self.open_window(event_loop, window, screen, &title)
                {
                    error!("error opening window:{}: {}", window.0, err);
                }
            }
            HostRequest::CloseWindow(window) => {
                info!("closing window:{}", window.0);
                self.untrack_window(window);
            }
            HostRequest::SetTitle(window, title) => {
                if let Some(window) = self.windows.get(&window) {
                    window.set_title(&title);
                }
            }
            HostRequest::NotifyDraw(window) => {
                if let Some(window) = self.windows.get(&window) {
                    window.request_redraw();
                }
            }
            // winit has no way to take back a redraw request; the window
            // ignores draws it did not post.
            HostRequest::CancelDraw(_) => {}
            HostRequest::Exit => {
                info!("exit requested");
                event_loop.exit();
            }
        }
    }

    // Input

    fn key_event(&mut self, event: &KeyEvent) -> Option<Event> {
        if event.repeat && !self.host.key_repeat() {
            return None;
        }
        self.router.route_key(RawKeyEvent {
            device: KEYBOARD_DEVICE,
            key: key_from_physical(event.physical_key),
            pushed: event.state == ElementState::Pressed,
            repeat: u32::from(event.repeat),
            shift: self.modifiers.shift_key(),
            time: Instant::now(),
        })
    }

    fn mouse_event(
        &mut self,
        button: winit::event::MouseButton,
        state: ElementState,
    ) -> Option<Event> {
        let button = button_from_mouse(button)?;
        let action = match state {
            ElementState::Pressed => Action::Pushed,
            ElementState::Released => Action::Released,
        };
        self.router.route_pointer(RawPointerEvent {
            device: MOUSE_DEVICE,
            button,
            action,
            pos: self.cursor,
            relative: false,
            time: Instant::now(),
        })
    }

    fn dispatch_input(&mut self, window: WindowId, event: Option<Event>) {
        let Some(event) = event else {
            return;
        };
        if let Some(controller) = self.controller.as_mut() {
            controller.dispatch_input_event(window, &event);
        }
    }
}

impl ApplicationHandler for DesktopApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(controller) = self.controller.as_mut() {
            if self.suspended {
                self.suspended = false;
                controller.on_app_resume(true);
                self.handle_host_requests(event_loop);
            }
            return;
        }

        if let Err(err) = self.init(event_loop) {
            error!("failed to initialize emuview: {}", err);
            event_loop.exit();
        }
    }

    fn suspended(&mut self, event_loop: &ActiveEventLoop) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        self.suspended = true;
        controller.on_app_exit(true);
        self.handle_host_requests(event_loop);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: PlatformWindowId,
        event: WindowEvent,
    ) {
        let Some(&id) = self.window_ids.get(&window_id) else {
            return;
        };

        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let event = self.key_event(&event);
                self.dispatch_input(id, event);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = [position.x as i32, position.y as i32];
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let event = self.mouse_event(button, state);
                self.dispatch_input(id, event);
            }
            event => {
                let Some(controller) = self.controller.as_mut() else {
                    return;
                };
                match event {
                    WindowEvent::CloseRequested => {
                        controller.dispatch_dismiss_request(id);
                    }
                    WindowEvent::Resized(size) => {
                        let size = [size.width as i32, size.height as i32];
                        controller.on_surface_resized(id, size);
                    }
                    WindowEvent::Focused(focused) => {
                        controller.dispatch_focus_change(id, focused);
                    }
                    WindowEvent::DroppedFile(path) => {
                        controller.dispatch_drag_drop(id, &path);
                    }
                    WindowEvent::RedrawRequested => {
                        controller.dispatch_draw(id, false);
                    }
                    WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                        debug!(
                            "window:{} scale factor {}",
                            id.0, scale_factor
                        );
                    }
                    _ => {}
                }
            }
        }

        self.handle_host_requests(event_loop);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.handle_host_requests(event_loop);
        if self.controller.is_none() || self.suspended {
            return;
        }

        let now = Instant::now();
        let since_poll = now.duration_since(self.last_monitor_poll);
        if since_poll >= MONITOR_POLL_INTERVAL {
            self.last_monitor_poll = now;
            self.poll_monitors(event_loop);
        }

        let deadline = self.tick_screens(now);
        self.handle_host_requests(event_loop);
        self.save_recent_games_if_changed();

        let poll_deadline = self.last_monitor_poll + MONITOR_POLL_INTERVAL;
        let deadline = deadline.map_or(poll_deadline, |d| d.min(poll_deadline));
        event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(controller) = self.controller.as_mut() {
            controller.on_app_exit(false);
        }
        self.save_recent_games_if_changed();
        self.windows.clear();
        self.window_ids.clear();
        info!("exiting");
    }
}

fn create_platform_window(
    event_loop: &ActiveEventLoop,
    title: &str,
    monitor: Option<MonitorHandle>,
) -> Result<Arc<PlatformWindow>, String> {
    let mut attrs = WindowAttributes::default()
        .with_title(title)
        .with_inner_size(LogicalSize::new(
            DEFAULT_WINDOW_SIZE[0],
            DEFAULT_WINDOW_SIZE[1],
        ));
    if let Some(monitor) = monitor {
        attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(Some(
            monitor,
        ))));
    }

    event_loop
        .create_window(attrs)
        .map(Arc::new)
        .map_err(|err| err.to_string())
}

/// Runs `setup` until the user exits.
pub fn run(setup: DesktopSetup) -> Result<(), String> {
    logging::init_logger();

    let event_loop = EventLoop::new().map_err(|err| err.to_string())?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = DesktopApp::new(setup);
    event_loop
        .run_app(&mut app)
        .map_err(|err| err.to_string())
}
