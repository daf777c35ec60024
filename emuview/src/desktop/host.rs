use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use log::trace;

use crate::base::host::{PlatformHost, PlatformKind};
use crate::base::screen::ScreenId;
use crate::base::window::WindowId;

/// Work the event loop performs on behalf of the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum HostRequest {
    OpenWindow {
        window: WindowId,
        screen: ScreenId,
        title: String,
    },
    CloseWindow(WindowId),
    SetTitle(WindowId, String),
    NotifyDraw(WindowId),
    CancelDraw(WindowId),
    Exit,
}

/// [`PlatformHost`] for winit desktops.
///
/// Calls arrive while the controller is borrowed, so they are queued and
/// carried out by the event loop between dispatches.
#[derive(Debug)]
pub struct DesktopHost {
    requests: RefCell<Vec<HostRequest>>,
    screen_count: Cell<usize>,
    storage_path: Option<PathBuf>,
    key_repeat: Cell<bool>,
    low_latency: Cell<bool>,
}

impl DesktopHost {
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        Self {
            requests: RefCell::new(Vec::new()),
            screen_count: Cell::new(1),
            storage_path,
            key_repeat: Cell::new(true),
            low_latency: Cell::new(false),
        }
    }

    pub fn take_requests(&self) -> Vec<HostRequest> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.borrow().is_empty()
    }

    pub fn set_screen_count(&self, count: usize) {
        self.screen_count.set(count);
    }

    /// Whether key repeats should reach the controller.
    pub fn key_repeat(&self) -> bool {
        self.key_repeat.get()
    }

    pub fn cpu_low_latency(&self) -> bool {
        self.low_latency.get()
    }

    fn push(&self, request: HostRequest) {
        trace!("host request {:?}", request);
        self.requests.borrow_mut().push(request);
    }
}

impl PlatformHost for DesktopHost {
    fn platform(&self) -> PlatformKind {
        PlatformKind::current()
    }

    // Every monitor gets a synthesized vsync with aligned timestamps.
    fn screen_supports_timestamps(&self) -> bool {
        true
    }

    fn screen_count(&self) -> usize {
        self.screen_count.get()
    }

    fn open_window(&self, window: WindowId, screen: ScreenId, title: &str) {
        self.push(HostRequest::OpenWindow {
            window,
            screen,
            title: title.to_string(),
        });
    }

    fn close_window(&self, window: WindowId) {
        self.push(HostRequest::CloseWindow(window));
    }

    fn set_window_title(&self, window: WindowId, title: &str) {
        self.push(HostRequest::SetTitle(window, title.to_string()));
    }

    fn notify_draw(&self, window: WindowId) {
        self.push(HostRequest::NotifyDraw(window));
    }

    fn cancel_draw(&self, window: WindowId) {
        self.push(HostRequest::CancelDraw(window));
    }

    fn set_cpu_needs_low_latency(&self, on: bool) {
        self.low_latency.set(on);
    }

    fn set_hint_key_repeat(&self, on: bool) {
        self.key_repeat.set(on);
    }

    fn shared_storage_path(&self) -> Option<PathBuf> {
        self.storage_path.clone()
    }

    fn exit(&self) {
        self.push(HostRequest::Exit);
    }
}
