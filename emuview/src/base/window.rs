use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, warn};

use super::host::PlatformHost;
use super::lifecycle::{
    Lifecycle, LifecycleHook, WINDOW_ON_EXIT_PRIORITY,
    WINDOW_ON_RESUME_PRIORITY,
};
use super::orientation::{Orientation, OrientationMask};
use super::screen::{PixelDensity, ScreenId};
use crate::input::Event;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct WindowId(pub u32);

/// Pending surface-change reasons, batched into one notification.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SurfaceChange {
    flags: u8,
}

impl SurfaceChange {
    const SURFACE_RESIZED: u8 = 1 << 0;
    const CONTENT_RECT_RESIZED: u8 = 1 << 1;
    const CUSTOM_VIEWPORT_RESIZED: u8 = 1 << 2;

    pub fn surface() -> Self {
        Self {
            flags: Self::SURFACE_RESIZED,
        }
    }

    pub fn content_rect() -> Self {
        Self {
            flags: Self::CONTENT_RECT_RESIZED,
        }
    }

    pub fn custom_viewport() -> Self {
        Self {
            flags: Self::CUSTOM_VIEWPORT_RESIZED,
        }
    }

    pub fn add_surface_resized(&mut self) {
        self.flags |= Self::SURFACE_RESIZED;
    }

    pub fn add_content_rect_resized(&mut self) {
        self.flags |= Self::CONTENT_RECT_RESIZED;
    }

    pub fn add_custom_viewport_resized(&mut self) {
        self.flags |= Self::CUSTOM_VIEWPORT_RESIZED;
    }

    pub fn remove_custom_viewport_resized(&mut self) {
        self.flags &= !Self::CUSTOM_VIEWPORT_RESIZED;
    }

    pub fn surface_resized(&self) -> bool {
        self.flags & Self::SURFACE_RESIZED != 0
    }

    pub fn content_rect_resized(&self) -> bool {
        self.flags & Self::CONTENT_RECT_RESIZED != 0
    }

    pub fn custom_viewport_resized(&self) -> bool {
        self.flags & Self::CUSTOM_VIEWPORT_RESIZED != 0
    }

    /// Any reason that changes the drawable area.
    pub fn resized(&self) -> bool {
        self.flags != 0
    }

    pub fn is_empty(&self) -> bool {
        self.flags == 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DrawParams {
    pub timestamp: Instant,
    pub was_resized: bool,
    pub needs_sync: bool,
}

/// State a window's handlers operate on. Windows borrow the lifecycle
/// registry from it to register and drop their hooks.
pub trait WindowContext {
    fn lifecycle(&mut self) -> &mut Lifecycle;
}

pub type SurfaceChangeHandler<C> =
    Rc<dyn Fn(&mut C, &mut Window<C>, SurfaceChange)>;
pub type DrawHandler<C> =
    Rc<dyn Fn(&mut C, &mut Window<C>, DrawParams) -> bool>;
pub type FocusChangeHandler<C> = Rc<dyn Fn(&mut C, &mut Window<C>, bool)>;
pub type DragDropHandler<C> = Rc<dyn Fn(&mut C, &mut Window<C>, &Path)>;
pub type InputEventHandler<C> =
    Rc<dyn Fn(&mut C, &mut Window<C>, &Event) -> bool>;
pub type DismissRequestHandler<C> = Rc<dyn Fn(&mut C, &mut Window<C>)>;
pub type DismissHandler<C> = Rc<dyn Fn(&mut C, &mut Window<C>)>;
pub type FreeHandler<C> = Rc<dyn Fn(&mut C, WindowId)>;

struct Handlers<C> {
    on_surface_change: SurfaceChangeHandler<C>,
    on_draw: DrawHandler<C>,
    on_focus_change: FocusChangeHandler<C>,
    on_drag_drop: DragDropHandler<C>,
    on_input_event: InputEventHandler<C>,
    on_dismiss_request: DismissRequestHandler<C>,
    on_dismiss: DismissHandler<C>,
    on_free: FreeHandler<C>,
}

impl<C: 'static> Default for Handlers<C> {
    fn default() -> Self {
        Self {
            on_surface_change: Rc::new(|_, _, _| {}),
            // Drawing nothing completes immediately.
            on_draw: Rc::new(|_, _, _| true),
            on_focus_change: Rc::new(|_, _, _| {}),
            on_drag_drop: Rc::new(|_, _, _| {}),
            on_input_event: Rc::new(|_, _, _| false),
            on_dismiss_request: Rc::new(|_, win| win.host.exit()),
            on_dismiss: Rc::new(|_, _| {}),
            on_free: Rc::new(|_, _| {}),
        }
    }
}

/// Construction parameters plus event handlers for a [`Window`].
pub struct WindowConfig<C> {
    screen: ScreenId,
    density: PixelDensity,
    title: String,
    handlers: Handlers<C>,
}

impl<C: 'static> WindowConfig<C> {
    pub fn new(screen: ScreenId) -> Self {
        Self {
            screen,
            density: PixelDensity::default(),
            title: String::new(),
            handlers: Handlers::default(),
        }
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_density(mut self, density: PixelDensity) -> Self {
        self.density = density;
        self
    }

    pub fn on_surface_change(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>, SurfaceChange) + 'static,
    ) -> Self {
        self.handlers.on_surface_change = Rc::new(handler);
        self
    }

    pub fn on_draw(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>, DrawParams) -> bool + 'static,
    ) -> Self {
        self.handlers.on_draw = Rc::new(handler);
        self
    }

    pub fn on_focus_change(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>, bool) + 'static,
    ) -> Self {
        self.handlers.on_focus_change = Rc::new(handler);
        self
    }

    pub fn on_drag_drop(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>, &Path) + 'static,
    ) -> Self {
        self.handlers.on_drag_drop = Rc::new(handler);
        self
    }

    pub fn on_input_event(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>, &Event) -> bool + 'static,
    ) -> Self {
        self.handlers.on_input_event = Rc::new(handler);
        self
    }

    pub fn on_dismiss_request(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>) + 'static,
    ) -> Self {
        self.handlers.on_dismiss_request = Rc::new(handler);
        self
    }

    pub fn on_dismiss(
        mut self,
        handler: impl Fn(&mut C, &mut Window<C>) + 'static,
    ) -> Self {
        self.handlers.on_dismiss = Rc::new(handler);
        self
    }

    pub fn on_free(
        mut self,
        handler: impl Fn(&mut C, WindowId) + 'static,
    ) -> Self {
        self.handlers.on_free = Rc::new(handler);
        self
    }
}

fn platform_orientations(host: &dyn PlatformHost) -> OrientationMask {
    let mask = host.valid_orientations();
    if mask.is_empty() {
        warn!("platform reported no valid orientations");
        return OrientationMask::only(Orientation::Rotate0);
    }
    mask
}

/// Geometry and event routing for one presentable surface.
///
/// `size()` is the logical size content is laid out in; `real_size()` is
/// the physical surface. They differ by an axis swap while the software
/// orientation is sideways. Size is meaningful only once the first
/// surface change has been dispatched.
pub struct Window<C> {
    id: WindowId,
    screen: ScreenId,
    primary: bool,
    title: String,
    host: Rc<dyn PlatformHost>,
    density: PixelDensity,
    size: [i32; 2],
    size_mm: [f32; 2],
    size_smm: Option<[f32; 2]>,
    mm_to_pixel: [f32; 2],
    smm_to_pixel: [f32; 2],
    orientation: Orientation,
    requested_orientation: Orientation,
    valid_orientations: OrientationMask,
    surface_change: SurfaceChange,
    surface_change_dispatched: bool,
    has_surface: bool,
    draw_needed: bool,
    notify_draw_allowed: bool,
    focused: bool,
    intended_frame_rate: f64,
    handlers: Handlers<C>,
}

impl<C: WindowContext + 'static> Window<C> {
    fn new(
        id: WindowId,
        primary: bool,
        config: WindowConfig<C>,
        host: Rc<dyn PlatformHost>,
        lifecycle: &mut Lifecycle,
    ) -> Self {
        lifecycle
            .add_on_exit(LifecycleHook::Window(id), WINDOW_ON_EXIT_PRIORITY);
        lifecycle.add_on_resume(
            LifecycleHook::Window(id),
            WINDOW_ON_RESUME_PRIORITY,
        );

        let valid_orientations = platform_orientations(&*host);

        Self {
            id,
            screen: config.screen,
            primary,
            title: config.title,
            host,
            density: config.density,
            size: [0, 0],
            size_mm: [0.0, 0.0],
            size_smm: None,
            mm_to_pixel: [0.0, 0.0],
            smm_to_pixel: [0.0, 0.0],
            orientation: Orientation::Rotate0,
            requested_orientation: Orientation::Rotate0,
            valid_orientations,
            surface_change: SurfaceChange::default(),
            surface_change_dispatched: false,
            has_surface: false,
            draw_needed: false,
            notify_draw_allowed: true,
            focused: true,
            intended_frame_rate: 0.0,
            handlers: config.handlers,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn host(&self) -> &dyn PlatformHost {
        self.host.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.host.set_window_title(self.id, &self.title);
    }

    pub fn width(&self) -> i32 {
        self.size[0]
    }

    pub fn height(&self) -> i32 {
        self.size[1]
    }

    pub fn size(&self) -> [i32; 2] {
        self.size
    }

    pub fn real_width(&self) -> i32 {
        if self.orientation.is_sideways() {
            self.height()
        } else {
            self.width()
        }
    }

    pub fn real_height(&self) -> i32 {
        if self.orientation.is_sideways() {
            self.width()
        } else {
            self.height()
        }
    }

    pub fn real_size(&self) -> [i32; 2] {
        [self.real_width(), self.real_height()]
    }

    pub fn bounds(&self) -> [i32; 4] {
        [0, 0, self.width(), self.height()]
    }

    pub fn is_portrait(&self) -> bool {
        self.width() < self.height()
    }

    pub fn is_landscape(&self) -> bool {
        !self.is_portrait()
    }

    pub fn size_mm(&self) -> [f32; 2] {
        self.size_mm
    }

    /// Falls back to plain millimeters without a scaled density.
    pub fn size_smm(&self) -> [f32; 2] {
        self.size_smm.unwrap_or(self.size_mm)
    }

    pub fn width_mm_in_pixels(&self, mm: f32) -> i32 {
        (mm * self.mm_to_pixel[0]).round() as i32
    }

    pub fn height_mm_in_pixels(&self, mm: f32) -> i32 {
        (mm * self.mm_to_pixel[1]).round() as i32
    }

    pub fn width_smm_in_pixels(&self, mm: f32) -> i32 {
        if self.size_smm.is_none() {
            return self.width_mm_in_pixels(mm);
        }
        (mm * self.smm_to_pixel[0]).round() as i32
    }

    pub fn height_smm_in_pixels(&self, mm: f32) -> i32 {
        if self.size_smm.is_none() {
            return self.height_mm_in_pixels(mm);
        }
        (mm * self.smm_to_pixel[1]).round() as i32
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn valid_orientations(&self) -> OrientationMask {
        self.valid_orientations
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn has_surface(&self) -> bool {
        self.has_surface
    }

    pub fn surface_change_dispatched(&self) -> bool {
        self.surface_change_dispatched
    }

    pub fn pending_surface_change(&self) -> SurfaceChange {
        self.surface_change
    }

    pub fn intended_frame_rate(&self) -> f64 {
        self.intended_frame_rate
    }

    pub fn set_intended_frame_rate(&mut self, rate: f64) {
        self.intended_frame_rate = rate;
        self.host.set_intended_frame_rate(self.id, rate);
    }

    /// Called by the host when the platform surface appears or goes away.
    pub fn set_has_surface(&mut self, has_surface: bool) {
        self.has_surface = has_surface;
        if !has_surface {
            self.draw_needed = false;
        }
    }

    /// Stores a new physical surface size. Returns false if unchanged.
    pub fn update_size(&mut self, surface_size: [i32; 2]) -> bool {
        let mut size = surface_size;
        if self.orientation.is_sideways() {
            size.swap(0, 1);
        }

        if size == self.size {
            debug!(
                "same window size {}x{}",
                self.real_width(),
                self.real_height()
            );
            return false;
        }

        self.size = size;
        self.update_physical_size_with_current_size();
        self.surface_change.add_surface_resized();
        true
    }

    /// Recomputes mm scaling. Returns whether the physical size changed.
    pub fn update_physical_size(
        &mut self,
        size_mm: [f32; 2],
        size_smm: Option<[f32; 2]>,
    ) -> bool {
        let sideways = self.orientation.is_sideways();
        let mut size_mm = size_mm;
        if sideways {
            size_mm.swap(0, 1);
        }

        let mut changed = size_mm != self.size_mm;
        self.size_mm = size_mm;
        self.mm_to_pixel = pixel_scaler(self.size, size_mm);

        if let Some(mut size_smm) = size_smm {
            if sideways {
                size_smm.swap(0, 1);
            }
            changed |= self.size_smm != Some(size_smm);
            self.size_smm = Some(size_smm);
            self.smm_to_pixel = pixel_scaler(self.size, size_smm);
        }

        let smm = self.size_smm();
        if self.orientation == Orientation::Rotate0 {
            debug!(
                "updated window size:{}x{} ({:.2}x{:.2}mm, \
                 scaled {:.2}x{:.2}mm)",
                self.width(),
                self.height(),
                self.size_mm[0],
                self.size_mm[1],
                smm[0],
                smm[1]
            );
        } else {
            debug!(
                "updated window size:{}x{} ({:.2}x{:.2}mm, \
                 scaled {:.2}x{:.2}mm) with rotation, real size:{}x{}",
                self.width(),
                self.height(),
                self.size_mm[0],
                self.size_mm[1],
                smm[0],
                smm[1],
                self.real_width(),
                self.real_height()
            );
        }

        changed
    }

    pub fn update_physical_size_with_current_size(&mut self) -> bool {
        let real = self.real_size();
        let mm = self.density.pixels_as_mm(real);
        let smm = self.density.pixels_as_scaled_mm(real);
        self.update_physical_size(mm, smm)
    }

    /// Restricts orientations to `mask` (clamped to what the platform can
    /// show) and rotates away from an orientation that is no longer valid.
    pub fn set_valid_orientations(&mut self, mask: OrientationMask) -> bool {
        let platform_mask = platform_orientations(&*self.host);
        let clamped = mask.intersect(platform_mask);
        let mask = if clamped.is_empty() {
            platform_mask
        } else {
            clamped
        };
        self.valid_orientations = mask;

        if self.primary {
            self.host.set_orientation_sensor(mask.count() > 1);
        }

        if mask.contains(self.requested_orientation) {
            return self.request_orientation_change(self.requested_orientation);
        }

        if !mask.contains(self.orientation) {
            let Some(first) = mask.first() else {
                unreachable!("bad orientation mask: {:#x}", mask.bits());
            };
            return self.request_orientation_change(first);
        }

        false
    }

    pub fn request_orientation_change(
        &mut self,
        orientation: Orientation,
    ) -> bool {
        self.requested_orientation = orientation;

        if !self.valid_orientations.contains(orientation)
            || self.orientation == orientation
        {
            return false;
        }

        info!("setting orientation {}", orientation.degrees());
        let real = self.real_size();
        self.orientation = orientation;
        self.update_size(real);
        self.post_draw();

        if self.primary {
            self.host.set_system_orientation(orientation);
            self.host
                .configure_input_for_orientation(self.id, orientation);
        }

        true
    }

    /// Returns false, clearing the flag, when there is no surface to draw.
    pub fn set_needs_draw(&mut self, needs_draw: bool) -> bool {
        if needs_draw && self.has_surface {
            self.draw_needed = true;
            return true;
        }

        self.draw_needed = false;
        false
    }

    pub fn needs_draw(&self) -> bool {
        self.draw_needed
    }

    pub fn post_draw(&mut self) {
        if !self.set_needs_draw(true) {
            return;
        }

        if !self.notify_draw_allowed {
            return;
        }

        self.host.notify_draw(self.id);
    }

    pub fn unpost_draw(&mut self) {
        self.set_needs_draw(false);
        self.host.cancel_draw(self.id);
    }

    /// Re-enables draw notification and fires it if a draw was posted
    /// while notification was suppressed.
    pub fn deferred_draw_complete(&mut self) {
        self.notify_draw_allowed = true;
        if self.draw_needed {
            self.host.notify_draw(self.id);
        }
    }

    pub fn draw_notification_allowed(&self) -> bool {
        self.notify_draw_allowed
    }

    pub fn set_needs_custom_viewport_resize(&mut self, needs_resize: bool) {
        if needs_resize {
            self.surface_change.add_custom_viewport_resized();
        } else {
            self.surface_change.remove_custom_viewport_resized();
        }
    }

    /// Draws if a draw was posted. Returns whether the draw path ran.
    pub fn dispatch_on_draw(&mut self, ctx: &mut C, needs_sync: bool) -> bool {
        if !self.draw_needed {
            return false;
        }

        self.draw_needed = false;
        self.draw(ctx, needs_sync);
        true
    }

    fn draw(&mut self, ctx: &mut C, needs_sync: bool) {
        let mut params = DrawParams {
            timestamp: Instant::now(),
            was_resized: false,
            needs_sync,
        };

        if !self.surface_change.is_empty() {
            self.dispatch_surface_change(ctx);
            params.was_resized = true;
        }

        self.notify_draw_allowed = false;
        let on_draw = self.handlers.on_draw.clone();
        if on_draw(ctx, self, params) {
            self.deferred_draw_complete();
        }
    }

    pub fn dispatch_surface_change(&mut self, ctx: &mut C) {
        let change = std::mem::take(&mut self.surface_change);
        self.surface_change_dispatched = true;
        let handler = self.handlers.on_surface_change.clone();
        handler(ctx, self, change);
    }

    pub fn dispatch_input_event(&mut self, ctx: &mut C, event: &Event) -> bool {
        let handler = self.handlers.on_input_event.clone();
        handler(ctx, self, event)
    }

    pub fn dispatch_focus_change(&mut self, ctx: &mut C, focused: bool) {
        self.focused = focused;
        let handler = self.handlers.on_focus_change.clone();
        handler(ctx, self, focused);
    }

    pub fn dispatch_drag_drop(&mut self, ctx: &mut C, path: &Path) {
        let handler = self.handlers.on_drag_drop.clone();
        handler(ctx, self, path);
    }

    pub fn dispatch_dismiss_request(&mut self, ctx: &mut C) {
        let handler = self.handlers.on_dismiss_request.clone();
        handler(ctx, self);
    }

    pub fn on_app_exit(&mut self) {
        self.notify_draw_allowed = false;
        self.host.cancel_draw(self.id);
    }

    pub fn on_app_resume(&mut self) {
        self.deferred_draw_complete();
    }

    // Everything in dismissal up to leaving the registry.
    fn dismiss_in_place(&mut self, ctx: &mut C) -> FreeHandler<C> {
        let on_dismiss = self.handlers.on_dismiss.clone();
        on_dismiss(ctx, self);

        let lifecycle = ctx.lifecycle();
        lifecycle.remove_on_exit(LifecycleHook::Window(self.id));
        lifecycle.remove_on_resume(LifecycleHook::Window(self.id));

        self.host.cancel_draw(self.id);
        self.draw_needed = false;
        self.has_surface = false;
        self.host.close_window(self.id);

        self.handlers.on_free.clone()
    }
}

fn pixel_scaler(pixels: [i32; 2], mm: [f32; 2]) -> [f32; 2] {
    let scale = |px: i32, mm: f32| if mm > 0.0 { px as f32 / mm } else { 0.0 };
    [scale(pixels[0], mm[0]), scale(pixels[1], mm[1])]
}

/// Id the registry hands to the first window it creates.
pub const FIRST_WINDOW_ID: WindowId = WindowId(1);

/// Every open window in creation order. The first window created is the
/// primary window.
pub struct WindowRegistry<C> {
    windows: Vec<Window<C>>,
    next_id: u32,
}

impl<C> Default for WindowRegistry<C> {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            next_id: FIRST_WINDOW_ID.0,
        }
    }
}

impl<C: WindowContext + 'static> WindowRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a window and asks the host to open its platform surface.
    pub fn create(
        &mut self,
        config: WindowConfig<C>,
        host: Rc<dyn PlatformHost>,
        ctx: &mut C,
    ) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;

        let primary = self.windows.is_empty();
        let screen = config.screen;
        let window = Window::new(id, primary, config, host, ctx.lifecycle());
        window.host.open_window(id, screen, window.title());
        self.windows.push(window);
        id
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.windows.iter().map(|w| w.id).collect()
    }

    pub fn get(&self, id: WindowId) -> Option<&Window<C>> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut Window<C>> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn main(&self) -> Option<&Window<C>> {
        self.windows.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Window<C>> {
        self.windows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Window<C>> {
        self.windows.iter_mut()
    }

    /// Runs the dismiss handler, drops the window's lifecycle hooks and
    /// draw event, releases its platform surface, removes it from the
    /// registry, then runs the free handler.
    pub fn dismiss(&mut self, id: WindowId, ctx: &mut C) -> bool {
        let Some(index) = self.windows.iter().position(|w| w.id == id) else {
            return false;
        };

        let on_free = self.windows[index].dismiss_in_place(ctx);
        self.windows.remove(index);
        on_free(ctx, id);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use super::*;
    use crate::base::host::PlatformKind;

    #[derive(Default)]
    struct Host {
        calls: RefCell<Vec<String>>,
        orientations: Option<OrientationMask>,
    }

    impl PlatformHost for Host {
        fn platform(&self) -> PlatformKind {
            PlatformKind::Other
        }

        fn screen_supports_timestamps(&self) -> bool {
            true
        }

        fn screen_count(&self) -> usize {
            1
        }

        fn open_window(&self, window: WindowId, _: ScreenId, _: &str) {
            self.calls.borrow_mut().push(format!("open {}", window.0));
        }

        fn close_window(&self, window: WindowId) {
            self.calls.borrow_mut().push(format!("close {}", window.0));
        }

        fn set_window_title(&self, _: WindowId, _: &str) {}

        fn notify_draw(&self, window: WindowId) {
            self.calls.borrow_mut().push(format!("notify {}", window.0));
        }

        fn cancel_draw(&self, window: WindowId) {
            self.calls.borrow_mut().push(format!("cancel {}", window.0));
        }

        fn set_system_orientation(&self, orientation: Orientation) {
            self.calls
                .borrow_mut()
                .push(format!("system {}", orientation.degrees()));
        }

        fn shared_storage_path(&self) -> Option<PathBuf> {
            None
        }

        fn exit(&self) {
            self.calls.borrow_mut().push("exit".to_string());
        }

        fn valid_orientations(&self) -> OrientationMask {
            self.orientations.unwrap_or(OrientationMask::ALL)
        }
    }

    #[derive(Default)]
    struct Ctx {
        lifecycle: Lifecycle,
        log: Vec<String>,
    }

    impl WindowContext for Ctx {
        fn lifecycle(&mut self) -> &mut Lifecycle {
            &mut self.lifecycle
        }
    }

    type Setup = (Rc<Host>, Ctx, WindowRegistry<Ctx>, WindowId);

    fn plain() -> WindowConfig<Ctx> {
        WindowConfig::new(ScreenId(0))
    }

    fn setup(config: WindowConfig<Ctx>) -> Setup {
        let host = Rc::new(Host::default());
        let mut ctx = Ctx::default();
        let mut registry = WindowRegistry::new();
        let id = registry.create(config, host.clone(), &mut ctx);
        let window = registry.get_mut(id).expect("window");
        window.set_has_surface(true);
        window.update_size([640, 480]);
        (host, ctx, registry, id)
    }

    #[test]
    fn orientation_change_swaps_logical_axes_only() {
        let (host, _ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");

        assert!(window.request_orientation_change(Orientation::Rotate90));
        assert_eq!(window.size(), [480, 640]);
        assert_eq!(window.real_size(), [640, 480]);
        assert!(window.needs_draw());

        assert!(window.request_orientation_change(Orientation::Rotate0));
        assert_eq!(window.size(), [640, 480]);
        assert_eq!(window.real_size(), [640, 480]);
        assert!(host.calls.borrow().contains(&"system 90".to_string()));
    }

    #[test]
    fn orientation_change_ignores_active_or_invalid_orientation() {
        let (_host, _ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");

        assert!(!window.request_orientation_change(Orientation::Rotate0));
        window.set_valid_orientations(OrientationMask::PORTRAIT);
        assert!(!window.request_orientation_change(Orientation::Rotate90));
        assert_eq!(window.orientation(), Orientation::Rotate0);
    }

    #[test]
    fn invalidated_orientation_falls_back_in_priority_order() {
        let (_host, _ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");

        assert!(window.set_valid_orientations(OrientationMask::LANDSCAPE));
        assert_eq!(window.orientation(), Orientation::Rotate90);

        let only_270 = OrientationMask::only(Orientation::Rotate270);
        assert!(window.set_valid_orientations(only_270));
        assert_eq!(window.orientation(), Orientation::Rotate270);
    }

    #[test]
    fn update_size_reports_unchanged_sizes() {
        let (_host, _ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");
        assert!(!window.update_size([640, 480]));
        assert!(window.pending_surface_change().surface_resized());
    }

    #[test]
    fn draw_without_surface_is_rejected() {
        let (host, _ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");
        window.set_has_surface(false);
        window.post_draw();
        assert!(!window.needs_draw());
        assert!(!host.calls.borrow().iter().any(|c| c == "notify 1"));
    }

    #[test]
    fn draw_dispatches_pending_surface_change_once() {
        let config = WindowConfig::new(ScreenId(0))
            .on_surface_change(|ctx: &mut Ctx, _, change| {
                ctx.log.push(format!("surface {}", change.surface_resized()));
            })
            .on_draw(|ctx: &mut Ctx, _, params| {
                ctx.log.push(format!("draw resized={}", params.was_resized));
                true
            });
        let (_host, mut ctx, mut registry, id) = setup(config);
        let window = registry.get_mut(id).expect("window");
        window.set_needs_custom_viewport_resize(true);

        window.post_draw();
        assert!(window.dispatch_on_draw(&mut ctx, false));
        assert!(!window.dispatch_on_draw(&mut ctx, false));
        window.post_draw();
        assert!(window.dispatch_on_draw(&mut ctx, false));

        assert_eq!(
            ctx.log,
            vec![
                "surface true".to_string(),
                "draw resized=true".to_string(),
                "draw resized=false".to_string(),
            ]
        );
        assert!(window.surface_change_dispatched());
    }

    #[test]
    fn deferred_draw_suppresses_notification_until_complete() {
        let config =
            WindowConfig::new(ScreenId(0)).on_draw(|_: &mut Ctx, _, _| false);
        let (host, mut ctx, mut registry, id) = setup(config);
        let window = registry.get_mut(id).expect("window");

        window.post_draw();
        window.dispatch_on_draw(&mut ctx, false);
        host.calls.borrow_mut().clear();

        window.post_draw();
        assert!(host.calls.borrow().is_empty());

        window.deferred_draw_complete();
        assert_eq!(*host.calls.borrow(), vec!["notify 1".to_string()]);
    }

    #[test]
    fn dismiss_runs_steps_in_order() {
        let config = WindowConfig::new(ScreenId(0))
            .on_dismiss(|ctx: &mut Ctx, win| {
                let hooked = ctx
                    .lifecycle
                    .has_hooks_for(LifecycleHook::Window(win.id()));
                ctx.log.push(format!("dismiss hooked={}", hooked));
            })
            .on_free(|ctx: &mut Ctx, id| {
                ctx.log.push(format!("free {}", id.0));
            });
        let (host, mut ctx, mut registry, id) = setup(config);

        assert!(registry.dismiss(id, &mut ctx));
        assert!(!registry.dismiss(id, &mut ctx));

        assert!(registry.is_empty());
        assert_eq!(
            ctx.log,
            vec!["dismiss hooked=true".to_string(), "free 1".to_string()]
        );
        assert!(!ctx.lifecycle.has_hooks_for(LifecycleHook::Window(id)));
        let calls = host.calls.borrow();
        let cancel = calls.iter().position(|c| c == "cancel 1");
        let close = calls.iter().position(|c| c == "close 1");
        assert!(cancel < close);
    }

    #[test]
    fn default_dismiss_request_exits() {
        let (host, mut ctx, mut registry, id) = setup(plain());
        let window = registry.get_mut(id).expect("window");
        window.dispatch_dismiss_request(&mut ctx);
        assert!(host.calls.borrow().contains(&"exit".to_string()));
    }

    #[test]
    fn empty_platform_orientations_fall_back_to_upright() {
        let host = Rc::new(Host {
            orientations: Some(OrientationMask::NONE),
            ..Default::default()
        });
        let mut ctx = Ctx::default();
        let mut registry = WindowRegistry::new();
        let id = registry.create(plain(), host.clone(), &mut ctx);
        let window = registry.get_mut(id).expect("window");
        window.set_has_surface(true);
        window.update_size([640, 480]);

        assert!(!window.set_valid_orientations(OrientationMask::LANDSCAPE));
        assert_eq!(window.orientation(), Orientation::Rotate0);
        assert!(!window.request_orientation_change(Orientation::Rotate90));
        assert_eq!(window.size(), [640, 480]);
    }
}
