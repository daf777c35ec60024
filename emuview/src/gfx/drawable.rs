use std::time::Instant;

use log::{debug, warn};

use super::renderer::{Drawable, Renderer};
use super::task::RendererTask;
use crate::base::lifecycle::{
    DRAWABLE_ON_EXIT_PRIORITY, DRAWABLE_ON_RESUME_PRIORITY, Lifecycle,
    LifecycleHook,
};
use crate::base::window::WindowId;
use crate::framework::delegates::DelegateSet;

/// The drawable bound to one window, plus the frame callbacks driven by
/// its presentation-completion signal.
///
/// At most one drawable is bound at a time. Rebinding tears the old one
/// down on the render task first.
#[derive(Debug)]
pub struct DrawableHolder<D> {
    window: WindowId,
    drawable: Option<Drawable>,
    on_frame: DelegateSet<D>,
    frame_notify_armed: bool,
    present_time: Option<Instant>,
    caches_freed: bool,
}

impl<D: Clone + PartialEq> DrawableHolder<D> {
    pub fn new(window: WindowId) -> Self {
        Self {
            window,
            drawable: None,
            on_frame: DelegateSet::new(),
            frame_notify_armed: false,
            present_time: None,
            caches_freed: false,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn drawable(&self) -> Option<Drawable> {
        self.drawable
    }

    pub fn is_bound(&self) -> bool {
        self.drawable.is_some()
    }

    pub fn caches_freed(&self) -> bool {
        self.caches_freed
    }

    /// Binds a new drawable for the window. On failure the holder stays
    /// unbound and draws become no-ops until a later bind succeeds.
    pub fn make_drawable(
        &mut self,
        renderer: &Renderer,
        size: [i32; 2],
        lifecycle: &mut Lifecycle,
    ) -> bool {
        self.destroy_drawable(renderer.task(), lifecycle);

        let window = self.window;
        let format = renderer.pixel_format();
        let size = [size[0].max(1) as u32, size[1].max(1) as u32];
        let result = renderer.task().run_sync(move |ctx| {
            ctx.display().make_drawable(window, format, size)
        });

        let drawable = match result {
            Some(Ok(drawable)) => drawable,
            Some(Err(err)) => {
                warn!("error creating window surface: {}", err);
                return false;
            }
            None => {
                warn!("render task unavailable for window:{}", window.0);
                return false;
            }
        };

        debug!("bound drawable:{} to window:{}", drawable.id(), window.0);
        self.drawable = Some(drawable);
        self.caches_freed = false;

        let hook = LifecycleHook::Drawable(window);
        lifecycle.add_on_resume(hook, DRAWABLE_ON_RESUME_PRIORITY);
        lifecycle.add_on_exit(hook, DRAWABLE_ON_EXIT_PRIORITY);

        if renderer.support().has_draw_read_buffers() {
            renderer.task().run(move |ctx| {
                ctx.display().select_back_buffers(drawable);
            });
        }
        true
    }

    /// Destroys the drawable on the render task, never on the caller.
    pub fn destroy_drawable(
        &mut self,
        task: &RendererTask,
        lifecycle: &mut Lifecycle,
    ) {
        let Some(drawable) = self.drawable.take() else {
            return;
        };

        debug!("destroying drawable:{}", drawable.id());
        task.run(move |ctx| ctx.display().destroy_drawable(drawable));

        let hook = LifecycleHook::Drawable(self.window);
        lifecycle.remove_on_resume(hook);
        lifecycle.remove_on_exit(hook);
        self.cancel_notify_on_frame();
        self.present_time = None;
        self.caches_freed = false;
    }

    pub fn on_exit(
        &mut self,
        backgrounded: bool,
        task: &RendererTask,
        lifecycle: &mut Lifecycle,
    ) {
        if !backgrounded {
            self.destroy_drawable(task, lifecycle);
            return;
        }

        self.cancel_notify_on_frame();
        if let Some(drawable) = self.drawable {
            task.run(move |ctx| ctx.display().free_caches(drawable));
            self.caches_freed = true;
        }
    }

    pub fn on_resume(&mut self, task: &RendererTask) {
        if let Some(drawable) = self.drawable {
            task.run(move |ctx| ctx.display().restore_caches(drawable));
            self.caches_freed = false;
        }
        // backgrounding dropped the pending notification
        self.notify_on_frame();
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

    /// Arms a one-shot frame notification for the next completed draw.
    /// Does nothing without frame callbacks or a bound drawable.
    pub fn notify_on_frame(&mut self) -> bool {
        if self.on_frame.is_empty() || self.drawable.is_none() {
            return false;
        }
        self.frame_notify_armed = true;
        true
    }

    pub fn cancel_notify_on_frame(&mut self) {
        self.frame_notify_armed = false;
    }

    pub fn frame_notify_armed(&self) -> bool {
        self.frame_notify_armed
    }

    /// Consumes an armed notification. Called when a draw finishes.
    pub fn take_frame_notification(&mut self) -> bool {
        std::mem::take(&mut self.frame_notify_armed)
    }

    pub fn set_presentation_time(&mut self, time: Instant) {
        self.present_time = Some(time);
    }

    pub fn presentation_time(&self) -> Option<Instant> {
        self.present_time
    }

    pub fn take_presentation_time(&mut self) -> Option<Instant> {
        self.present_time.take()
    }
}
