use crate::framework::delegates::DelegateSet;

use super::window::WindowId;

pub const VIEW_CONTROLLER_ON_EXIT_PRIORITY: i32 = 10;
pub const WINDOW_ON_EXIT_PRIORITY: i32 = 100;
pub const DRAWABLE_ON_EXIT_PRIORITY: i32 = 200;
pub const RENDERER_ON_EXIT_PRIORITY: i32 = 300;

pub const DRAWABLE_ON_RESUME_PRIORITY: i32 = -200;
pub const WINDOW_ON_RESUME_PRIORITY: i32 = -100;
pub const VIEW_CONTROLLER_ON_RESUME_PRIORITY: i32 = 10;

/// Component owning a registered exit or resume hook.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LifecycleHook {
    Window(WindowId),
    Drawable(WindowId),
    Renderer,
    ViewController,
}

/// App exit/resume hook registry.
///
/// Owned by the view controller and lent to whichever component registers
/// or unregisters hooks; hooks run in priority order.
#[derive(Debug, Default)]
pub struct Lifecycle {
    on_exit: DelegateSet<LifecycleHook>,
    on_resume: DelegateSet<LifecycleHook>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_on_exit(&mut self, hook: LifecycleHook, priority: i32) -> bool {
        self.on_exit.add(hook, priority)
    }

    pub fn remove_on_exit(&mut self, hook: LifecycleHook) -> bool {
        self.on_exit.remove(&hook)
    }

    pub fn add_on_resume(
        &mut self,
        hook: LifecycleHook,
        priority: i32,
    ) -> bool {
        self.on_resume.add(hook, priority)
    }

    pub fn remove_on_resume(&mut self, hook: LifecycleHook) -> bool {
        self.on_resume.remove(&hook)
    }

    pub fn on_exit_hooks(&mut self) -> &mut DelegateSet<LifecycleHook> {
        &mut self.on_exit
    }

    pub fn on_resume_hooks(&mut self) -> &mut DelegateSet<LifecycleHook> {
        &mut self.on_resume
    }

    pub fn has_hooks_for(&self, hook: LifecycleHook) -> bool {
        self.on_exit.contains(&hook) || self.on_resume.contains(&hook)
    }
}
