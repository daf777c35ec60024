use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::support::{
    ContextAttributes, DrawContextSupport, DriverQuery, GlApi,
};
use super::task::{RendererCommands, RendererTask};
use crate::base::events::ControlEventSender;
use crate::base::host::{PlatformHost, PlatformKind};
use crate::base::orientation::OrientationMask;
use crate::base::window::{Window, WindowContext, WindowId};

/// Presence of this file in shared storage forces a single draw context.
pub const FORCE_SINGLE_DRAW_CONTEXT_FILE: &str =
    "emuview_force_single_draw_context";

/// Requested split between the control thread and a separate draw
/// context.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    #[default]
    Auto,
    Single,
    Multi,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PixelFormat {
    #[default]
    Rgba8888,
    Bgra8888,
    Rgb565,
}

/// Handle to a presentable surface owned by a [`GpuDisplay`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Drawable(NonZeroU64);

impl Drawable {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn id(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("no compatible GPU adapter")]
    NoAdapter,

    #[error("context version {major}.{minor} is not supported")]
    UnsupportedContext { major: u32, minor: u32 },

    #[error("no platform window for {0:?}")]
    UnknownWindow(WindowId),

    #[error("unknown drawable {0}")]
    UnknownDrawable(u64),

    #[error("surface error: {0}")]
    Surface(String),
}

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("error creating GPU display")]
    NoDisplay(#[source] DisplayError),

    #[error("error creating GPU context")]
    NoContext,

    #[error("renderer is already configured")]
    AlreadyConfigured,

    #[error("error starting render task")]
    TaskSpawn(#[source] std::io::Error),
}

/// GPU connection shared between the control thread and the render task.
///
/// Every drawable call arrives on the render task.
pub trait GpuDisplay: Send + Sync {
    /// Capability queries against the current context.
    fn driver(&self) -> &dyn DriverQuery;

    fn make_context(
        &self,
        attrs: ContextAttributes,
        format: PixelFormat,
    ) -> Result<(), DisplayError>;

    fn make_drawable(
        &self,
        window: WindowId,
        format: PixelFormat,
        size: [u32; 2],
    ) -> Result<Drawable, DisplayError>;

    fn destroy_drawable(&self, drawable: Drawable);

    fn resize_drawable(&self, drawable: Drawable, size: [u32; 2]);

    /// Releases GPU memory tied to `drawable` but keeps the handle valid.
    fn free_caches(&self, drawable: Drawable);

    fn restore_caches(&self, drawable: Drawable);

    fn select_back_buffers(&self, _drawable: Drawable) {}

    fn present(
        &self,
        drawable: Drawable,
        commands: &RendererCommands,
        present_time: Option<Instant>,
    );

    /// Blocks until submitted GPU work completes.
    fn finish(&self);

    /// Drops the context. No calls follow except from a new renderer.
    fn release(&self);
}

pub struct Renderer {
    display: Arc<dyn GpuDisplay>,
    attrs: ContextAttributes,
    pixel_format: PixelFormat,
    support: DrawContextSupport,
    task: RendererTask,
    released: bool,
}

impl Renderer {
    /// Creates a context at the first version the display accepts and
    /// starts the render task.
    pub fn new(
        display: Arc<dyn GpuDisplay>,
        api: GlApi,
        pixel_format: PixelFormat,
        events: ControlEventSender,
    ) -> Result<Self, RendererError> {
        let mut chosen = None;
        for attrs in ContextAttributes::candidates(api) {
            match display.make_context(attrs, pixel_format) {
                Ok(()) => {
                    chosen = Some(attrs);
                    break;
                }
                Err(err) => {
                    info!(
                        "{}.{} context not available: {}",
                        attrs.major, attrs.minor, err
                    );
                }
            }
        }

        let Some(attrs) = chosen else {
            error!("error creating GPU context");
            return Err(RendererError::NoContext);
        };

        info!(
            "created {:?} {}.{} context",
            attrs.api, attrs.major, attrs.minor
        );
        let task = RendererTask::new(display.clone(), events)?;

        Ok(Self {
            display,
            attrs,
            pixel_format,
            support: DrawContextSupport::default(),
            task,
            released: false,
        })
    }

    pub fn make_configured(
        display: Arc<dyn GpuDisplay>,
        api: GlApi,
        pixel_format: PixelFormat,
        mode: ThreadMode,
        host: &dyn PlatformHost,
        events: ControlEventSender,
    ) -> Result<Self, RendererError> {
        let mut renderer = Self::new(display, api, pixel_format, events)?;
        renderer.configure(mode, host)?;
        Ok(renderer)
    }

    /// Probes capabilities on the render task and fixes the thread mode
    /// for the lifetime of the renderer.
    pub fn configure(
        &mut self,
        mode: ThreadMode,
        host: &dyn PlatformHost,
    ) -> Result<(), RendererError> {
        if self.support.is_configured() {
            return Err(RendererError::AlreadyConfigured);
        }

        let api = self.attrs.api;
        let mut support = self.support.clone();
        let support = self
            .task
            .run_sync(move |ctx| {
                support.probe(ctx.display().driver(), api);
                support
            })
            .ok_or(RendererError::NoContext)?;
        self.support = support;

        let separate = resolve_separate_draw_context(mode, &self.support, host);
        self.task.set_separate_draw_context(separate);
        self.support.mark_configured();

        info!(
            "renderer configured, thread mode:{:?} features: {}",
            self.thread_mode(),
            self.support.feature_summary()
        );
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.support.is_configured()
    }

    /// Resolved mode. Never `Auto` once configured.
    pub fn thread_mode(&self) -> ThreadMode {
        if self.task.separate_draw_context() {
            ThreadMode::Multi
        } else {
            ThreadMode::Single
        }
    }

    pub fn supports_thread_mode(&self) -> bool {
        self.support.has_sync_fences()
    }

    pub fn support(&self) -> &DrawContextSupport {
        &self.support
    }

    pub fn task(&self) -> &RendererTask {
        &self.task
    }

    pub fn display(&self) -> &Arc<dyn GpuDisplay> {
        &self.display
    }

    pub fn context_attributes(&self) -> ContextAttributes {
        self.attrs
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Only the primary window controls the orientation.
    pub fn set_window_valid_orientations<C: WindowContext + 'static>(
        &self,
        window: &mut Window<C>,
        mask: OrientationMask,
    ) -> bool {
        if !window.is_primary() {
            return false;
        }
        window.set_valid_orientations(mask)
    }

    /// Backgrounding finishes queued GPU work. A full exit stops the task
    /// and drops the context.
    pub fn on_exit(&mut self, backgrounded: bool) {
        if self.released {
            return;
        }

        if backgrounded {
            let display = self.display.clone();
            self.task.run_sync(move |_| display.finish());
            return;
        }

        self.task.await_pending();
        self.task.stop();
        self.display.release();
        self.released = true;
        info!("renderer released");
    }
}

/// Decides whether draws run on a separate context.
pub fn resolve_separate_draw_context(
    requested: ThreadMode,
    support: &DrawContextSupport,
    host: &dyn PlatformHost,
) -> bool {
    let mode = if support.has_sync_fences() {
        requested
    } else {
        ThreadMode::Single
    };

    let mut separate = match mode {
        ThreadMode::Auto => {
            let old_driver = host.platform() == PlatformKind::Android
                && host.os_api_level().is_some_and(|level| level < 26);
            !(old_driver && !support.has_immutable_buffer_storage())
        }
        ThreadMode::Single => false,
        ThreadMode::Multi => true,
    };

    if separate {
        let forced = host.shared_storage_path().is_some_and(|dir| {
            dir.join(FORCE_SINGLE_DRAW_CONTEXT_FILE).exists()
        });
        if forced {
            warn!("forcing single draw context from override file");
            separate = false;
        }
    }

    separate
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::base::screen::ScreenId;

    struct Host {
        platform: PlatformKind,
        api_level: Option<u32>,
        storage: Option<PathBuf>,
    }

    impl PlatformHost for Host {
        fn platform(&self) -> PlatformKind {
            self.platform
        }

        fn screen_supports_timestamps(&self) -> bool {
            true
        }

        fn screen_count(&self) -> usize {
            1
        }

        fn open_window(&self, _: WindowId, _: ScreenId, _: &str) {}

        fn close_window(&self, _: WindowId) {}

        fn set_window_title(&self, _: WindowId, _: &str) {}

        fn notify_draw(&self, _: WindowId) {}

        fn cancel_draw(&self, _: WindowId) {}

        fn shared_storage_path(&self) -> Option<PathBuf> {
            self.storage.clone()
        }

        fn os_api_level(&self) -> Option<u32> {
            self.api_level
        }

        fn exit(&self) {}
    }

    fn linux() -> Host {
        Host {
            platform: PlatformKind::Linux,
            api_level: None,
            storage: None,
        }
    }

    fn with_fences() -> DrawContextSupport {
        let mut support = DrawContextSupport::default();
        support.has_fence_sync = true;
        support
    }

    #[test]
    fn missing_fences_force_single() {
        let support = DrawContextSupport::default();
        let host = linux();
        for mode in [ThreadMode::Auto, ThreadMode::Multi] {
            assert!(!resolve_separate_draw_context(mode, &support, &host));
        }
    }

    #[test]
    fn auto_uses_fences() {
        let support = with_fences();
        let host = linux();
        assert!(resolve_separate_draw_context(
            ThreadMode::Auto,
            &support,
            &host
        ));
        assert!(!resolve_separate_draw_context(
            ThreadMode::Single,
            &support,
            &host
        ));
    }

    #[test]
    fn old_android_needs_buffer_storage_for_auto() {
        let host = Host {
            platform: PlatformKind::Android,
            api_level: Some(24),
            storage: None,
        };
        let support = with_fences();
        assert!(!resolve_separate_draw_context(
            ThreadMode::Auto,
            &support,
            &host
        ));
        assert!(resolve_separate_draw_context(
            ThreadMode::Multi,
            &support,
            &host
        ));

        let mut support = with_fences();
        support.has_buffer_storage = true;
        assert!(resolve_separate_draw_context(
            ThreadMode::Auto,
            &support,
            &host
        ));
    }

    #[test]
    fn thread_mode_reads_from_options_json() {
        let mode: ThreadMode =
            serde_json::from_str("\"multi\"").expect("thread mode");
        assert_eq!(mode, ThreadMode::Multi);
    }
}
