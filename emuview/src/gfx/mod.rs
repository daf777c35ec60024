pub mod drawable;
pub mod renderer;
pub mod support;
pub mod task;
pub mod wgpu_display;

pub use drawable::DrawableHolder;
pub use renderer::{
    DisplayError, Drawable, GpuDisplay, PixelFormat, Renderer, RendererError,
    ThreadMode,
};
pub use support::{
    ContextAttributes, DrawContextSupport, DriverQuery, GlApi, ProcAddress,
};
pub use task::{
    Bounds, DrawCommand, DrawTarget, Projection, RendererCommands,
    RendererTask, TaskContext, Viewport,
};
pub use wgpu_display::WgpuDisplay;
