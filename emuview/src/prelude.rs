pub use crate::base::events::{
    ControlEvent, ControlEventReceiver, ControlEventSender, control_channel,
};
pub use crate::base::host::{PlatformHost, PlatformKind};
pub use crate::base::lifecycle::{Lifecycle, LifecycleHook};
pub use crate::base::orientation::{Orientation, OrientationMask};
pub use crate::base::screen::{
    FrameParams, PixelDensity, Screen, ScreenChange, ScreenId,
};
pub use crate::base::window::{
    DrawParams, SurfaceChange, Window, WindowConfig, WindowContext,
    WindowId, WindowRegistry,
};
pub use crate::desktop::{DesktopApp, DesktopHost, DesktopSetup, run};
pub use crate::emu::*;
pub use crate::framework::logging::init_logger;
pub use crate::framework::logging::{debug, error, info, trace, warn};
pub use crate::gfx::{
    GpuDisplay, PixelFormat, Renderer, RendererError, ThreadMode,
};
pub use crate::input::{Action, DeviceClass, Event, Key, keycode};
