pub mod controller;
pub mod emu_view;
pub mod options;
pub mod pacing;
pub mod recent;
pub mod storage;
pub mod system;
pub mod video;
pub mod view;

pub use controller::{
    ControllerParts, ControllerState, EmuFrame, EmuViewController,
    EmuWindow, WindowData,
};
pub use emu_view::{EmuInputView, EmuView, ToastView};
pub use options::FrontendOptions;
pub use pacing::{FramePacer, FramePlan, SpeedPlan};
pub use recent::{RecentGame, RecentGameList};
pub use system::{
    EmuSystem, FrameRequest, FrameRunner, SystemTask, ThreadedSystemTask,
    VideoSystem,
};
pub use video::{AudioOutput, EmuVideo, EmuVideoLayer, SilentAudio};
pub use view::{
    ConfirmView, DefaultViewFactory, MenuItem, MenuView, View, ViewFactory,
    ViewId, ViewStack,
};
