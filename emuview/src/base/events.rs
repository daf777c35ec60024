use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};

use super::window::WindowId;

/// Work handed back to the control thread.
///
/// Background tasks post completions here, and window handlers and views
/// post requests that need the full controller (every window at once)
/// rather than the state they were handed.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    /// Carries the serial of the frame request that finished.
    VideoFrameFinished(u64),
    DrawFinished(WindowId),
    PostDraw(WindowId),
    DismissWindow(WindowId),
    ShowEmulation,
    ShowUi,
    ShowSystemActions,
    CloseSystem { allow_autosave: bool },
    OpenFile(PathBuf),
    LaunchSystem { load_autosave: bool, add_to_recent: bool },
    PopView,
    Exit,
}

pub type ControlEventSender = Sender<ControlEvent>;
pub type ControlEventReceiver = Receiver<ControlEvent>;

pub fn control_channel() -> (ControlEventSender, ControlEventReceiver) {
    mpsc::channel()
}
