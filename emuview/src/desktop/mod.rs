pub mod app;
pub mod host;
pub mod input;

pub use app::{DesktopApp, DesktopSetup, run};
pub use host::{DesktopHost, HostRequest};
