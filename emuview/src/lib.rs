pub mod base;
pub mod desktop;
pub mod emu;
pub mod framework;
pub mod gfx;
pub mod input;
pub mod prelude;

pub use desktop::{DesktopSetup, run};
