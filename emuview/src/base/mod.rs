pub mod events;
pub mod frame_clock;
pub mod host;
pub mod lifecycle;
pub mod orientation;
pub mod screen;
pub mod window;
