pub mod delegates;
pub mod logging;
pub mod util;
