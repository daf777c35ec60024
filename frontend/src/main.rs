use std::path::PathBuf;
use std::sync::Arc;

use emuview::DesktopSetup;
use emuview::emu::{EmuVideo, SilentAudio};

mod test_pattern;
use test_pattern::{PatternRunner, TestPatternSystem};

fn main() {
    let mut setup = DesktopSetup::new(
        "EmuView",
        Box::new(TestPatternSystem::new()),
        Box::new(PatternRunner::default()),
        EmuVideo::new([320, 240]),
    );
    setup.audio = Some(Arc::new(SilentAudio::new(1.0)));
    setup.open_path = std::env::args_os().nth(1).map(PathBuf::from);

    if let Err(err) = emuview::run(setup) {
        eprintln!("emuview runtime failed: {}", err);
        std::process::exit(1);
    }
}
