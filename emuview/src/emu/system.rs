use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};

use super::video::{AudioOutput, EmuVideo};
use crate::base::events::{ControlEvent, ControlEventSender};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VideoSystem {
    Ntsc,
    Pal,
}

/// Clock and state of the emulated machine as seen from the control
/// thread. The core's actual frame work happens in a [`FrameRunner`].
pub trait EmuSystem {
    /// Advances the emulated clock to `timestamp` and returns how many
    /// frames elapsed.
    fn advance_frames_with_time(&mut self, timestamp: Instant) -> u32;

    fn set_speed_multiplier(&mut self, speed: u32);

    /// True while the core wants to skip ahead on its own, e.g. through a
    /// disk load.
    fn should_fast_forward(&self) -> bool;

    fn start(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Running, as opposed to paused or without content.
    fn is_active(&self) -> bool;

    fn has_content(&self) -> bool;

    fn close_runtime_system(&mut self, allow_autosave: bool);

    /// Re-syncs the emulated clock with real time on the next advance.
    fn reset_frame_time(&mut self);

    fn set_frame_time(&mut self, system: VideoSystem, frame_time: Duration);

    fn config_frame_time(&mut self, sound_rate: u32);

    fn frame_rate(&self) -> f64;

    fn auto_save_state_path(&self) -> Option<PathBuf>;

    /// Whether `path` names content the core can load.
    fn accepts_file(&self, path: &Path) -> bool;

    fn load_content(&mut self, path: &Path) -> Result<(), String>;

    /// Display name of the loaded content.
    fn content_name(&self) -> String;

    fn content_path(&self) -> Option<PathBuf>;

    fn load_auto_save_state(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn set_media_search_path(&mut self, path: &Path);
}

/// The emulation core's frame work, run on the system task thread.
pub trait FrameRunner: Send {
    fn run_frames(
        &mut self,
        video: &EmuVideo,
        audio: Option<&dyn AudioOutput>,
        frames: u32,
        skip_forward: bool,
    );
}

pub struct FrameRequest {
    pub serial: u64,
    pub video: EmuVideo,
    pub audio: Option<Arc<dyn AudioOutput>>,
    pub frames: u32,
    pub skip_forward: bool,
}

/// Background task that emulates frames away from the control thread.
pub trait SystemTask {
    fn start(&mut self);

    fn pause(&mut self);

    /// Waits for the task to reach a safe stopping point.
    fn stop(&mut self);

    fn run_frame(&mut self, request: FrameRequest);
}

struct QueuedFrame {
    generation: u64,
    request: FrameRequest,
}

/// [`SystemTask`] driving a [`FrameRunner`] on its own thread. Posts
/// [`ControlEvent::VideoFrameFinished`] with the request's serial after
/// every request it runs.
pub struct ThreadedSystemTask {
    runner: Arc<Mutex<Box<dyn FrameRunner>>>,
    events: ControlEventSender,
    generation: Arc<AtomicU64>,
    tx: Option<Sender<QueuedFrame>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedSystemTask {
    pub fn new(
        runner: Box<dyn FrameRunner>,
        events: ControlEventSender,
    ) -> Self {
        Self {
            runner: Arc::new(Mutex::new(runner)),
            events,
            generation: Arc::new(AtomicU64::new(0)),
            tx: None,
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn spawn(&mut self) {
        let (tx, rx) = mpsc::channel::<QueuedFrame>();
        let runner = self.runner.clone();
        let events = self.events.clone();
        let generation = self.generation.clone();

        let spawned = thread::Builder::new()
            .name("emuview-system".to_string())
            .spawn(move || run_worker(rx, runner, events, generation));

        match spawned {
            Ok(worker) => {
                self.tx = Some(tx);
                self.worker = Some(worker);
                debug!("started system task");
            }
            Err(err) => error!("error starting system task: {}", err),
        }
    }
}

fn run_worker(
    rx: Receiver<QueuedFrame>,
    runner: Arc<Mutex<Box<dyn FrameRunner>>>,
    events: ControlEventSender,
    generation: Arc<AtomicU64>,
) {
    while let Ok(queued) = rx.recv() {
        if queued.generation != generation.load(Ordering::Acquire) {
            trace!("dropping frame request from before pause");
            continue;
        }

        let request = queued.request;
        {
            let mut runner =
                runner.lock().unwrap_or_else(PoisonError::into_inner);
            runner.run_frames(
                &request.video,
                request.audio.as_deref(),
                request.frames,
                request.skip_forward,
            );
        }

        let finished = ControlEvent::VideoFrameFinished(request.serial);
        if events.send(finished).is_err() {
            break;
        }
    }
    debug!("system task exiting");
}

impl SystemTask for ThreadedSystemTask {
    fn start(&mut self) {
        if self.worker.is_none() {
            self.spawn();
        }
    }

    fn pause(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn stop(&mut self) {
        self.pause();
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("system task panicked");
            }
        }
    }

    fn run_frame(&mut self, request: FrameRequest) {
        let Some(tx) = self.tx.as_ref() else {
            warn!("system task not started, dropping frame request");
            return;
        };

        let queued = QueuedFrame {
            generation: self.generation.load(Ordering::Acquire),
            request,
        };
        if tx.send(queued).is_err() {
            warn!("system task disconnected");
        }
    }
}

impl Drop for ThreadedSystemTask {
    fn drop(&mut self) {
        self.stop();
    }
}
