use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, trace, warn};

use super::renderer::{Drawable, GpuDisplay, RendererError};
use crate::base::events::{ControlEvent, ControlEventSender};
use crate::base::window::{DrawParams, SurfaceChange, WindowId};

/// Pixel rectangle as `[x, y, width, height]`.
pub type Bounds = [i32; 4];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    bounds: Bounds,
}

impl Viewport {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn from_size(size: [i32; 2]) -> Self {
        Self::new([0, 0, size[0], size[1]])
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn width(&self) -> i32 {
        self.bounds[2]
    }

    pub fn height(&self) -> i32 {
        self.bounds[3]
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height() <= 0 {
            return 1.0;
        }
        self.width() as f32 / self.height() as f32
    }
}

/// Orthographic projection over a plane one unit tall per half-axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    matrix: [[f32; 4]; 4],
    plane: [f32; 2],
}

impl Default for Projection {
    fn default() -> Self {
        Self::for_viewport(&Viewport::default())
    }
}

impl Projection {
    pub fn for_viewport(viewport: &Viewport) -> Self {
        let aspect = viewport.aspect_ratio().max(f32::EPSILON);
        let mut matrix = [[0.0; 4]; 4];
        matrix[0][0] = 1.0 / aspect;
        matrix[1][1] = 1.0;
        matrix[2][2] = -1.0;
        matrix[3][3] = 1.0;

        Self {
            matrix,
            plane: [2.0 * aspect, 2.0],
        }
    }

    pub fn matrix(&self) -> [[f32; 4]; 4] {
        self.matrix
    }

    /// Width and height of the visible plane in projection units.
    pub fn plane(&self) -> [f32; 2] {
        self.plane
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Clear([f32; 4]),
    Video {
        bounds: Bounds,
        tint: [f32; 4],
        brightness: f32,
        serial: u64,
    },
    View {
        name: String,
        bounds: Bounds,
    },
    Present,
}

/// Commands recorded on the control thread for one window draw.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RendererCommands {
    viewport: Viewport,
    projection: Projection,
    commands: Vec<DrawCommand>,
}

impl RendererCommands {
    pub fn new(viewport: Viewport, projection: Projection) -> Self {
        Self {
            viewport,
            projection,
            commands: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear([0.0, 0.0, 0.0, 1.0]));
    }

    pub fn clear_to(&mut self, color: [f32; 4]) {
        self.commands.push(DrawCommand::Clear(color));
    }

    pub fn draw_video(
        &mut self,
        bounds: Bounds,
        tint: [f32; 4],
        brightness: f32,
        serial: u64,
    ) {
        self.commands.push(DrawCommand::Video {
            bounds,
            tint,
            brightness,
            serial,
        });
    }

    pub fn draw_view(&mut self, name: impl Into<String>, bounds: Bounds) {
        self.commands.push(DrawCommand::View {
            name: name.into(),
            bounds,
        });
    }

    pub fn present(&mut self) {
        self.commands.push(DrawCommand::Present);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_presented(&self) -> bool {
        self.commands.contains(&DrawCommand::Present)
    }

    /// Flat color a backend without geometry shows for this frame: the
    /// last video tint scaled by its brightness, else the last clear.
    pub fn resolved_color(&self) -> [f32; 4] {
        let mut color = [0.0, 0.0, 0.0, 1.0];
        for command in &self.commands {
            match command {
                DrawCommand::Clear(c) => color = *c,
                DrawCommand::Video {
                    tint, brightness, ..
                } => {
                    color = [
                        tint[0] * brightness,
                        tint[1] * brightness,
                        tint[2] * brightness,
                        tint[3],
                    ];
                }
                _ => {}
            }
        }
        color
    }
}

/// Where a draw lands and when it should reach the display.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DrawTarget {
    pub drawable: Drawable,
    pub window: WindowId,
    pub present_time: Option<Instant>,
}

/// Handed to every job on the render thread.
pub struct TaskContext {
    display: Arc<dyn GpuDisplay>,
}

impl TaskContext {
    pub fn display(&self) -> &dyn GpuDisplay {
        self.display.as_ref()
    }
}

type Job = Box<dyn FnOnce(&TaskContext) + Send>;

#[derive(Default)]
struct PendingJobs {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingJobs {
    fn begin(&self) {
        let mut count =
            self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
    }

    fn end(&self) {
        let mut count =
            self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count =
            self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Holds one pending count until dropped, so jobs that panic or are
/// discarded with the queue still release it.
struct PendingGuard(Arc<PendingJobs>);

impl PendingGuard {
    fn begin(pending: &Arc<PendingJobs>) -> Self {
        pending.begin();
        Self(pending.clone())
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Dedicated thread that owns every GPU call.
pub struct RendererTask {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    pending: Arc<PendingJobs>,
    events: ControlEventSender,
    separate_draw_context: bool,
}

impl RendererTask {
    pub fn new(
        display: Arc<dyn GpuDisplay>,
        events: ControlEventSender,
    ) -> Result<Self, RendererError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let pending = Arc::new(PendingJobs::default());

        let worker = thread::Builder::new()
            .name("emuview-render".to_string())
            .spawn(move || {
                let ctx = TaskContext { display };
                while let Ok(job) = rx.recv() {
                    job(&ctx);
                }
                debug!("render task exiting");
            })
            .map_err(RendererError::TaskSpawn)?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            pending,
            events,
            separate_draw_context: false,
        })
    }

    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    pub fn separate_draw_context(&self) -> bool {
        self.separate_draw_context
    }

    pub(crate) fn set_separate_draw_context(&mut self, on: bool) {
        self.separate_draw_context = on;
    }

    /// Queues `job`. Returns false if the task has been stopped.
    pub fn run(
        &self,
        job: impl FnOnce(&TaskContext) + Send + 'static,
    ) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            warn!("render task stopped, dropping job");
            return false;
        };

        let guard = PendingGuard::begin(&self.pending);
        let job: Job = Box::new(move |ctx| {
            let _guard = guard;
            job(ctx);
        });
        if tx.send(job).is_err() {
            warn!("render task disconnected, dropping job");
            return false;
        }
        true
    }

    /// Runs `job` on the task and waits for its result.
    pub fn run_sync<R: Send + 'static>(
        &self,
        job: impl FnOnce(&TaskContext) -> R + Send + 'static,
    ) -> Option<R> {
        let (tx, rx) = mpsc::sync_channel(1);
        let queued = self.run(move |ctx| {
            let _ = tx.send(job(ctx));
        });
        if !queued {
            return None;
        }
        rx.recv().ok()
    }

    /// Blocks until every queued job has finished.
    pub fn await_pending(&self) {
        self.pending.wait_idle();
    }

    pub fn update_drawable_for_surface_change(
        &self,
        drawable: Drawable,
        change: SurfaceChange,
        size: [i32; 2],
    ) {
        if !change.surface_resized() {
            return;
        }

        let size = [size[0].max(1) as u32, size[1].max(1) as u32];
        self.run(move |ctx| ctx.display().resize_drawable(drawable, size));
    }

    /// Records commands with `record`, then presents them on the task and
    /// posts [`ControlEvent::DrawFinished`] for the target window.
    pub fn draw(
        &self,
        target: DrawTarget,
        params: DrawParams,
        viewport: Viewport,
        projection: Projection,
        record: impl FnOnce(&mut RendererCommands),
    ) {
        let mut commands = RendererCommands::new(viewport, projection);
        record(&mut commands);
        trace!(
            "draw window:{} commands:{} resized:{}",
            target.window.0,
            commands.commands().len(),
            params.was_resized
        );

        let events = self.events.clone();
        let job = move |ctx: &TaskContext| {
            ctx.display().present(
                target.drawable,
                &commands,
                target.present_time,
            );
            let _ = events.send(ControlEvent::DrawFinished(target.window));
        };

        if self.separate_draw_context && !params.needs_sync {
            self.run(job);
        } else {
            self.run_sync(job);
        }
    }

    /// Drops the job queue and joins the thread.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("render task panicked");
            }
        }
    }
}

impl Drop for RendererTask {
    fn drop(&mut self) {
        self.stop();
    }
}
